//! tide_errors - TIDE error evaluation over the study's run table
//!
//! For every configured run:
//! 1. Patches the ground-truth segmentation into a temporary COCO file
//! 2. Evaluates predictions at pos_threshold 0.25 and saves the dAP summary
//! 3. Saves the summary plot and the per-error-type counts
//!
//! The first failing run stops the whole batch.

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use loc_tide::{run_tide_evaluation, StudyConfig};

#[path = "../ui.rs"]
mod ui;

const AFTER_HELP: &str = "\
Run-table paths resolve against the project root: TIDE_PROJECT_ROOT, else
`project_root` from the config file, else the current directory. Start the
binary from the study root (the directory holding loc_evaluation_scripts/ and
loc_results/) or set TIDE_PROJECT_ROOT.

Other overrides: TIDE_RUN_NUMBER, TIDE_KEEP_PATCHED, TIDE_ONLY.";

#[derive(Parser, Debug)]
#[command(author, version, about, after_help = AFTER_HELP)]
struct Args {
    /// Run-table config (TOML or JSON). Defaults to the built-in study table.
    #[arg(long, env = "TIDE_CONFIG")]
    config: Option<PathBuf>,
    /// Evaluate only these run tags (comma separated).
    #[arg(long, value_delimiter = ',')]
    only: Vec<String>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut cfg = StudyConfig::load(args.config.as_deref())?;
    if !args.only.is_empty() {
        cfg.restrict_to(args.only)?;
    }
    let runs = cfg.runs();
    if runs.is_empty() {
        log::warn!("no runs selected");
        return Ok(());
    }
    log::info!(
        "{} runs, project_root={}, run_number={}",
        runs.len(),
        cfg.project_root.display(),
        cfg.run_number
    );

    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());
    for (index, run) in runs.iter().enumerate() {
        println!("Running: {}", run.tag);
        let stage = ui.run_stage(index, runs.len(), &run.tag);
        let outcome = run_tide_evaluation(run, cfg.keep_patched)?;
        stage.finish(format!(
            "AP {:.2}, {} errors",
            outcome.ap,
            outcome.counts.total()
        ));
    }
    println!("All TIDE evaluations completed.");
    Ok(())
}
