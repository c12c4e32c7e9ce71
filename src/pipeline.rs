//! Repair → evaluate → report for one run.

use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};

use crate::capture::capture_output;
use crate::coco::{load_dataset, load_results, patch_coco_json};
use crate::config::RunSpec;
use crate::report::ErrorCounts;
use crate::tide::{Data, Mode, Tide};
use crate::POS_THRESHOLD;

/// Everything one run produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub tag: String,
    pub ap: f64,
    /// Present when the patched ground truth was kept on disk.
    pub patched_ground_truth: Option<PathBuf>,
    pub summary_path: PathBuf,
    pub plot_paths: Vec<PathBuf>,
    pub counts_path: PathBuf,
    pub counts: ErrorCounts,
}

/// Patched ground-truth file, removed on drop unless kept.
struct PatchedFile {
    path: PathBuf,
    keep: bool,
}

impl Drop for PatchedFile {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = std::fs::remove_file(&self.path) {
            log::warn!("failed to remove {}: {}", self.path.display(), e);
        }
    }
}

pub fn summary_path(out_dir: &Path, tag: &str) -> PathBuf {
    out_dir.join(format!("{}_tide_dAP_summary.txt", tag))
}

/// Run the full pipeline for one table entry.
///
/// Any input error (missing file, malformed JSON) is returned as is; the
/// caller decides whether to stop.
pub fn run_tide_evaluation(run: &RunSpec, keep_patched: bool) -> Result<RunOutcome> {
    std::fs::create_dir_all(&run.out_dir)
        .map_err(|e| anyhow!("failed to create {}: {}", run.out_dir.display(), e))?;

    let patched = PatchedFile {
        path: patch_coco_json(&run.ground_truth)?,
        keep: keep_patched,
    };
    let gt = Data::from_coco(file_stem(&run.ground_truth), &load_dataset(&patched.path)?);
    let preds = Data::from_results(file_stem(&run.predictions), &load_results(&run.predictions)?);

    let mut tide = Tide::new();
    let (ap, counts) = {
        let result = tide.evaluate(&gt, &preds, Mode::Box, POS_THRESHOLD);
        (result.ap(), ErrorCounts::from_errors(&result.errors))
    };

    let summary = capture_output(|out| tide.summarize(out))?;
    let summary_path = summary_path(&run.out_dir, &run.tag);
    std::fs::write(&summary_path, summary)
        .map_err(|e| anyhow!("failed to write {}: {}", summary_path.display(), e))?;
    log::info!("Summary saved to: {}", summary_path.display());

    let plot_paths = tide.plot(&run.out_dir)?;
    log::info!("Plots saved to: {}", run.out_dir.display());

    counts.print(&mut std::io::stdout().lock())?;
    let counts_path = counts.write(&run.out_dir, &run.tag)?;
    log::info!("Error counts saved to: {}", counts_path.display());

    Ok(RunOutcome {
        tag: run.tag.clone(),
        ap,
        patched_ground_truth: keep_patched.then(|| patched.path.clone()),
        summary_path,
        plot_paths,
        counts_path,
        counts,
    })
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
