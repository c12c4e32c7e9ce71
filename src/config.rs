use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const DEFAULT_PROJECT_ROOT: &str = ".";
const DEFAULT_RUN_NUMBER: &str = "01";
const DEFAULT_KEEP_PATCHED: bool = true;

const GROUND_TRUTH_DIR: &str = "loc_evaluation_scripts/ground_truths";
const RESULTS_DIR: &str = "loc_results";
const TIDE_OUTPUT_DIR: &str = "tide_error_evaluation";

/// One (species, sampling strategy) cell of the study table.
///
/// `strategy` names the prediction directory `25conf_{strategy}_{species}_test_run_{run}`,
/// `tag_suffix` names the artifacts `{species}_{tag_suffix}_*`.
struct StudyRun {
    species: &'static str,
    strategy: &'static str,
    tag_suffix: &'static str,
}

const fn study_run(
    species: &'static str,
    strategy: &'static str,
    tag_suffix: &'static str,
) -> StudyRun {
    StudyRun {
        species,
        strategy,
        tag_suffix,
    }
}

// Scallop: DUO already holds a balanced amount, so there is a limited
// single-class run instead; the 0.25 reduction produced no predictions.
const STUDY_RUNS: &[StudyRun] = &[
    study_run("echinus", "single_class_DUO", "single_DUO"),
    study_run("echinus", "balanced", "balanced"),
    study_run("echinus", "reduced_0.25", "0.25_reduced"),
    study_run("echinus", "reduced_0.5", "0.5_reduced"),
    study_run("echinus", "reduced_0.75", "0.75_reduced"),
    study_run("holothurian", "single_class_DUO", "single_DUO"),
    study_run("holothurian", "balanced", "balanced"),
    study_run("holothurian", "reduced_0.25", "0.25_reduced"),
    study_run("holothurian", "reduced_0.5", "0.5_reduced"),
    study_run("holothurian", "reduced_0.75", "0.75_reduced"),
    study_run("scallop", "single_class_DUO", "single_DUO"),
    study_run("scallop", "single_class_DUO_limited", "limited"),
    study_run("scallop", "reduced_0.5", "0.5_reduced"),
    study_run("scallop", "reduced_0.75", "0.75_reduced"),
    study_run("starfish", "single_class_DUO", "single_DUO"),
    study_run("starfish", "balanced", "balanced"),
    study_run("starfish", "reduced_0.25", "0.25_reduced"),
    study_run("starfish", "reduced_0.5", "0.5_reduced"),
    study_run("starfish", "reduced_0.75", "0.75_reduced"),
];

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct StudyConfigFile {
    project_root: Option<PathBuf>,
    run_number: Option<String>,
    keep_patched: Option<bool>,
    only: Option<Vec<String>>,
    runs: Option<Vec<RunConfigFile>>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RunConfigFile {
    ground_truth: PathBuf,
    predictions: PathBuf,
    tag: String,
    out_dir: Option<PathBuf>,
}

/// One evaluation: which files to compare and where its artifacts go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub ground_truth: PathBuf,
    pub predictions: PathBuf,
    /// Prefix of every artifact this run writes.
    pub tag: String,
    pub out_dir: PathBuf,
}

/// Resolved configuration.
///
/// `project_root` defaults to the current directory, so relative run-table
/// paths only resolve when the binary starts in the study root or
/// `TIDE_PROJECT_ROOT` is set.
#[derive(Debug, Clone)]
pub struct StudyConfig {
    pub project_root: PathBuf,
    pub run_number: String,
    /// Leave the patched ground truth on disk after each run.
    pub keep_patched: bool,
    /// Restrict the table to these tags. Empty means all.
    pub only: Vec<String>,
    custom_runs: Option<Vec<RunSpec>>,
}

impl StudyConfig {
    /// Load from `config_path` (or `TIDE_CONFIG`), apply env overrides, validate.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("TIDE_CONFIG")
            .ok()
            .filter(|path| !path.trim().is_empty())
            .map(PathBuf::from);
        let path = config_path.map(Path::to_path_buf).or(env_path);
        let file_cfg = match path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: StudyConfigFile) -> Self {
        let custom_runs = file.runs.map(|runs| {
            runs.into_iter()
                .map(|run| RunSpec {
                    out_dir: run.out_dir.unwrap_or_else(|| {
                        Path::new(RESULTS_DIR).join(TIDE_OUTPUT_DIR).join(&run.tag)
                    }),
                    ground_truth: run.ground_truth,
                    predictions: run.predictions,
                    tag: run.tag,
                })
                .collect()
        });
        Self {
            project_root: file
                .project_root
                .unwrap_or_else(|| PathBuf::from(DEFAULT_PROJECT_ROOT)),
            run_number: file
                .run_number
                .unwrap_or_else(|| DEFAULT_RUN_NUMBER.to_string()),
            keep_patched: file.keep_patched.unwrap_or(DEFAULT_KEEP_PATCHED),
            only: file.only.unwrap_or_default(),
            custom_runs,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(root) = std::env::var("TIDE_PROJECT_ROOT") {
            if !root.trim().is_empty() {
                self.project_root = PathBuf::from(root);
            }
        }
        if let Ok(run_number) = std::env::var("TIDE_RUN_NUMBER") {
            if !run_number.trim().is_empty() {
                self.run_number = run_number.trim().to_string();
            }
        }
        if let Ok(keep) = std::env::var("TIDE_KEEP_PATCHED") {
            self.keep_patched = parse_bool(&keep)
                .ok_or_else(|| anyhow!("TIDE_KEEP_PATCHED must be true/false/1/0"))?;
        }
        if let Ok(only) = std::env::var("TIDE_ONLY") {
            let parsed = split_csv(&only);
            if !parsed.is_empty() {
                self.only = parsed;
            }
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.run_number.is_empty() {
            return Err(anyhow!("run_number must not be empty"));
        }
        if let Some(runs) = &self.custom_runs {
            if runs.is_empty() {
                return Err(anyhow!("config lists no runs"));
            }
            let mut seen = HashSet::new();
            for run in runs {
                validate_tag(&run.tag)?;
                if !seen.insert(run.tag.as_str()) {
                    return Err(anyhow!("duplicate run tag '{}'", run.tag));
                }
            }
        }
        let known: HashSet<String> = self.all_runs().into_iter().map(|run| run.tag).collect();
        for tag in &self.only {
            if !known.contains(tag) {
                return Err(anyhow!("'only' names unknown run tag '{}'", tag));
            }
        }
        Ok(())
    }

    /// Restrict the table to `tags`, rejecting unknown ones.
    pub fn restrict_to(&mut self, tags: Vec<String>) -> Result<()> {
        self.only = tags;
        self.validate()
    }

    /// The runs to execute, in table order.
    pub fn runs(&self) -> Vec<RunSpec> {
        let runs = self.all_runs();
        if self.only.is_empty() {
            return runs;
        }
        runs.into_iter()
            .filter(|run| self.only.iter().any(|tag| *tag == run.tag))
            .collect()
    }

    fn all_runs(&self) -> Vec<RunSpec> {
        match &self.custom_runs {
            Some(runs) => runs
                .iter()
                .map(|run| RunSpec {
                    ground_truth: self.project_root.join(&run.ground_truth),
                    predictions: self.project_root.join(&run.predictions),
                    tag: run.tag.clone(),
                    out_dir: self.project_root.join(&run.out_dir),
                })
                .collect(),
            None => study_table(&self.project_root, &self.run_number),
        }
    }
}

/// The study's default run table rooted at `project_root`.
pub fn study_table(project_root: &Path, run_number: &str) -> Vec<RunSpec> {
    let results = project_root.join(RESULTS_DIR);
    STUDY_RUNS
        .iter()
        .map(|entry| {
            let tag = format!("{}_{}", entry.species, entry.tag_suffix);
            RunSpec {
                ground_truth: project_root
                    .join(GROUND_TRUTH_DIR)
                    .join(format!("ground_truth_test_{}.json", entry.species)),
                predictions: results
                    .join(format!(
                        "25conf_{}_{}_test_run_{}",
                        entry.strategy, entry.species, run_number
                    ))
                    .join("predictions.json"),
                out_dir: results.join(TIDE_OUTPUT_DIR).join(&tag),
                tag,
            }
        })
        .collect()
}

/// Tags become file names, so keep them to a portable character set.
pub fn validate_tag(tag: &str) -> Result<()> {
    static TAG_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = TAG_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9._-]{1,128}$").unwrap());
    if !re.is_match(tag) {
        return Err(anyhow!(
            "run tag '{}' must match ^[A-Za-z0-9._-]{{1,128}}$",
            tag
        ));
    }
    Ok(())
}

fn read_config_file(path: &Path) -> Result<StudyConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("toml"))
        .unwrap_or(false);
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

fn split_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|entry| entry.trim())
        .filter(|entry| !entry.is_empty())
        .map(|entry| entry.to_string())
        .collect()
}
