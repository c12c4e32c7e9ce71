//! TIDE error decomposition for the marine-species localization study.
//!
//! For each (ground truth, predictions) pair of the study the crate:
//!
//! 1. repairs ground-truth annotations whose `segmentation` is missing,
//!    empty, or a flattened polygon (`coco::repair`),
//! 2. evaluates the predictions with a TIDE-style error decomposition at a
//!    localization-positivity IoU of 0.25 (`tide`),
//! 3. writes the dAP summary, a summary plot, and per-error-type counts
//!    (`report`).
//!
//! # Module Structure
//!
//! - `coco`: COCO ground-truth / result types, loaders, segmentation repair
//! - `tide`: matching, error classification, AP and dAP, summary and plot
//! - `report`: error-count aggregation and the `{tag}_error_counts.txt` file
//! - `capture`: scoped capture of summary text
//! - `config`: the run table and its file/env configuration
//! - `pipeline`: one run end to end

pub mod capture;
pub mod coco;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod tide;

pub use capture::capture_output;
pub use coco::{patch_coco_json, CocoAnnotation, CocoDataset, CocoDetection, ImageId};
pub use config::{study_table, RunSpec, StudyConfig};
pub use pipeline::{run_tide_evaluation, RunOutcome};
pub use report::{ErrorCount, ErrorCounts};
pub use tide::{Data, DetectionError, ErrorKind, Mode, Tide, TideRun};

/// IoU a prediction needs with a same-class object to count as a true positive.
pub const POS_THRESHOLD: f64 = 0.25;

/// IoU at or below which an unmatched prediction is attributed to background.
pub const BACKGROUND_THRESHOLD: f64 = 0.1;

/// Highest-scoring detections kept per image.
pub const MAX_DETS: usize = 100;
