//! TIDE-style detection error decomposition.
//!
//! A run matches predictions to ground truth per image at one IoU threshold,
//! classifies every false positive and false negative into an error type, and
//! measures how much mAP each type costs by fixing all errors of that type and
//! re-scoring (dAP).
//!
//! Typical use mirrors the three calls the study driver makes:
//!
//! ```no_run
//! use loc_tide::tide::{Data, Mode, Tide};
//! # fn demo(gt: Data, preds: Data) -> anyhow::Result<()> {
//! let mut tide = Tide::new();
//! let run = tide.evaluate(&gt, &preds, Mode::Box, 0.25);
//! println!("{} errors", run.errors.len());
//! tide.summarize(&mut std::io::stdout())?;
//! tide.plot(std::path::Path::new("out"))?;
//! # Ok(())
//! # }
//! ```

mod ap;
mod data;
mod errors;
mod plot;
mod run;
mod summary;

use anyhow::Result;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub use ap::{ApData, ClassedApData};
pub use data::{box_iou, crowd_iou, Data, Instance};
pub use errors::{DetectionError, ErrorKind, SpecialErrorKind};
pub use run::TideRun;

use crate::{BACKGROUND_THRESHOLD, MAX_DETS};

/// What geometry is compared when matching.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Axis-aligned bounding boxes.
    Box,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Box => "bbox",
        }
    }
}

/// Evaluation engine. Keeps every run it has evaluated so they can be
/// summarized and plotted together.
#[derive(Debug)]
pub struct Tide {
    bg_threshold: f64,
    max_dets: usize,
    runs: Vec<TideRun>,
}

impl Tide {
    pub fn new() -> Self {
        Self {
            bg_threshold: BACKGROUND_THRESHOLD,
            max_dets: MAX_DETS,
            runs: Vec::new(),
        }
    }

    pub fn evaluate(
        &mut self,
        gt: &Data,
        preds: &Data,
        mode: Mode,
        pos_threshold: f64,
    ) -> &TideRun {
        log::info!(
            "evaluating {} against {} ({} mode, pos_threshold={})",
            preds.name,
            gt.name,
            mode.name(),
            pos_threshold
        );
        let run = TideRun::new(gt, preds, mode, pos_threshold, self.bg_threshold, self.max_dets);
        let idx = self.runs.len();
        self.runs.push(run);
        &self.runs[idx]
    }

    /// Write the dAP summary of every run to `out`.
    pub fn summarize(&self, out: &mut dyn Write) -> io::Result<()> {
        for run in &self.runs {
            summary::write_run_summary(out, run)?;
        }
        Ok(())
    }

    /// Write one summary plot per run into `out_dir` and return the paths.
    pub fn plot(&self, out_dir: &Path) -> Result<Vec<PathBuf>> {
        self.runs
            .iter()
            .map(|run| plot::plot_run(run, out_dir))
            .collect()
    }
}

impl Default for Tide {
    fn default() -> Self {
        Self::new()
    }
}
