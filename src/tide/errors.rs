//! Error taxonomy produced by a TIDE run.

use std::fmt;

use super::data::Instance;
use crate::coco::ImageId;

/// Main error types, in the order they are tested for an unmatched prediction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ErrorKind {
    /// Right place, wrong class.
    Class,
    /// Right class, overlap between the background and positivity thresholds.
    Box,
    /// Wrong class and poorly localized.
    Both,
    /// Would be a true positive but its ground truth was already matched.
    Duplicate,
    /// Fired on background.
    Background,
    /// Ground truth no prediction could be fixed into.
    Missed,
    /// Anything the rules above do not catch.
    Other,
}

impl ErrorKind {
    /// Columns of the main dAP table, in print order.
    pub const MAIN: [ErrorKind; 6] = [
        ErrorKind::Class,
        ErrorKind::Box,
        ErrorKind::Both,
        ErrorKind::Duplicate,
        ErrorKind::Background,
        ErrorKind::Missed,
    ];

    /// Type name used in error-count reports.
    pub fn name(self) -> &'static str {
        match self {
            ErrorKind::Class => "ClassError",
            ErrorKind::Box => "BoxError",
            ErrorKind::Both => "BothError",
            ErrorKind::Duplicate => "DuplicateError",
            ErrorKind::Background => "BackgroundError",
            ErrorKind::Missed => "MissedError",
            ErrorKind::Other => "OtherError",
        }
    }

    /// Column label in the dAP summary.
    pub fn short_name(self) -> &'static str {
        match self {
            ErrorKind::Class => "Cls",
            ErrorKind::Box => "Loc",
            ErrorKind::Both => "Both",
            ErrorKind::Duplicate => "Dupe",
            ErrorKind::Background => "Bkg",
            ErrorKind::Missed => "Miss",
            ErrorKind::Other => "Other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Aggregate error types reported next to the main table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SpecialErrorKind {
    FalsePositive,
    FalseNegative,
}

impl SpecialErrorKind {
    pub const ALL: [SpecialErrorKind; 2] =
        [SpecialErrorKind::FalsePositive, SpecialErrorKind::FalseNegative];

    pub fn short_name(self) -> &'static str {
        match self {
            SpecialErrorKind::FalsePositive => "FalsePos",
            SpecialErrorKind::FalseNegative => "FalseNeg",
        }
    }
}

/// How the AP data changes when an error is fixed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) enum Fix {
    /// Drop the prediction record.
    Suppress { record: usize },
    /// Turn the prediction record into a true positive of `class`.
    Promote { record: usize, class: i64 },
    /// Remove one ground-truth positive from `class`.
    DropPositive { class: i64 },
}

/// One classified detection-level discrepancy.
#[derive(Clone, Debug)]
pub struct DetectionError {
    pub kind: ErrorKind,
    pub image: ImageId,
    /// The offending prediction. `None` for missed ground truth.
    pub pred: Option<Instance>,
    /// The ground truth the error was attributed to, when there is one.
    pub gt: Option<Instance>,
    pub(crate) fix: Fix,
}

impl DetectionError {
    pub fn name(&self) -> &'static str {
        self.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_error_type_classes() {
        let names: Vec<&str> = ErrorKind::MAIN.iter().map(|k| k.name()).collect();
        assert_eq!(
            names,
            vec![
                "ClassError",
                "BoxError",
                "BothError",
                "DuplicateError",
                "BackgroundError",
                "MissedError"
            ]
        );
        assert_eq!(ErrorKind::Box.short_name(), "Loc");
        assert_eq!(ErrorKind::Other.to_string(), "OtherError");
        assert_eq!(SpecialErrorKind::FalseNegative.short_name(), "FalseNeg");
    }
}
