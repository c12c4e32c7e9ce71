//! Error-count reports.
//!
//! Errors are grouped by type name in order of first appearance, so two runs
//! over the same inputs print identical reports.

use anyhow::{anyhow, Result};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::tide::DetectionError;

/// Count and share of one error type.
#[derive(Clone, Debug, PartialEq)]
pub struct ErrorCount {
    pub name: String,
    pub count: usize,
    pub percent: f64,
}

/// Error counts for one run, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ErrorCounts {
    entries: Vec<ErrorCount>,
    total: usize,
}

impl ErrorCounts {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut tallies: Vec<(String, usize)> = Vec::new();
        for name in names {
            let name = name.as_ref();
            match tallies.iter_mut().find(|(seen, _)| seen == name) {
                Some((_, count)) => *count += 1,
                None => tallies.push((name.to_string(), 1)),
            }
        }
        let total = tallies.iter().map(|(_, count)| count).sum();
        let entries = tallies
            .into_iter()
            .map(|(name, count)| ErrorCount {
                percent: percent(count, total),
                name,
                count,
            })
            .collect();
        Self { entries, total }
    }

    pub fn from_errors(errors: &[DetectionError]) -> Self {
        Self::from_names(errors.iter().map(DetectionError::name))
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn entries(&self) -> &[ErrorCount] {
        &self.entries
    }

    pub fn get(&self, name: &str) -> Option<&ErrorCount> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// One formatted line per error type.
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| format_line(&entry.name, entry.count, entry.percent))
            .collect()
    }

    /// Contents of `{tag}_error_counts.txt`.
    pub fn render(&self, tag: &str) -> String {
        let mut text = format!("Error Type Counts for {}\nTotal Errors: {}\n\n", tag, self.total);
        for line in self.lines() {
            text.push_str(&line);
            text.push('\n');
        }
        text
    }

    /// Console form of the breakdown.
    pub fn print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "Error Breakdown (absolute count and percentage):")?;
        for line in self.lines() {
            writeln!(out, "{}", line)?;
        }
        Ok(())
    }

    /// Write the report into `out_dir` and return its path.
    pub fn write(&self, out_dir: &Path, tag: &str) -> Result<PathBuf> {
        let path = counts_path(out_dir, tag);
        std::fs::write(&path, self.render(tag))
            .map_err(|e| anyhow!("failed to write {}: {}", path.display(), e))?;
        Ok(path)
    }
}

pub fn counts_path(out_dir: &Path, tag: &str) -> PathBuf {
    out_dir.join(format!("{}_error_counts.txt", tag))
}

/// `count / total * 100`, or 0.0 for an empty run.
pub fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

pub fn format_line(name: &str, count: usize, percent: f64) -> String {
    format!("{:<20}: {:>4} ({:.1}%)", name, count, percent)
}
