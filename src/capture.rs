//! Scoped output capture.
//!
//! Text that a writer would normally send to the console is collected into a
//! buffer owned by the capture scope. Nothing process-wide is redirected;
//! the real stdout is never touched.

use anyhow::{anyhow, Result};
use std::io::Write;

/// Run `render` against a fresh buffer and return what it wrote.
///
/// Errors from `render` propagate and the partial output is dropped.
pub fn capture_output<F>(render: F) -> Result<String>
where
    F: FnOnce(&mut dyn Write) -> std::io::Result<()>,
{
    let mut buf: Vec<u8> = Vec::new();
    render(&mut buf)?;
    String::from_utf8(buf).map_err(|e| anyhow!("captured output is not UTF-8: {}", e))
}
