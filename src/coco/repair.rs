//! Ground-truth segmentation repair.
//!
//! The evaluator builds its ground truth through a COCO loader that expects
//! every annotation to carry `segmentation` as a non-empty list of polygons.
//! Exports from the labelling tools sometimes omit it, leave it empty, or
//! flatten a single polygon into `[x0, y0, x1, y1, ...]`. Those annotations get
//! a rectangle traced from their bbox instead.
//!
//! The source file is never modified. The repaired document is written next to
//! it under a fresh `patched_*.json` name.

use anyhow::{anyhow, Result};
use serde_json::Value;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Returns true when `segmentation` is not a non-empty list of polygon lists.
///
/// A missing field, a non-array value (including RLE objects), an empty array,
/// or an array whose first element is a number all need repair.
pub fn segmentation_needs_repair(segmentation: Option<&Value>) -> bool {
    match segmentation {
        Some(Value::Array(items)) => matches!(items.first(), None | Some(Value::Number(_))),
        _ => true,
    }
}

/// Trace a COCO `[x, y, w, h]` bbox as a single polygon.
///
/// Corners are emitted as (x, y), (x+w, y), (x+w, y+h), (x, y+h). Integral
/// boxes stay integral so the patched file does not grow `.0` suffixes.
pub fn box_polygon(bbox: &Value) -> Result<Value> {
    let values = bbox
        .as_array()
        .filter(|values| values.len() == 4)
        .ok_or_else(|| anyhow!("bbox must be an array of 4 numbers, got {}", bbox))?;

    let ints: Option<Vec<i64>> = values.iter().map(Value::as_i64).collect();
    if let Some([x, y, w, h]) = ints.as_deref() {
        let (x, y) = (*x, *y);
        // Corners that overflow i64 fall through to the float path.
        if let (Some(right), Some(bottom)) = (x.checked_add(*w), y.checked_add(*h)) {
            return Ok(Value::from(vec![vec![x, y, right, y, right, bottom, x, bottom]]));
        }
    }

    let floats: Option<Vec<f64>> = values.iter().map(Value::as_f64).collect();
    let Some([x, y, w, h]) = floats.as_deref() else {
        return Err(anyhow!("bbox must be an array of 4 numbers, got {}", bbox));
    };
    let (x, y, w, h) = (*x, *y, *w, *h);
    Ok(Value::from(vec![vec![
        x,
        y,
        x + w,
        y,
        x + w,
        y + h,
        x,
        y + h,
    ]]))
}

/// Repair every annotation in a parsed COCO document in place.
///
/// Returns how many annotations were rewritten. A document without an
/// `annotations` key is left as is.
pub fn repair_document(doc: &mut Value) -> Result<usize> {
    let annotations = match doc.get_mut("annotations") {
        None | Some(Value::Null) => return Ok(0),
        Some(Value::Array(annotations)) => annotations,
        Some(_) => return Err(anyhow!("`annotations` must be an array")),
    };

    let mut repaired = 0;
    for (idx, ann) in annotations.iter_mut().enumerate() {
        let ann = ann
            .as_object_mut()
            .ok_or_else(|| anyhow!("annotation #{} is not an object", idx))?;
        if !segmentation_needs_repair(ann.get("segmentation")) {
            continue;
        }
        let bbox = ann
            .get("bbox")
            .ok_or_else(|| anyhow!("annotation #{} needs repair but has no bbox", idx))?;
        let polygon = box_polygon(bbox).map_err(|e| anyhow!("annotation #{}: {}", idx, e))?;
        ann.insert("segmentation".to_string(), polygon);
        repaired += 1;
    }
    Ok(repaired)
}

/// Write a repaired copy of `orig_path` next to it and return the new path.
///
/// The copy is persisted; callers decide whether to delete it afterwards.
pub fn patch_coco_json(orig_path: &Path) -> Result<PathBuf> {
    let raw = std::fs::read_to_string(orig_path)
        .map_err(|e| anyhow!("failed to read {}: {}", orig_path.display(), e))?;
    let mut doc: Value = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid JSON in {}: {}", orig_path.display(), e))?;
    let repaired = repair_document(&mut doc)
        .map_err(|e| anyhow!("cannot repair {}: {}", orig_path.display(), e))?;

    let dir = match orig_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let tmp = tempfile::Builder::new()
        .prefix("patched_")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(|e| anyhow!("failed to create patched file in {}: {}", dir.display(), e))?;
    {
        let mut writer = BufWriter::new(tmp.as_file());
        serde_json::to_writer(&mut writer, &doc)?;
        writer.flush()?;
    }
    let (_, fixed_path) = tmp
        .keep()
        .map_err(|e| anyhow!("failed to persist {}: {}", e.file.path().display(), e.error))?;

    log::info!(
        "Patched JSON written to: {} ({} annotations repaired)",
        fixed_path.display(),
        repaired
    );
    Ok(fixed_path)
}
