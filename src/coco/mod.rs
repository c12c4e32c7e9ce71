//! COCO ground-truth and result files.
//!
//! Ground truth follows the standard `images` / `annotations` / `categories`
//! layout. Results are a flat list of `{image_id, category_id, bbox, score}`
//! records as written by the detector's `save_json` output.
//!
//! Only the fields the evaluator reads are typed here. Repair works on the raw
//! JSON document (see [`repair`]) so unknown fields survive untouched.

pub mod repair;

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::Path;

pub use repair::{box_polygon, patch_coco_json, repair_document, segmentation_needs_repair};

/// Image identifier.
///
/// Ground truth normally uses integers; result files written from image stems
/// may carry strings instead.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageId {
    Num(i64),
    Name(String),
}

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageId::Num(id) => write!(f, "{}", id),
            ImageId::Name(name) => f.write_str(name),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CocoDataset {
    #[serde(default)]
    pub images: Vec<CocoImage>,
    #[serde(default)]
    pub annotations: Vec<CocoAnnotation>,
    #[serde(default)]
    pub categories: Vec<CocoCategory>,
}

/// `file_name`, `width` and `height` are ignored whatever their JSON type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CocoImage {
    pub id: ImageId,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CocoAnnotation {
    pub image_id: ImageId,
    pub category_id: i64,
    /// `[x, y, width, height]` in pixels, top-left origin.
    pub bbox: [f64; 4],
    /// Crowd region. Accepts `0`/`1`, `true`/`false` or `null`.
    #[serde(default, deserialize_with = "truthy")]
    pub iscrowd: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CocoCategory {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Flag {
    Bool(bool),
    Int(i64),
    Float(f64),
}

/// Truth-test a JSON flag: non-zero numbers and `true` are set.
fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Flag>::deserialize(deserializer)? {
        None => false,
        Some(Flag::Bool(flag)) => flag,
        Some(Flag::Int(value)) => value != 0,
        Some(Flag::Float(value)) => value != 0.0,
    })
}

/// One detection from a COCO result file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CocoDetection {
    pub image_id: ImageId,
    pub category_id: i64,
    pub bbox: [f64; 4],
    pub score: f64,
}

/// Load a COCO ground-truth file.
pub fn load_dataset(path: &Path) -> Result<CocoDataset> {
    let dataset: CocoDataset = read_json(path)?;
    log::debug!(
        "loaded {}: {} images, {} annotations, {} categories",
        path.display(),
        dataset.images.len(),
        dataset.annotations.len(),
        dataset.categories.len()
    );
    Ok(dataset)
}

/// Load a COCO result (prediction) file.
pub fn load_results(path: &Path) -> Result<Vec<CocoDetection>> {
    let detections: Vec<CocoDetection> = read_json(path)?;
    log::debug!("loaded {}: {} detections", path.display(), detections.len());
    Ok(detections)
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid JSON in {}: {}", path.display(), e))
}
