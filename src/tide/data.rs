use std::collections::BTreeMap;

use crate::coco::{CocoDataset, CocoDetection, ImageId};

/// A ground-truth box or a prediction, in COCO `[x, y, w, h]` pixels.
#[derive(Clone, Debug, PartialEq)]
pub struct Instance {
    /// Position of this instance inside its `Data`.
    pub id: usize,
    pub image: ImageId,
    pub class: i64,
    pub bbox: [f64; 4],
    /// Detection confidence. Ground truth carries 1.0.
    pub score: f64,
    /// Crowd regions: matched predictions are neither TP nor FP.
    pub ignore: bool,
}

/// Named set of instances grouped per image.
///
/// Image order is registration order; evaluation walks the ground truth's
/// images in that order so error lists are reproducible.
#[derive(Clone, Debug, Default)]
pub struct Data {
    pub name: String,
    instances: Vec<Instance>,
    images: Vec<ImageId>,
    by_image: BTreeMap<ImageId, Vec<usize>>,
}

impl Data {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Ground truth from a COCO dataset. Images without annotations are kept.
    pub fn from_coco(name: impl Into<String>, dataset: &CocoDataset) -> Self {
        let mut data = Self::new(name);
        for image in &dataset.images {
            data.add_image(image.id.clone());
        }
        for ann in &dataset.annotations {
            data.add_ground_truth(ann.image_id.clone(), ann.category_id, ann.bbox, ann.iscrowd);
        }
        data
    }

    /// Predictions from a COCO result list.
    pub fn from_results(name: impl Into<String>, detections: &[CocoDetection]) -> Self {
        let mut data = Self::new(name);
        for det in detections {
            data.add_detection(det.image_id.clone(), det.category_id, det.score, det.bbox);
        }
        data
    }

    pub fn add_image(&mut self, image: ImageId) {
        if !self.by_image.contains_key(&image) {
            self.images.push(image.clone());
            self.by_image.insert(image, Vec::new());
        }
    }

    pub fn add_ground_truth(&mut self, image: ImageId, class: i64, bbox: [f64; 4], ignore: bool) {
        self.push(image, class, bbox, 1.0, ignore);
    }

    pub fn add_detection(&mut self, image: ImageId, class: i64, score: f64, bbox: [f64; 4]) {
        self.push(image, class, bbox, score, false);
    }

    fn push(&mut self, image: ImageId, class: i64, bbox: [f64; 4], score: f64, ignore: bool) {
        self.add_image(image.clone());
        let id = self.instances.len();
        self.instances.push(Instance {
            id,
            image: image.clone(),
            class,
            bbox,
            score,
            ignore,
        });
        if let Some(ids) = self.by_image.get_mut(&image) {
            ids.push(id);
        }
    }

    pub fn images(&self) -> &[ImageId] {
        &self.images
    }

    pub fn contains_image(&self, image: &ImageId) -> bool {
        self.by_image.contains_key(image)
    }

    /// Instances on `image` in insertion order.
    pub fn get(&self, image: &ImageId) -> Vec<&Instance> {
        self.by_image
            .get(image)
            .map(|ids| ids.iter().map(|&id| &self.instances[id]).collect())
            .unwrap_or_default()
    }

    /// Instances on `image`, highest score first, capped at `max_dets`.
    ///
    /// The sort is stable so equal scores keep file order.
    pub fn get_ranked(&self, image: &ImageId, max_dets: usize) -> Vec<&Instance> {
        let mut ranked = self.get(image);
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked.truncate(max_dets);
        ranked
    }
}

/// Intersection over union of two `[x, y, w, h]` boxes.
pub fn box_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let inter = intersection(a, b);
    let union = a[2].max(0.0) * a[3].max(0.0) + b[2].max(0.0) * b[3].max(0.0) - inter;
    if union <= 0.0 {
        0.0
    } else {
        inter / union
    }
}

/// Overlap against a crowd region: intersection over the prediction's area.
pub fn crowd_iou(pred: &[f64; 4], crowd: &[f64; 4]) -> f64 {
    let area = pred[2].max(0.0) * pred[3].max(0.0);
    if area <= 0.0 {
        0.0
    } else {
        intersection(pred, crowd) / area
    }
}

fn intersection(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let w = (a[0] + a[2]).min(b[0] + b[2]) - a[0].max(b[0]);
    let h = (a[1] + a[3]).min(b[1] + b[3]) - a[1].max(b[1]);
    if w <= 0.0 || h <= 0.0 {
        0.0
    } else {
        w * h
    }
}
