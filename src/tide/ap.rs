use std::collections::BTreeMap;

/// Number of recall thresholds in COCO interpolated AP (0.00, 0.01, .., 1.00).
const RECALL_STEPS: usize = 101;

/// Scored TP/FP points and the ground-truth positive count for one class.
#[derive(Clone, Debug, Default)]
pub struct ApData {
    points: Vec<(f64, bool)>,
    num_gt_positives: usize,
}

impl ApData {
    pub fn push(&mut self, score: f64, is_true: bool) {
        self.points.push((score, is_true));
    }

    pub fn add_gt_positives(&mut self, count: usize) {
        self.num_gt_positives += count;
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty() && self.num_gt_positives == 0
    }

    /// 101-point interpolated average precision, in percent.
    pub fn ap(&self) -> f64 {
        if self.num_gt_positives == 0 {
            return 0.0;
        }

        let mut points = self.points.clone();
        points.sort_by(|a, b| b.0.total_cmp(&a.0));

        let mut precisions = Vec::with_capacity(points.len());
        let mut recalls = Vec::with_capacity(points.len());
        let (mut num_true, mut num_false) = (0usize, 0usize);
        for (_, is_true) in &points {
            if *is_true {
                num_true += 1;
            } else {
                num_false += 1;
            }
            precisions.push(num_true as f64 / (num_true + num_false) as f64);
            recalls.push(num_true as f64 / self.num_gt_positives as f64);
        }

        // Envelope: precision never increases with recall.
        for i in (1..precisions.len()).rev() {
            if precisions[i] > precisions[i - 1] {
                precisions[i - 1] = precisions[i];
            }
        }

        let mut total = 0.0;
        for step in 0..RECALL_STEPS {
            let threshold = step as f64 / (RECALL_STEPS - 1) as f64;
            let idx = recalls.partition_point(|&recall| recall < threshold);
            if let Some(precision) = precisions.get(idx) {
                total += precision;
            }
        }
        total / RECALL_STEPS as f64 * 100.0
    }
}

/// Per-class AP data keyed by category id.
#[derive(Clone, Debug, Default)]
pub struct ClassedApData {
    classes: BTreeMap<i64, ApData>,
}

impl ClassedApData {
    pub fn push(&mut self, class: i64, score: f64, is_true: bool) {
        self.classes.entry(class).or_default().push(score, is_true);
    }

    pub fn add_gt_positives(&mut self, class: i64, count: usize) {
        self.classes.entry(class).or_default().add_gt_positives(count);
    }

    pub fn class_ap(&self, class: i64) -> Option<f64> {
        self.classes.get(&class).map(ApData::ap)
    }

    /// Mean AP over classes that have either predictions or ground truth.
    pub fn map(&self) -> f64 {
        let aps: Vec<f64> = self
            .classes
            .values()
            .filter(|data| !data.is_empty())
            .map(ApData::ap)
            .collect();
        if aps.is_empty() {
            0.0
        } else {
            aps.iter().sum::<f64>() / aps.len() as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn perfect_detections_score_100() {
        let mut data = ApData::default();
        data.add_gt_positives(2);
        data.push(0.9, true);
        data.push(0.8, true);
        assert!(close(data.ap(), 100.0));
    }

    #[test]
    fn no_ground_truth_scores_zero() {
        let mut data = ApData::default();
        data.push(0.9, false);
        assert_eq!(data.ap(), 0.0);
        assert!(!data.is_empty());
    }

    #[test]
    fn half_recall_covers_51_thresholds() {
        let mut data = ApData::default();
        data.add_gt_positives(2);
        data.push(0.9, true);
        // recall 0.5 reaches thresholds 0.00..=0.50
        assert!(close(data.ap(), 51.0 / 101.0 * 100.0));
    }

    #[test]
    fn false_positive_ranked_first_is_interpolated() {
        let mut data = ApData::default();
        data.add_gt_positives(1);
        data.push(0.9, false);
        data.push(0.5, true);
        // precision 0.5 at full recall, envelope lifts the first point to 0.5
        assert!(close(data.ap(), 50.0));
    }

    #[test]
    fn map_skips_empty_classes() {
        let mut data = ClassedApData::default();
        data.add_gt_positives(1, 1);
        data.push(1, 0.9, true);
        data.add_gt_positives(2, 0);
        data.add_gt_positives(3, 1);
        assert!(close(data.map(), 50.0));
        assert!(close(data.class_ap(1).unwrap(), 100.0));
        assert_eq!(data.class_ap(4), None);
    }
}
