use std::collections::BTreeMap;

use super::ap::ClassedApData;
use super::data::{box_iou, crowd_iou, Data, Instance};
use super::errors::{DetectionError, ErrorKind, Fix, SpecialErrorKind};
use super::Mode;
use crate::coco::ImageId;

/// A prediction that takes part in AP: matched (TP) or unmatched (FP).
#[derive(Clone, Debug)]
struct PredRecord {
    class: i64,
    score: f64,
    is_true: bool,
}

/// Result of evaluating one prediction set against one ground truth.
#[derive(Clone, Debug)]
pub struct TideRun {
    /// Name of the prediction set.
    pub name: String,
    pub mode: Mode,
    pub pos_threshold: f64,
    pub bg_threshold: f64,
    pub max_dets: usize,
    /// Classified errors in evaluation order: per ground-truth image,
    /// prediction errors by descending score, then missed ground truth.
    pub errors: Vec<DetectionError>,
    records: Vec<PredRecord>,
    positives: BTreeMap<i64, usize>,
    false_negatives: Vec<i64>,
    ap: f64,
}

impl TideRun {
    pub(crate) fn new(
        gt: &Data,
        preds: &Data,
        mode: Mode,
        pos_threshold: f64,
        bg_threshold: f64,
        max_dets: usize,
    ) -> Self {
        let mut run = Self {
            name: preds.name.clone(),
            mode,
            pos_threshold,
            bg_threshold,
            max_dets,
            errors: Vec::new(),
            records: Vec::new(),
            positives: BTreeMap::new(),
            false_negatives: Vec::new(),
            ap: 0.0,
        };

        let orphaned: usize = preds
            .images()
            .iter()
            .filter(|image| !gt.contains_image(image))
            .map(|image| preds.get(image).len())
            .sum();
        if orphaned > 0 {
            log::warn!(
                "{}: {} predictions reference images absent from {}; ignored",
                preds.name,
                orphaned,
                gt.name
            );
        }

        for image in gt.images() {
            let truths = gt.get(image);
            let ranked = preds.get_ranked(image, max_dets);
            run.eval_image(image, &ranked, &truths);
        }

        run.ap = run.ap_data(std::iter::empty()).map();
        log::debug!(
            "{}: {} AP @ {:.2} = {:.2}, {} errors",
            run.name,
            mode.name(),
            pos_threshold,
            run.ap,
            run.errors.len()
        );
        run
    }

    fn eval_image(&mut self, image: &ImageId, preds: &[&Instance], truths: &[&Instance]) {
        let gt: Vec<&Instance> = truths.iter().copied().filter(|t| !t.ignore).collect();
        let crowd: Vec<&Instance> = truths.iter().copied().filter(|t| t.ignore).collect();

        for truth in &gt {
            *self.positives.entry(truth.class).or_default() += 1;
        }

        if preds.is_empty() {
            for truth in &gt {
                self.false_negatives.push(truth.class);
                self.errors.push(missed(image, truth));
            }
            return;
        }

        let ious: Vec<Vec<f64>> = preds
            .iter()
            .map(|pred| gt.iter().map(|truth| box_iou(&pred.bbox, &truth.bbox)).collect())
            .collect();

        // Greedy matching in score order, highest-IoU free ground truth wins.
        let mut gt_used = vec![false; gt.len()];
        let mut record_ids: Vec<Option<usize>> = Vec::with_capacity(preds.len());
        for (p, pred) in preds.iter().enumerate() {
            let mut best: Option<(usize, f64)> = None;
            for (g, truth) in gt.iter().enumerate() {
                if gt_used[g] || truth.class != pred.class {
                    continue;
                }
                let iou = ious[p][g];
                if iou >= self.pos_threshold && best.map_or(true, |(_, b)| iou > b) {
                    best = Some((g, iou));
                }
            }

            let is_true = match best {
                Some((g, _)) => {
                    gt_used[g] = true;
                    true
                }
                None => {
                    let in_crowd = crowd.iter().any(|region| {
                        region.class == pred.class
                            && crowd_iou(&pred.bbox, &region.bbox) >= self.pos_threshold
                    });
                    if in_crowd {
                        record_ids.push(None);
                        continue;
                    }
                    false
                }
            };
            record_ids.push(Some(self.records.len()));
            self.records.push(PredRecord {
                class: pred.class,
                score: pred.score,
                is_true,
            });
        }

        let mut gt_usable = vec![false; gt.len()];
        for (p, pred) in preds.iter().enumerate() {
            let Some(record) = record_ids[p] else {
                continue;
            };
            if self.records[record].is_true {
                continue;
            }
            let error = self.classify(image, pred, record, &gt, &ious[p], &gt_used, &mut gt_usable);
            self.errors.push(error);
        }

        for (g, truth) in gt.iter().enumerate() {
            if gt_used[g] {
                continue;
            }
            self.false_negatives.push(truth.class);
            if !gt_usable[g] {
                self.errors.push(missed(image, truth));
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn classify(
        &self,
        image: &ImageId,
        pred: &Instance,
        record: usize,
        gt: &[&Instance],
        ious: &[f64],
        gt_used: &[bool],
        gt_usable: &mut [bool],
    ) -> DetectionError {
        let suppress = Fix::Suppress { record };
        let error = |kind: ErrorKind, target: Option<usize>, fix: Fix| DetectionError {
            kind,
            image: image.clone(),
            pred: Some(pred.clone()),
            gt: target.map(|g| gt[g].clone()),
            fix,
        };
        let best = |keep: &dyn Fn(usize) -> bool| -> Option<(usize, f64)> {
            (0..gt.len())
                .filter(|&g| keep(g))
                .map(|g| (g, ious[g]))
                .fold(None, |acc, (g, iou)| match acc {
                    Some((_, b)) if b >= iou => acc,
                    _ => Some((g, iou)),
                })
        };
        // First fixable error on a free ground truth claims it.
        let mut claim = |g: usize, class: i64| {
            if gt_used[g] || gt_usable[g] {
                suppress
            } else {
                gt_usable[g] = true;
                Fix::Promote { record, class }
            }
        };
        let in_band = |iou: f64| iou >= self.bg_threshold && iou <= self.pos_threshold;

        if gt.is_empty() {
            return error(ErrorKind::Background, None, suppress);
        }

        if let Some((g, iou)) = best(&|g: usize| gt[g].class == pred.class) {
            if in_band(iou) {
                let fix = claim(g, pred.class);
                return error(ErrorKind::Box, Some(g), fix);
            }
        }

        let other_class = best(&|g: usize| gt[g].class != pred.class);
        if let Some((g, iou)) = other_class {
            if iou >= self.pos_threshold {
                let fix = claim(g, gt[g].class);
                return error(ErrorKind::Class, Some(g), fix);
            }
        }

        if let Some((g, iou)) = best(&|g: usize| gt[g].class == pred.class && gt_used[g]) {
            if iou >= self.pos_threshold {
                return error(ErrorKind::Duplicate, Some(g), suppress);
            }
        }

        if let Some((g, iou)) = other_class {
            if in_band(iou) {
                return error(ErrorKind::Both, Some(g), suppress);
            }
        }

        if let Some((_, iou)) = best(&|_: usize| true) {
            if iou <= self.bg_threshold {
                return error(ErrorKind::Background, None, suppress);
            }
        }

        error(ErrorKind::Other, None, suppress)
    }

    fn ap_data(&self, fixes: impl Iterator<Item = Fix>) -> ClassedApData {
        let mut records: Vec<Option<PredRecord>> = self.records.iter().cloned().map(Some).collect();
        let mut positives = self.positives.clone();
        for fix in fixes {
            match fix {
                Fix::Suppress { record } => records[record] = None,
                Fix::Promote { record, class } => {
                    if let Some(rec) = records[record].as_mut() {
                        rec.class = class;
                        rec.is_true = true;
                    }
                }
                Fix::DropPositive { class } => {
                    if let Some(count) = positives.get_mut(&class) {
                        *count = count.saturating_sub(1);
                    }
                }
            }
        }

        let mut data = ClassedApData::default();
        for (class, count) in positives {
            data.add_gt_positives(class, count);
        }
        for rec in records.into_iter().flatten() {
            data.push(rec.class, rec.score, rec.is_true);
        }
        data
    }

    /// mAP before any fix, in percent.
    pub fn ap(&self) -> f64 {
        self.ap
    }

    /// Per-class AP before any fix.
    pub fn class_ap(&self, class: i64) -> Option<f64> {
        self.ap_data(std::iter::empty()).class_ap(class)
    }

    /// mAP after fixing every error of `kind`.
    pub fn fixed_ap(&self, kind: ErrorKind) -> f64 {
        let fixes = self.errors.iter().filter(|e| e.kind == kind).map(|e| e.fix);
        self.ap_data(fixes).map()
    }

    /// mAP after fixing a special error type.
    pub fn fixed_special_ap(&self, kind: SpecialErrorKind) -> f64 {
        match kind {
            SpecialErrorKind::FalsePositive => {
                let fixes = self
                    .records
                    .iter()
                    .enumerate()
                    .filter(|(_, rec)| !rec.is_true)
                    .map(|(record, _)| Fix::Suppress { record });
                self.ap_data(fixes).map()
            }
            SpecialErrorKind::FalseNegative => {
                let fixes = self
                    .false_negatives
                    .iter()
                    .map(|&class| Fix::DropPositive { class });
                self.ap_data(fixes).map()
            }
        }
    }

    /// dAP per main error type, in table order.
    pub fn main_errors(&self) -> Vec<(ErrorKind, f64)> {
        ErrorKind::MAIN
            .iter()
            .map(|&kind| (kind, self.fixed_ap(kind) - self.ap))
            .collect()
    }

    /// dAP for false positives and false negatives as a whole.
    pub fn special_errors(&self) -> Vec<(SpecialErrorKind, f64)> {
        SpecialErrorKind::ALL
            .iter()
            .map(|&kind| (kind, self.fixed_special_ap(kind) - self.ap))
            .collect()
    }
}

fn missed(image: &ImageId, truth: &Instance) -> DetectionError {
    DetectionError {
        kind: ErrorKind::Missed,
        image: image.clone(),
        pred: None,
        gt: Some(truth.clone()),
        fix: Fix::DropPositive { class: truth.class },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BACKGROUND_THRESHOLD, MAX_DETS, POS_THRESHOLD};

    fn img(id: i64) -> ImageId {
        ImageId::Num(id)
    }

    fn evaluate(gt: &Data, preds: &Data) -> TideRun {
        TideRun::new(gt, preds, Mode::Box, POS_THRESHOLD, BACKGROUND_THRESHOLD, MAX_DETS)
    }

    fn kinds(run: &TideRun) -> Vec<ErrorKind> {
        run.errors.iter().map(|e| e.kind).collect()
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn perfect_predictions_have_no_errors() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        gt.add_ground_truth(img(2), 2, [5.0, 5.0, 20.0, 20.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);
        preds.add_detection(img(2), 2, 0.8, [5.0, 5.0, 20.0, 20.0]);

        let run = evaluate(&gt, &preds);
        assert!(run.errors.is_empty());
        assert!(close(run.ap(), 100.0));
        assert!(run.main_errors().iter().all(|(_, dap)| close(*dap, 0.0)));
    }

    #[test]
    fn wrong_class_on_object_is_class_error() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 2, 0.9, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Class]);
        assert!(close(run.ap(), 0.0));
        assert!(close(run.fixed_ap(ErrorKind::Class), 100.0));
    }

    #[test]
    fn second_hit_on_matched_object_is_duplicate() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.8, [0.0, 0.0, 10.0, 9.0]);
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Duplicate]);
        let dup = &run.errors[0];
        assert_eq!(dup.pred.as_ref().map(|p| p.score), Some(0.8));
        assert_eq!(dup.gt.as_ref().map(|g| g.class), Some(1));
    }

    #[test]
    fn predictions_without_nearby_objects_are_background() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        gt.add_image(img(2));
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);
        preds.add_detection(img(1), 1, 0.95, [50.0, 50.0, 10.0, 10.0]);
        preds.add_detection(img(2), 1, 0.97, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Background, ErrorKind::Background]);
        assert!(run.fixed_ap(ErrorKind::Background) > run.ap());
    }

    #[test]
    fn image_without_predictions_misses_every_object() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        gt.add_ground_truth(img(2), 1, [0.0, 0.0, 10.0, 10.0], false);
        gt.add_ground_truth(img(2), 1, [30.0, 30.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Missed, ErrorKind::Missed]);
        assert!(close(run.ap(), 34.0 / 101.0 * 100.0));
        assert!(close(run.fixed_ap(ErrorKind::Missed), 100.0));
        assert!(close(
            run.fixed_special_ap(SpecialErrorKind::FalseNegative),
            100.0
        ));
    }

    #[test]
    fn poorly_localized_hit_is_box_error_not_missed() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        // IoU 0.2: between background and positivity thresholds
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 2.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Box]);
        assert!(close(run.fixed_ap(ErrorKind::Box), 100.0));
        let main = run.main_errors();
        assert_eq!(main[1].0, ErrorKind::Box);
        assert!(close(main[1].1, 100.0));
    }

    #[test]
    fn wrong_class_and_poorly_localized_is_both() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 2, 0.9, [0.0, 0.0, 10.0, 2.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Both, ErrorKind::Missed]);
    }

    #[test]
    fn only_one_box_error_claims_a_free_object() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 2.0]);
        preds.add_detection(img(1), 1, 0.8, [0.0, 8.0, 10.0, 2.0]);

        let run = evaluate(&gt, &preds);
        assert_eq!(kinds(&run), vec![ErrorKind::Box, ErrorKind::Box]);
        assert_eq!(run.errors[0].fix, Fix::Promote { record: 0, class: 1 });
        assert_eq!(run.errors[1].fix, Fix::Suppress { record: 1 });
        assert!(close(run.fixed_ap(ErrorKind::Box), 100.0));
    }

    #[test]
    fn crowd_regions_neither_reward_nor_penalize() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 100.0, 100.0], true);
        gt.add_ground_truth(img(1), 1, [200.0, 200.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.95, [10.0, 10.0, 5.0, 5.0]);
        preds.add_detection(img(1), 1, 0.9, [200.0, 200.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert!(run.errors.is_empty());
        assert!(close(run.ap(), 100.0));
    }

    #[test]
    fn predictions_on_unknown_images_are_dropped() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);
        preds.add_detection(img(99), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert!(run.errors.is_empty());
        assert!(close(run.ap(), 100.0));
    }

    #[test]
    fn detections_beyond_max_dets_are_not_scored() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [0.0, 0.0, 10.0, 10.0]);
        preds.add_detection(img(1), 1, 0.1, [50.0, 50.0, 10.0, 10.0]);

        let run = TideRun::new(&gt, &preds, Mode::Box, POS_THRESHOLD, BACKGROUND_THRESHOLD, 1);
        assert!(run.errors.is_empty());
    }

    #[test]
    fn removing_false_positives_recovers_precision() {
        let mut gt = Data::new("gt");
        gt.add_ground_truth(img(1), 1, [0.0, 0.0, 10.0, 10.0], false);
        let mut preds = Data::new("predictions");
        preds.add_detection(img(1), 1, 0.9, [40.0, 40.0, 10.0, 10.0]);
        preds.add_detection(img(1), 1, 0.5, [0.0, 0.0, 10.0, 10.0]);

        let run = evaluate(&gt, &preds);
        assert!(close(run.ap(), 50.0));
        let special = run.special_errors();
        assert_eq!(special[0].0, SpecialErrorKind::FalsePositive);
        assert!(close(special[0].1, 50.0));
        assert!(close(special[1].1, 0.0));
        assert!(close(run.class_ap(1).unwrap(), 50.0));
    }
}
