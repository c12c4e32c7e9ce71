use anyhow::Result;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use loc_tide::{run_tide_evaluation, RunSpec};

fn write_json(path: &Path, value: &Value) -> Result<()> {
    std::fs::write(path, serde_json::to_vec(value)?)?;
    Ok(())
}

fn ground_truth() -> Value {
    json!({
        "images": [
            {"id": 1, "file_name": "a.jpg", "width": 100, "height": 100},
            {"id": 2, "file_name": "b.jpg", "width": 100, "height": 100},
            {"id": 3, "file_name": "c.jpg", "width": 100, "height": 100}
        ],
        "annotations": [
            {"id": 1, "image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10], "area": 100, "iscrowd": 0, "segmentation": [0, 0, 10, 0, 10, 10, 0, 10]},
            {"id": 2, "image_id": 1, "category_id": 1, "bbox": [50, 50, 20, 20], "area": 400, "iscrowd": 0},
            {"id": 3, "image_id": 2, "category_id": 1, "bbox": [10, 10, 10, 10], "area": 100, "iscrowd": 0, "segmentation": []}
        ],
        "categories": [{"id": 1, "name": "starfish", "supercategory": "animal"}]
    })
}

fn predictions() -> Value {
    json!([
        {"image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 10], "score": 0.9},
        {"image_id": 1, "category_id": 1, "bbox": [0, 0, 10, 9], "score": 0.8},
        {"image_id": 3, "category_id": 1, "bbox": [5, 5, 10, 10], "score": 0.7}
    ])
}

fn setup(dir: &Path) -> Result<RunSpec> {
    let gt_dir = dir.join("ground_truths");
    let pred_dir = dir.join("25conf_balanced_starfish_test_run_01");
    std::fs::create_dir_all(&gt_dir)?;
    std::fs::create_dir_all(&pred_dir)?;
    let gt_path = gt_dir.join("ground_truth_test_starfish.json");
    let pred_path = pred_dir.join("predictions.json");
    write_json(&gt_path, &ground_truth())?;
    write_json(&pred_path, &predictions())?;
    Ok(RunSpec {
        ground_truth: gt_path,
        predictions: pred_path,
        tag: "starfish_balanced".to_string(),
        out_dir: dir.join("tide_error_evaluation").join("starfish_balanced"),
    })
}

fn patched_leftovers(run: &RunSpec) -> Result<Vec<PathBuf>> {
    let dir = run.ground_truth.parent().unwrap_or(Path::new("."));
    Ok(std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("patched_"))
        .map(|entry| entry.path())
        .collect())
}

#[test]
fn run_writes_summary_plot_and_counts() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let run = setup(dir.path())?;
    let original = std::fs::read(&run.ground_truth)?;

    let outcome = run_tide_evaluation(&run, true)?;

    // Duplicate on image 1, missed box on image 1, missed box on image 2,
    // background on image 3.
    let counts = &outcome.counts;
    assert_eq!(counts.total(), 4);
    let names: Vec<&str> = counts.entries().iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["DuplicateError", "MissedError", "BackgroundError"]);
    assert_eq!(counts.get("MissedError").map(|e| e.count), Some(2));

    let summary = std::fs::read_to_string(&outcome.summary_path)?;
    assert_eq!(
        outcome.summary_path,
        run.out_dir.join("starfish_balanced_tide_dAP_summary.txt")
    );
    assert!(summary.starts_with("-- predictions --"));
    assert!(summary.contains("bbox AP @ 25:"));

    assert_eq!(outcome.plot_paths.len(), 1);
    assert!(outcome.plot_paths[0].exists());

    let report = std::fs::read_to_string(&outcome.counts_path)?;
    assert!(report.starts_with("Error Type Counts for starfish_balanced\nTotal Errors: 4\n\n"));
    assert!(report.contains("MissedError         :    2 (50.0%)"));
    assert!(report.contains("DuplicateError      :    1 (25.0%)"));

    // Original untouched, patched copy kept beside it with repaired polygons.
    assert_eq!(std::fs::read(&run.ground_truth)?, original);
    let patched = outcome.patched_ground_truth.expect("patched path kept");
    assert_eq!(patched.parent(), run.ground_truth.parent());
    let doc: Value = serde_json::from_str(&std::fs::read_to_string(&patched)?)?;
    assert_eq!(
        doc["annotations"][0]["segmentation"],
        json!([[0, 0, 10, 0, 10, 10, 0, 10]])
    );
    assert_eq!(
        doc["annotations"][2]["segmentation"],
        json!([[10, 10, 20, 10, 20, 20, 10, 20]])
    );
    Ok(())
}

#[test]
fn patched_file_is_removed_when_not_kept() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let run = setup(dir.path())?;

    let outcome = run_tide_evaluation(&run, false)?;
    assert!(outcome.patched_ground_truth.is_none());

    assert!(patched_leftovers(&run)?.is_empty());
    Ok(())
}

#[test]
fn missing_predictions_abort_the_run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let mut run = setup(dir.path())?;
    run.predictions = dir.path().join("absent").join("predictions.json");

    let err = run_tide_evaluation(&run, false).unwrap_err();
    assert!(err.to_string().contains("predictions.json"));
    assert!(!run.out_dir.join("starfish_balanced_error_counts.txt").exists());
    assert!(patched_leftovers(&run)?.is_empty());
    Ok(())
}

#[test]
fn empty_predictions_report_only_missed() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let run = setup(dir.path())?;
    write_json(&run.predictions, &json!([]))?;

    let outcome = run_tide_evaluation(&run, false)?;
    assert_eq!(outcome.ap, 0.0);
    assert_eq!(outcome.counts.total(), 3);
    assert_eq!(outcome.counts.entries().len(), 1);
    assert_eq!(outcome.counts.entries()[0].percent, 100.0);
    Ok(())
}
