//! Pipeline and batch runner integration tests
//!
//! Runs the full Validate → Upload → Classify → Resolve chain over a
//! scripted transport and real files in a temp directory.

mod helpers;

use helpers::*;
use inat_classify::models::{BatchReport, ImageOutcome};
use inat_classify::services::{BatchRunner, Method, Pipeline, RequestBody};
use inat_classify::{ErrorKind, Stage, TransportError};
use std::path::Path;
use std::sync::Arc;

async fn run_batch(transport: Arc<ScriptedTransport>, dir: &Path) -> BatchReport {
    let config = test_config();
    BatchRunner::new(Pipeline::new(transport, &config), &config)
        .run(dir)
        .await
        .unwrap()
}

fn file_names(report: &BatchReport) -> Vec<String> {
    report
        .outcomes
        .iter()
        .map(|o| o.image_path().file_name().unwrap().to_string_lossy().into_owned())
        .collect()
}

#[tokio::test]
async fn test_mixed_directory() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_jpeg(temp_dir.path(), "moth1.jpg");
    write_text(temp_dir.path(), "note.txt");
    write_png(temp_dir.path(), "moth2.png");

    let transport = Arc::new(
        ScriptedTransport::happy_path().on_upload_of("moth2.png", http_status(500, "Internal Server Error")),
    );
    let report = run_batch(transport.clone(), temp_dir.path()).await;

    assert_eq!(file_names(&report), vec!["moth1.jpg", "moth2.png"]);

    assert!(report.outcomes[0].is_success());
    let failure = report.outcomes[1].as_failure().unwrap();
    assert_eq!(failure.stage, Stage::Upload);
    assert_eq!(failure.kind(), ErrorKind::Transport);

    // 500 is not retried, and note.txt never reached the network
    let uploads: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|c| c.file_name().map(str::to_string))
        .filter(|name| name != "moth1.jpg")
        .collect();
    assert_eq!(uploads, vec!["moth2.png"]);
    assert!(transport.calls().iter().all(|c| !c.url.contains("note")));
}

#[tokio::test]
async fn test_one_corrupt_image_of_many() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_jpeg(temp_dir.path(), "a.jpg");
    write_jpeg(temp_dir.path(), "b.jpg");
    write_corrupt(temp_dir.path(), "c.jpg");
    write_png(temp_dir.path(), "d.png");
    write_jpeg(temp_dir.path(), "e.JPEG");

    let transport = Arc::new(ScriptedTransport::happy_path());
    let report = run_batch(transport.clone(), temp_dir.path()).await;

    assert_eq!(file_names(&report), vec!["a.jpg", "b.jpg", "c.jpg", "d.png", "e.JPEG"]);

    let summary = report.summary();
    assert_eq!(summary.total, 5);
    assert_eq!(summary.succeeded, 4);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures_by_stage.get(&Stage::Validate), Some(&1));

    let failure = report.outcomes[2].as_failure().unwrap();
    assert_eq!(failure.kind(), ErrorKind::Validation);

    // Four uploads; the corrupt file was never sent
    assert_eq!(transport.calls_to("/photos"), 4);
}

#[tokio::test]
async fn test_best_candidate_selected() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_jpeg(temp_dir.path(), "moth1.jpg");

    let transport = Arc::new(
        ScriptedTransport::new()
            .on("/photos", Ok(upload_body(123456)))
            .on(
                "/score_image",
                Ok(scores_body(&[(876427, "Bundletia moth", 0.95), (111, "Other", 0.40)])),
            )
            .on("/taxa/", Ok(taxon_body())),
    );
    let pipeline = Pipeline::new(transport.clone(), &test_config());

    let result = pipeline.process(&image).await.unwrap();
    assert_eq!(result.taxon_id(), 876427);
    assert_eq!(result.score(), 0.95);
    assert_eq!(result.hierarchy().subfamily.as_deref(), Some("Arctiinae-Tiger Moths"));
    assert_eq!(result.hierarchy().tribe, None);
    assert_eq!(result.hierarchy().genus.as_deref(), Some("Bundletia"));

    let calls = transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[1].method, Method::POST);
    assert_eq!(calls[1].body, RequestBody::Json(serde_json::json!({"photo_id": 123456})));
    assert_eq!(calls[2].method, Method::GET);
    assert_eq!(calls[2].url, "http://inat.test/v1/taxa/876427");

    // Absent levels serialize as null, never dropped
    let json = serde_json::to_value(&result).unwrap();
    let hierarchy = json["hierarchy"].as_object().unwrap();
    assert_eq!(hierarchy.len(), 3);
    assert!(hierarchy["tribe"].is_null());
}

#[tokio::test]
async fn test_unsupported_extension_makes_no_call() {
    let temp_dir = tempfile::tempdir().unwrap();
    let notes = write_text(temp_dir.path(), "notes.gif");

    let transport = Arc::new(ScriptedTransport::happy_path());
    let pipeline = Pipeline::new(transport.clone(), &test_config());

    let failure = pipeline.process(&notes).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Validate);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_jpeg(temp_dir.path(), "moth1.jpg");

    let transport = Arc::new(
        ScriptedTransport::new()
            .on("/photos", Ok(upload_body(7)))
            .on(
                "/score_image",
                Err(TransportError::Network {
                    cause: "connection reset".to_string(),
                }),
            )
            .on("/score_image", http_status(429, "slow down"))
            .on("/score_image", Ok(scores_body(&[(876427, "Bundletia moth", 0.95)])))
            .on("/taxa/", Ok(taxon_body())),
    );
    let pipeline = Pipeline::new(transport.clone(), &test_config());

    let result = pipeline.process(&image).await.unwrap();
    assert_eq!(result.taxon_id(), 876427);
    assert_eq!(transport.calls_to("/photos"), 1);
    assert_eq!(transport.calls_to("/score_image"), 3);
}

#[tokio::test]
async fn test_retries_exhausted_fail_at_stage() {
    let temp_dir = tempfile::tempdir().unwrap();
    let image = write_jpeg(temp_dir.path(), "moth1.jpg");

    let transport = Arc::new(
        ScriptedTransport::new()
            .on("/photos", Ok(upload_body(1)))
            .on("/score_image", Ok(scores_body(&[(876427, "Bundletia moth", 0.95)])))
            .on("/taxa/", http_status(503, "unavailable")),
    );
    let pipeline = Pipeline::new(transport.clone(), &test_config());

    let failure = pipeline.process(&image).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Resolve);
    assert_eq!(failure.kind(), ErrorKind::Transport);
    assert_eq!(transport.calls_to("/taxa/"), 3);
}

#[tokio::test]
async fn test_no_candidates_is_no_match() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_jpeg(temp_dir.path(), "a.jpg");
    write_jpeg(temp_dir.path(), "b.jpg");

    let transport = Arc::new(
        ScriptedTransport::new()
            .on("/photos", Ok(upload_body(1)))
            .on("/score_image", Ok(scores_body(&[])))
            .on("/taxa/", Ok(taxon_body())),
    );
    let report = run_batch(transport.clone(), temp_dir.path()).await;

    assert_eq!(report.outcomes.len(), 2);
    for outcome in &report.outcomes {
        let failure = outcome.as_failure().unwrap();
        assert_eq!(failure.stage, Stage::Classify);
        assert_eq!(failure.kind(), ErrorKind::NoMatch);
    }
    assert_eq!(transport.calls_to("/taxa/"), 0);
}

#[tokio::test]
async fn test_outcomes_follow_sorted_path_order() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_jpeg(temp_dir.path(), "z/late.jpg");
    write_jpeg(temp_dir.path(), "a/early.jpg");
    write_jpeg(temp_dir.path(), "m.jpg");

    let transport = Arc::new(ScriptedTransport::happy_path());
    let report = run_batch(transport.clone(), temp_dir.path()).await;

    let relative: Vec<_> = report
        .outcomes
        .iter()
        .map(ImageOutcome::image_path)
        .map(|p| p.strip_prefix(temp_dir.path()).unwrap().to_path_buf())
        .collect();
    assert_eq!(
        relative,
        vec![
            Path::new("a/early.jpg").to_path_buf(),
            Path::new("m.jpg").to_path_buf(),
            Path::new("z/late.jpg").to_path_buf(),
        ]
    );
}
