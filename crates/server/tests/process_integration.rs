//! End-to-end tests of the processing endpoints against a mock processor.

mod common;

use std::time::Duration;

use axum::http::{header, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use common::{process_request, TestConfig, TestFixture};
use mediaflow_core::QueueConfig;

const INPUT: &[u8] = b"not really media";

async fn wait_for_idle(fixture: &TestFixture, queue: &str) {
    for _ in 0..100 {
        let response = fixture.get("/api/v1/queues").await;
        let stats = response
            .body
            .as_array()
            .unwrap()
            .iter()
            .find(|q| q["name"] == queue)
            .cloned()
            .unwrap();
        if stats["running"] == 0 && stats["queued"] == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("queue {} did not become idle", queue);
}

#[tokio::test]
async fn test_single_output_streams_progress_and_file() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process("/api/v1/audio/process", Some(r#"{"format":"mp3"}"#), INPUT)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let content_type = response.headers[header::CONTENT_TYPE].to_str().unwrap();
    assert!(content_type.starts_with("multipart/mixed; boundary="));

    let parts = response.parts().await;
    assert_eq!(parts.len(), 4);
    assert_eq!(parts[0].json(), json!({"position": 0}));
    assert_eq!(parts[1].json(), json!({"progress": 0}));
    assert_eq!(parts[2].filename.as_deref(), Some("file1.mp3"));
    assert_eq!(parts[2].content_type.as_deref(), Some("audio/mpeg"));
    assert_eq!(parts[2].body, b"mock output");
    assert_eq!(parts[3].json(), json!({"progress": 100}));

    assert_eq!(fixture.processor.call_count(), 1);
}

#[tokio::test]
async fn test_two_outputs_report_half_way() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process(
            "/api/v1/video/process",
            Some(r#"[{"format":"mp4"},{"format":"webm"}]"#),
            INPUT,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let parts = response.parts().await;
    let progress: Vec<_> = parts
        .iter()
        .filter(|p| p.filename.is_none())
        .map(|p| p.json())
        .collect();
    assert_eq!(
        progress,
        vec![
            json!({"position": 0}),
            json!({"progress": 0}),
            json!({"progress": 50}),
            json!({"progress": 100}),
        ]
    );

    let names: Vec<_> = parts.iter().filter_map(|p| p.filename.clone()).collect();
    assert_eq!(names, vec!["file1.mp4", "file2.webm"]);
}

#[tokio::test]
async fn test_image_request_uses_image_queue() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process(
            "/api/v1/images/process",
            Some(r#"{"resize":{"width":100,"height":1000},"format":"webp"}"#),
            INPUT,
        )
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let parts = response.parts().await;
    assert_eq!(parts[2].filename.as_deref(), Some("file1.webp"));
    assert_eq!(parts[2].content_type.as_deref(), Some("image/webp"));

    let queues = fixture.get("/api/v1/queues").await;
    let image = queues
        .body
        .as_array()
        .unwrap()
        .iter()
        .find(|q| q["name"] == "image")
        .cloned()
        .unwrap();
    assert_eq!(image["completed"], 1);
}

#[tokio::test]
async fn test_processing_error_is_last_event() {
    let fixture = TestFixture::new();
    fixture.processor.set_next_error("encoder exploded");

    let response = fixture
        .post_process("/api/v1/audio/process", Some(r#"{}"#), INPUT)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let parts = response.parts().await;
    let last = parts.last().unwrap().json();
    assert!(last["error"].as_str().unwrap().contains("encoder exploded"));
    assert!(parts.iter().all(|p| p.filename.is_none()));
}

#[tokio::test]
async fn test_missing_body_is_rejected() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process("/api/v1/audio/process", Some(r#"{}"#), "")
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "No body provided");
    assert_eq!(fixture.processor.call_count(), 0);
}

#[tokio::test]
async fn test_missing_options_are_rejected() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process("/api/v1/audio/process", None, INPUT)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "No options provided");
}

#[tokio::test]
async fn test_malformed_options_are_rejected() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process("/api/v1/video/process", Some("{format:"), INPUT)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "Error while parsing options");
}

#[tokio::test]
async fn test_invalid_options_report_their_path() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process(
            "/api/v1/audio/process",
            Some(r#"{"name":"../escape.mp3"}"#),
            INPUT,
        )
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "[/name] Must be a file name, not a path");
    assert_eq!(fixture.processor.call_count(), 0);
}

#[tokio::test]
async fn test_invalid_image_format_is_rejected() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process("/api/v1/images/process", Some(r#"{"format":"x"}"#), INPUT)
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.text(), "[/format] Expected union value");
}

#[tokio::test]
async fn test_full_queue_rejects_and_frees_slot_on_disconnect() {
    let fixture = TestFixture::with_config(TestConfig {
        audio_queue: Some(QueueConfig::new(1, 1)),
        ..Default::default()
    });
    fixture.processor.set_delay(Duration::from_secs(30));

    // Hold the first response without reading it.
    let first = fixture
        .router
        .clone()
        .oneshot(process_request(
            "/api/v1/audio/process",
            Some("{}"),
            INPUT.into(),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let rejected = fixture
        .post_process("/api/v1/audio/process", Some("{}"), INPUT)
        .await;
    assert_eq!(rejected.status, StatusCode::CONFLICT);
    assert_eq!(rejected.text(), "Queue is full");

    // Other kinds have their own queues.
    fixture.processor.set_delay(Duration::ZERO);
    let video = fixture
        .post_process("/api/v1/video/process", Some("{}"), INPUT)
        .await;
    assert_eq!(video.status, StatusCode::OK);

    drop(first);
    wait_for_idle(&fixture, "audio").await;

    let accepted = fixture
        .post_process("/api/v1/audio/process", Some("{}"), INPUT)
        .await;
    assert_eq!(accepted.status, StatusCode::OK);
    assert_eq!(fixture.processor.cancelled_count(), 1);
}

#[tokio::test]
async fn test_output_option_writes_file_instead_of_streaming() {
    let fixture = TestFixture::new();
    let dest = fixture.temp_dir.path().join("out").join("result.mp3");
    let options = json!({"format": "mp3", "output": dest}).to_string();

    let response = fixture
        .post_process("/api/v1/audio/process", Some(&options), INPUT)
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let parts = response.parts().await;
    assert!(parts.iter().all(|p| p.filename.is_none()));
    assert_eq!(parts.last().unwrap().json(), json!({"progress": 100}));
    assert_eq!(std::fs::read(&dest).unwrap(), b"mock output");
}

#[tokio::test]
async fn test_name_option_renames_streamed_file() {
    let fixture = TestFixture::new();

    let response = fixture
        .post_process(
            "/api/v1/audio/process",
            Some(r#"[{"name":"song.mp3"},{}]"#),
            INPUT,
        )
        .await;

    let parts = response.parts().await;
    let names: Vec<_> = parts.iter().filter_map(|p| p.filename.clone()).collect();
    assert_eq!(names, vec!["song.mp3", "file2.mp3"]);
}

#[tokio::test]
async fn test_capabilities_endpoints() {
    let fixture = TestFixture::new();

    let encoders = fixture.get("/api/v1/capabilities/encoders?kind=audio").await;
    assert_eq!(encoders.status, StatusCode::OK);
    let encoders = encoders.body.as_array().unwrap();
    assert_eq!(encoders.len(), 1);
    assert_eq!(encoders[0]["name"], "libmp3lame");

    let filters = fixture.get("/api/v1/capabilities/filters").await;
    assert_eq!(filters.body[0]["name"], "volume");

    let muxers = fixture.get("/api/v1/capabilities/formats?mux=true").await;
    let muxers = muxers.body.as_array().unwrap();
    assert_eq!(muxers.len(), 1);
    assert_eq!(muxers[0]["name"], "mp3");
}

#[tokio::test]
async fn test_metrics_endpoint_reports_queues() {
    let fixture = TestFixture::new();
    fixture
        .post_process("/api/v1/audio/process", Some("{}"), INPUT)
        .await;

    let (status, body) = fixture.get_text("/api/v1/metrics").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.contains("mediaflow_jobs_submitted_total"));
    assert!(body.contains("mediaflow_queue_jobs"));
}
