//! Common test utilities for in-process API testing.
//!
//! The fixture builds the real router around a [`MockProcessor`], so the
//! queueing, progress and multipart layers run unchanged without ffmpeg.

use std::convert::Infallible;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use http_body_util::BodyExt;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use mediaflow_core::processor::{EncoderInfo, FilterInfo, FormatInfo, StreamKind};
use mediaflow_core::testing::{MockProcessor, Part};
use mediaflow_core::{Config, EncoderCapabilities, QueueConfig};
use mediaflow_server::state::AppState;

/// Re-export fixtures for test convenience
#[allow(unused_imports)]
pub use mediaflow_core::testing::fixtures;

/// Test fixture wrapping the router and its mock processor.
pub struct TestFixture {
    pub router: Router,
    pub state: Arc<AppState>,
    pub processor: Arc<MockProcessor>,
    /// Scratch space for `output` destinations.
    pub temp_dir: TempDir,
}

/// Response from a JSON request
#[derive(Debug)]
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
}

/// Response from a processing request
#[derive(Debug)]
pub struct ProcessResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ProcessResponse {
    /// Plain-text body of an error response.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Decodes the multipart body with multer, dropping keepalive parts.
    pub async fn parts(&self) -> Vec<Part> {
        let content_type = self
            .headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .expect("missing content type");
        // `multer::parse_boundary` only accepts multipart/form-data; the
        // response is multipart/mixed, so read the parameter directly.
        let boundary = content_type
            .split(';')
            .find_map(|param| param.trim().strip_prefix("boundary="))
            .map(|b| b.trim_matches('"').to_string())
            .expect("missing boundary");

        let body = self.body.clone();
        let stream = futures::stream::once(async move { Ok::<_, Infallible>(body) });
        let mut multipart = multer::Multipart::new(stream, boundary);

        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await.expect("malformed multipart body") {
            let content_type = field.content_type().map(|mime| mime.to_string());
            let filename = field.file_name().map(str::to_string);
            let body = field.bytes().await.expect("part body").to_vec();
            let part = Part {
                content_type,
                filename,
                body,
            };
            if !part.is_keepalive() {
                parts.push(part);
            }
        }
        parts
    }
}

/// Overrides applied on top of the default config.
#[derive(Debug, Default, Clone)]
pub struct TestConfig {
    pub image_queue: Option<QueueConfig>,
    pub audio_queue: Option<QueueConfig>,
    pub video_queue: Option<QueueConfig>,
}

impl TestFixture {
    pub fn new() -> Self {
        Self::with_config(TestConfig::default())
    }

    pub fn with_config(test_config: TestConfig) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");

        let mut config = Config::default();
        config.processor.temp_dir = temp_dir.path().join("tmp");
        if let Some(queue) = test_config.image_queue {
            config.queues.image = queue;
        }
        if let Some(queue) = test_config.audio_queue {
            config.queues.audio = queue;
        }
        if let Some(queue) = test_config.video_queue {
            config.queues.video = queue;
        }

        let processor = Arc::new(MockProcessor::new());
        let state = Arc::new(
            AppState::new(config, processor.clone()).with_capabilities(sample_capabilities()),
        );
        let router = mediaflow_server::api::create_router(Arc::clone(&state));

        Self {
            router,
            state,
            processor,
            temp_dir,
        }
    }

    /// GET `uri` and decode the JSON body.
    pub async fn get(&self, uri: &str) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        TestResponse { status, body }
    }

    /// GET `uri` and return the raw text body.
    #[allow(dead_code)]
    pub async fn get_text(&self, uri: &str) -> (StatusCode, String) {
        let response = self
            .router
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, String::from_utf8_lossy(&bytes).to_string())
    }

    /// POST `body` to a processing endpoint and read the whole response.
    pub async fn post_process(
        &self,
        uri: &str,
        options: Option<&str>,
        body: impl Into<Bytes>,
    ) -> ProcessResponse {
        let response = self
            .router
            .clone()
            .oneshot(process_request(uri, options, body.into()))
            .await
            .unwrap();

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        ProcessResponse {
            status,
            headers,
            body,
        }
    }
}

/// Builds a processing request with an optional `X-Options` header.
pub fn process_request(uri: &str, options: Option<&str>, body: Bytes) -> Request<Body> {
    let mut builder = Request::builder().method("POST").uri(uri);
    if let Some(options) = options {
        builder = builder.header("X-Options", options);
    }
    builder.body(Body::from(body)).unwrap()
}

fn sample_capabilities() -> EncoderCapabilities {
    EncoderCapabilities {
        encoders: vec![
            EncoderInfo {
                name: "libx264".to_string(),
                kind: StreamKind::Video,
                description: "libx264 H.264 / AVC".to_string(),
            },
            EncoderInfo {
                name: "libmp3lame".to_string(),
                kind: StreamKind::Audio,
                description: "libmp3lame MP3 (MPEG audio layer 3)".to_string(),
            },
        ],
        filters: vec![FilterInfo {
            name: "volume".to_string(),
            io: "A->A".to_string(),
            description: "Change input volume.".to_string(),
        }],
        formats: vec![
            FormatInfo {
                name: "mp3".to_string(),
                description: "MP3 (MPEG audio layer 3)".to_string(),
                demux: true,
                mux: true,
            },
            FormatInfo {
                name: "aac".to_string(),
                description: "raw ADTS AAC".to_string(),
                demux: true,
                mux: false,
            },
        ],
    }
}
