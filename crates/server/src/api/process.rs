//! Media processing endpoints.
//!
//! Each request becomes one job in the queue of its media kind. The response
//! is a `multipart/mixed` stream of status events and produced files; option
//! and admission errors are answered with a plain-text status instead.

use axum::{
    body::{Body, HttpBody},
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use futures::stream::{BoxStream, StreamExt};
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

use mediaflow_core::{
    options::OPTIONS_HEADER, parse_options, Job, MediaInput, MediaKind, MultipartEncoder,
    OptionsError, OutputOptions, ProcessedFile, ProgressEmitter, QueueError, StreamError,
    StreamItem, StreamResult,
};

use crate::metrics::{JOBS_REJECTED_TOTAL, JOBS_SUBMITTED_TOTAL};
use crate::state::AppState;

/// Errors answered before any streaming starts.
#[derive(Debug)]
pub enum ProcessError {
    NoBody,
    Options(OptionsError),
    Queue(QueueError),
}

impl From<OptionsError> for ProcessError {
    fn from(e: OptionsError) -> Self {
        Self::Options(e)
    }
}

impl From<QueueError> for ProcessError {
    fn from(e: QueueError) -> Self {
        Self::Queue(e)
    }
}

impl IntoResponse for ProcessError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NoBody => (StatusCode::BAD_REQUEST, "No body provided".to_string()),
            Self::Options(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            Self::Queue(QueueError::Rejected { .. }) => {
                (StatusCode::CONFLICT, "Queue is full".to_string())
            }
            Self::Queue(QueueError::ShutDown) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Server is shutting down".to_string(),
            ),
            Self::Queue(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
        };
        (status, message).into_response()
    }
}

pub async fn process_images(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProcessError> {
    process(state, MediaKind::Image, headers, body)
}

pub async fn process_audio(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProcessError> {
    process(state, MediaKind::Audio, headers, body)
}

pub async fn process_video(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProcessError> {
    process(state, MediaKind::Video, headers, body)
}

fn process(
    state: Arc<AppState>,
    kind: MediaKind,
    headers: HeaderMap,
    body: Body,
) -> Result<Response, ProcessError> {
    if body.is_end_stream() {
        return Err(ProcessError::NoBody);
    }

    let raw = headers
        .get(OPTIONS_HEADER)
        .map(|value| value.to_str().map_err(|_| OptionsError::Malformed))
        .transpose()?;
    let outputs = parse_options(kind, raw)?;

    let job = Job::new(outputs.clone());
    let ticket = match state.queue(kind).submit(job) {
        Ok(ticket) => ticket,
        Err(e) => {
            if matches!(e, QueueError::Rejected { .. }) {
                JOBS_REJECTED_TOTAL.with_label_values(&[kind.as_str()]).inc();
            }
            return Err(e.into());
        }
    };
    JOBS_SUBMITTED_TOTAL.with_label_values(&[kind.as_str()]).inc();
    info!(
        "Job {} admitted to {} queue at position {} with {} output(s)",
        ticket.id(),
        kind,
        ticket.position(),
        outputs.len()
    );

    let input = MediaInput::Stream(
        body.into_data_stream()
            .map(|chunk| chunk.map_err(io::Error::other))
            .boxed(),
    );
    let stream_config = &state.config().stream;
    let items =
        ProgressEmitter::new(ticket, state.processor()).spawn(input, stream_config.event_buffer);

    let encoder = MultipartEncoder::new(stream_config.keepalive_interval());
    let content_type = encoder.content_type();
    let body = Body::from_stream(encoder.encode(deliver(items, outputs)));

    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Applies each output's `name` and `output` options to the produced files.
///
/// A file with an `output` path is moved there and not streamed back; status
/// events pass through untouched.
fn deliver(
    items: BoxStream<'static, StreamResult>,
    outputs: Vec<OutputOptions>,
) -> BoxStream<'static, StreamResult> {
    futures::stream::unfold((items, outputs, 0usize), |(mut items, outputs, mut index)| async move {
        loop {
            let item = match items.next().await? {
                Ok(StreamItem::File(file)) => {
                    let options = outputs.get(index);
                    index += 1;
                    match place(file, options).await {
                        Ok(Some(file)) => Ok(StreamItem::File(file)),
                        Ok(None) => continue,
                        Err(e) => Err(StreamError::failed(format!("Failed to write output: {}", e))),
                    }
                }
                other => other,
            };
            return Some((item, (items, outputs, index)));
        }
    })
    .boxed()
}

/// Persists `file` if its options name a destination, otherwise returns it
/// renamed as requested.
async fn place(file: ProcessedFile, options: Option<&OutputOptions>) -> io::Result<Option<ProcessedFile>> {
    let Some(options) = options else {
        return Ok(Some(file));
    };

    if let Some(dest) = options.output() {
        let written = file.persist(dest).await?;
        debug!("Wrote {} bytes to {}", written, dest.display());
        return Ok(None);
    }

    let name = match options.name() {
        Some(name) => name.to_string(),
        None => basename(file.name()),
    };
    Ok(Some(file.with_name(name)))
}

fn basename(name: &str) -> String {
    Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string())
}
