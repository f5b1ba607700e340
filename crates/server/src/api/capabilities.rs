//! ffmpeg capability listings.

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use mediaflow_core::processor::{EncoderInfo, FilterInfo, FormatInfo, StreamKind};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EncoderQuery {
    /// Only list encoders producing this stream type.
    pub kind: Option<StreamKind>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FormatQuery {
    /// Only list formats that can be written (`true`) or read (`false`).
    pub mux: Option<bool>,
}

pub async fn list_encoders(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EncoderQuery>,
) -> Json<Vec<EncoderInfo>> {
    let encoders = state
        .capabilities()
        .await
        .encoders
        .iter()
        .filter(|e| query.kind.map_or(true, |kind| e.kind == kind))
        .cloned()
        .collect();
    Json(encoders)
}

pub async fn list_filters(State(state): State<Arc<AppState>>) -> Json<Vec<FilterInfo>> {
    Json(state.capabilities().await.filters.clone())
}

pub async fn list_formats(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FormatQuery>,
) -> Json<Vec<FormatInfo>> {
    let formats = state
        .capabilities()
        .await
        .formats
        .iter()
        .filter(|f| match query.mux {
            Some(true) => f.mux,
            Some(false) => f.demux,
            None => true,
        })
        .cloned()
        .collect();
    Json(formats)
}
