//! Listing, summary and status handlers

use axum::Json;
use axum::extract::{Query, State};
use serde::Deserialize;
use undertow_core::status::{ContentSummary, FileListing, StatusReport};

use super::{ApiError, lenient_index, required};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
pub struct ContentQuery {
    pub url: Option<String>,
    pub index: Option<String>,
}

pub async fn files(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<FileListing>, ApiError> {
    let url = required(&query.url, "url")?;
    Ok(Json(state.service.list_files(url).await?))
}

pub async fn metadata(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<ContentSummary>, ApiError> {
    let url = required(&query.url, "url")?;
    Ok(Json(state.service.summary(url).await?))
}

/// Reports progress of a cached session without resolving it.
pub async fn status(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
) -> Result<Json<StatusReport>, ApiError> {
    let url = required(&query.url, "url")?;
    let report = state.service.status(url, lenient_index(&query.index))?;
    Ok(Json(report))
}
