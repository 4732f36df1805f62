//! Subtitle conversion, extraction and artifact handlers

use axum::Json;
use axum::extract::{Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use undertow_core::UndertowError;
use undertow_core::streaming::content_type;
use undertow_core::subtitles::{JobStatus, SubtitleError};

use super::{ApiError, required};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertQuery {
    pub url: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConvertResponse {
    pub vtt_key: String,
}

#[derive(Debug, Deserialize)]
pub struct ArtifactKeyQuery {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ExtractQuery {
    pub url: Option<String>,
    pub index: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractResponse {
    pub log_file: String,
    pub subtitle_file: String,
}

#[derive(Debug, Deserialize)]
pub struct FileQuery {
    pub file: Option<String>,
}

/// Converts an SRT file of the session and returns the key to fetch it by.
pub async fn download_subtitle(
    State(state): State<AppState>,
    Query(query): Query<ConvertQuery>,
) -> Result<Json<ConvertResponse>, ApiError> {
    let url = required(&query.url, "url")?;
    let file_path = required(&query.file_path, "filePath")?;

    let vtt_key = state.service.convert_subtitle(url, file_path).await?;
    Ok(Json(ConvertResponse { vtt_key }))
}

pub async fn stream_vtt(
    State(state): State<AppState>,
    Query(query): Query<ArtifactKeyQuery>,
) -> Result<Response, ApiError> {
    let key = required(&query.key, "key")?;
    let data = state.service.fetch_artifact(key).await?;
    Ok(([(header::CONTENT_TYPE, "text/vtt; charset=utf-8")], data).into_response())
}

/// Starts extracting the first subtitle track of a file. Returns at once;
/// progress is polled through `/extraction-status`.
pub async fn extract_subtitles(
    State(state): State<AppState>,
    Query(query): Query<ExtractQuery>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let url = required(&query.url, "url")?;
    let raw_index = required(&query.index, "index")?;
    let index = raw_index
        .parse::<usize>()
        .map_err(|_| ApiError::InvalidParameter {
            name: "index",
            value: raw_index.to_string(),
        })?;

    let paths = state.service.start_extraction(url, index).await?;
    Ok(Json(ExtractResponse {
        log_file: paths.log_name,
        subtitle_file: paths.output_name,
    }))
}

pub async fn extraction_status(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Json<JobStatus>, ApiError> {
    let file = required(&query.file, "file")?;
    Ok(Json(state.service.extraction_status(file).await?))
}

/// Serves a derived artifact or log by bare file name.
pub async fn serve_artifact(
    State(state): State<AppState>,
    Query(query): Query<FileQuery>,
) -> Result<Response, ApiError> {
    let file = required(&query.file, "file")?;
    let path = state.service.artifact_path(file)?;

    let data = tokio::fs::read(&path).await.map_err(|e| {
        UndertowError::from(SubtitleError::Io {
            path: path.clone(),
            source: e,
        })
    })?;

    Ok(([(header::CONTENT_TYPE, content_type(file))], data).into_response())
}
