//! Metainfo upload and fetch-by-URL handlers

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::server::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MagnetResponse {
    pub magnet_link: String,
}

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
}

/// Takes a raw `.torrent` body and answers with its magnet link.
pub async fn upload_torrent(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MagnetResponse>, ApiError> {
    let magnet_link = state.service.magnet_from_metainfo(&body)?;
    Ok(Json(MagnetResponse { magnet_link }))
}

/// Downloads the `.torrent` named in a `{"url": ...}` body.
pub async fn fetch_torrent_url(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<MagnetResponse>, ApiError> {
    let request: FetchRequest =
        serde_json::from_slice(&body).map_err(|e| ApiError::InvalidBody {
            reason: e.to_string(),
        })?;
    let magnet_link = state.service.magnet_from_url(&request.url).await?;
    Ok(Json(MagnetResponse { magnet_link }))
}
