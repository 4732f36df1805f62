//! Range-capable file streaming

use axum::extract::{Query, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Response};

use super::content::ContentQuery;
use super::{ApiError, lenient_index, required};
use crate::server::AppState;

/// Streams one file of a session, honoring a single `Range` header.
///
/// An unparsable `index` falls back to the largest file.
pub async fn stream(
    State(state): State<AppState>,
    Query(query): Query<ContentQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let url = required(&query.url, "url")?;
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    let response = state
        .service
        .stream(url, lenient_index(&query.index), range)
        .await?;

    tracing::debug!(
        "Streaming {} with status {}",
        response
            .headers
            .get("x-filename")
            .and_then(|value| value.to_str().ok())
            .unwrap_or("<unknown>"),
        response.status
    );
    Ok(response.into_response())
}
