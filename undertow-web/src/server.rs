//! Router construction and server lifecycle

use std::sync::Arc;

use axum::Router;
use axum::http::{HeaderName, HeaderValue, Method, header};
use axum::routing::{get, post};
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use undertow_core::MediaService;

use crate::handlers::{
    download_subtitle, extract_subtitles, extraction_status, fetch_torrent_url, files, metadata,
    serve_artifact, status, stream, stream_vtt, upload_torrent,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<MediaService>,
}

impl AppState {
    pub fn new(service: Arc<MediaService>) -> Self {
        Self { service }
    }
}

/// Builds the HTTP router with CORS and referrer policy applied.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .expose_headers([
            HeaderName::from_static("x-filename"),
            HeaderName::from_static("x-filesize"),
            HeaderName::from_static("x-content-type"),
        ]);

    Router::new()
        .route("/files", get(files))
        .route("/metadata", get(metadata))
        .route("/stream", get(stream))
        .route("/status", get(status))
        .route("/download-subtitle", get(download_subtitle))
        .route("/stream-vtt", get(stream_vtt))
        .route("/extract-subtitles", get(extract_subtitles))
        .route("/extraction-status", get(extraction_status))
        .route("/subtitles", get(serve_artifact))
        .route("/upload-torrent", post(upload_torrent))
        .route("/fetch-torrent-url", post(fetch_torrent_url))
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ))
        .with_state(state)
}

/// Serves until Ctrl-C or until the service's shutdown token fires, then
/// evicts every cached session.
///
/// # Errors
/// - `std::io::Error` - Failed to bind or accept on the configured address
pub async fn run_server(service: Arc<MediaService>) -> Result<(), std::io::Error> {
    let address = format!(
        "{}:{}",
        service.config().server.host,
        service.config().server.port
    );
    let listener = tokio::net::TcpListener::bind(&address).await?;
    tracing::info!("Undertow listening on http://{}", listener.local_addr()?);

    let app = router(AppState::new(Arc::clone(&service)));
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(service.shutdown_token()))
        .await;

    service.shutdown();
    result
}

async fn shutdown_signal(token: CancellationToken) {
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                tracing::warn!("Failed to listen for Ctrl-C: {}", e);
                token.cancelled().await;
            } else {
                tracing::info!("Received Ctrl-C, shutting down");
            }
        }
        _ = token.cancelled() => {}
    }
}
