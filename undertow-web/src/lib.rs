//! Undertow Web - HTTP surface over the media service
//!
//! Thin axum layer: every route parses its query, calls one `MediaService`
//! operation and maps the result onto a status code and body.

pub mod handlers;
pub mod server;

pub use handlers::ApiError;
pub use server::{AppState, router, run_server};
