//! Integration tests for Undertow
//!
//! These tests drive the media service and the HTTP router against the
//! simulated content engine, covering session lifecycle across the cache
//! tiers, range streaming and the subtitle pipeline.

#[path = "integration/common.rs"]
mod common;

#[path = "integration/http_surface.rs"]
mod http_surface;
#[path = "integration/metainfo_routes.rs"]
mod metainfo_routes;
#[path = "integration/session_lifecycle.rs"]
mod session_lifecycle;
#[path = "integration/subtitle_pipeline.rs"]
mod subtitle_pipeline;
#[path = "integration/sweeper.rs"]
mod sweeper;
