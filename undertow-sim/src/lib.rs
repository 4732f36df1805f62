//! Undertow Simulation - content engine and metadata store without a network.
//!
//! The simulated engine serves content registered up front, either held in
//! memory or read from local files, and models the delay before content info
//! is known as well as a steady download rate for progress reporting. Call
//! counters let tests assert which resolution tier served a request.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use bytes::Bytes;
//! use undertow_sim::{InMemoryContentEngine, SimulatedContent};
//!
//! let engine = Arc::new(InMemoryContentEngine::new());
//! let content = SimulatedContent::new("Sample")
//!     .with_memory_file("Sample/movie.mp4", Bytes::from(vec![0u8; 1024]));
//! let magnet = engine.register(content);
//! println!("{magnet}");
//! ```

pub mod content;
pub mod engine;
pub mod library;
pub mod metadata;

pub use content::{ContentSource, SimulatedContent, SimulatedFile};
pub use engine::{EngineCounters, InMemoryContentEngine, SimulatedHandle};
pub use library::scan_library;
pub use metadata::InMemoryMetadataStore;
