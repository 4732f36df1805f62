//! Session lifecycle: tiered resolution, bounded LRU storage with eviction
//! side effects, and idle sweeping.

pub mod entry;
pub mod lru_cache;
pub mod resolver;
pub mod sweeper;
pub mod teardown;

pub use entry::CacheEntry;
pub use lru_cache::{EvictionListener, NoopEvictionListener, SessionCache};
pub use resolver::{ResolveError, SessionResolver};
pub use sweeper::InactivitySweeper;
pub use teardown::SessionTeardown;
