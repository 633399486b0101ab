//! Roamly cache system
//!
//! A tag-indexed, TTL-based cache shared by the catalog services and the
//! HTTP layer:
//!
//! - **Facade** ([`Cache`]): typed `get`/`set`/`get_or_set` with single-flight
//!   computation, tag invalidation, warm-up and stats.
//! - **Response cache** ([`response_cache_layer`]): axum middleware storing
//!   whole responses, tagged with whatever the handler recorded through
//!   [`deps::record`].
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! enabled = true
//! default_ttl_seconds = 300
//! sweep_interval_seconds = 60
//! # ... see config.rs for all options
//! ```

mod backend;
mod config;
pub mod deps;
mod error;
mod flight;
pub mod keys;
mod lock;
mod middleware;
mod service;
mod stats;
mod store;
mod sweeper;
mod tag_index;

pub use backend::{BackendError, CacheBackend, EntryInfo};
pub use config::CacheConfig;
pub use error::{CacheError, ComputeError};
pub use middleware::{
    CachedResponse, KeyGenerator, ResponseCachePolicy, ResponseCacheState, SkipPredicate,
    X_CACHE, X_CACHE_KEY, default_cache_key, response_cache_layer, should_store_response,
};
pub use service::{Cache, CacheOptions, WarmItem, WarmReport};
pub use stats::{CacheStats, StatsCollector};
pub use store::{CacheEntry, MemoryStore};
pub use tag_index::TagIndex;

pub(crate) use stats::{
    METRIC_DELETE, METRIC_ERROR, METRIC_FLIGHT_WAIT, METRIC_HIT, METRIC_INVALIDATION,
    METRIC_MISS, METRIC_SET, METRIC_SWEPT,
};
