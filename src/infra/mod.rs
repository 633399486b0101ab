//! Infrastructure adapters and runtime bootstrap.

pub mod cache_warmer;
pub mod error;
pub mod http;
pub mod memory;
pub mod telemetry;
