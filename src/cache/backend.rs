//! Storage seam behind the cache facade.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

/// Failures raised by a cache backend.
///
/// Neither variant ever reaches a caller of the facade: both are absorbed and
/// logged, and the operation degrades to a miss or a no-op.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("cache backend unavailable: {0}")]
    Unavailable(String),
    #[error("cache value could not be (de)serialized: {0}")]
    Serialization(String),
    #[error("cache entry rejected: {0}")]
    Rejected(String),
}

impl BackendError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn serialization(err: impl std::fmt::Display) -> Self {
        Self::Serialization(err.to_string())
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::Rejected(message.into())
    }

    /// Short label used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            BackendError::Unavailable(_) => "unavailable",
            BackendError::Serialization(_) => "serialization",
            BackendError::Rejected(_) => "rejected",
        }
    }
}

/// Introspection view of a single live entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInfo {
    pub key: String,
    pub tags: Vec<String>,
    pub size_bytes: usize,
    pub age_seconds: u64,
    pub ttl_remaining_seconds: u64,
}

/// Key → value → tag storage used by [`Cache`](super::Cache).
///
/// Implementations own the entry store, the tag index and expiry bookkeeping.
/// Values are opaque serialized payloads.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Value for `key` if present and unexpired.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError>;

    /// Insert or fully replace the entry for `key`.
    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        tags: &HashSet<String>,
    ) -> Result<(), BackendError>;

    /// Remove `key`; reports whether a live entry was removed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Remove every key in `keys`; returns how many live entries were removed.
    async fn delete_many(&self, keys: &[String]) -> Result<usize, BackendError>;

    /// Remove every entry tagged with any of `tags`; returns how many live
    /// entries were removed.
    async fn invalidate_tags(&self, tags: &[String]) -> Result<usize, BackendError>;

    /// Keys currently registered under `tag`.
    async fn keys_for_tag(&self, tag: &str) -> Result<HashSet<String>, BackendError>;

    /// Metadata of the live entry for `key`.
    async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, BackendError>;

    /// Remove every entry and tag.
    async fn clear(&self) -> Result<(), BackendError>;

    /// Purge expired entries, `batch_size` at a time; returns how many were
    /// purged.
    async fn purge_expired(&self, batch_size: usize) -> Result<usize, BackendError>;

    /// Number of stored entries, including expired ones not yet purged.
    async fn len(&self) -> Result<usize, BackendError>;
}
