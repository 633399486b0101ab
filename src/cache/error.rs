use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// The caller-supplied compute passed to `get_or_set` failed.
///
/// The original error is shared, not copied, between the leader and every
/// waiter of the same flight; use [`ComputeError::downcast_ref`] to recover it.
#[derive(Debug, Clone, Error)]
#[error("compute for cache key `{key}` failed: {source}")]
pub struct ComputeError {
    key: String,
    #[source]
    source: Arc<dyn StdError + Send + Sync>,
}

impl ComputeError {
    pub fn new<E>(key: impl Into<String>, source: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            source: Arc::new(source),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn inner(&self) -> &(dyn StdError + Send + Sync + 'static) {
        self.source.as_ref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }
}

/// Errors surfaced by [`Cache::get_or_set`](super::Cache::get_or_set).
///
/// Storage and serialization failures never appear here; the facade absorbs
/// them and behaves as if the cache were absent.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    #[error(transparent)]
    Compute(#[from] ComputeError),
    #[error("gave up after {waited:?} waiting for the in-flight compute of `{key}`")]
    WaitTimeout { key: String, waited: Duration },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Eq, Error)]
    #[error("destination store offline")]
    struct Offline;

    #[test]
    fn compute_error_keeps_the_original() {
        let err = ComputeError::new("destinations:list:0", Offline);
        assert_eq!(err.key(), "destinations:list:0");
        assert_eq!(err.downcast_ref::<Offline>(), Some(&Offline));
        assert!(err.to_string().contains("destination store offline"));

        let shared = err.clone();
        assert!(Arc::ptr_eq(&shared.source, &err.source));
    }
}
