//! Hit/miss and per-operation accounting.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::counter;
use serde::Serialize;

pub(crate) const METRIC_HIT: &str = "roamly_cache_hit_total";
pub(crate) const METRIC_MISS: &str = "roamly_cache_miss_total";
pub(crate) const METRIC_SET: &str = "roamly_cache_set_total";
pub(crate) const METRIC_DELETE: &str = "roamly_cache_delete_total";
pub(crate) const METRIC_INVALIDATION: &str = "roamly_cache_invalidation_total";
pub(crate) const METRIC_ERROR: &str = "roamly_cache_error_total";
pub(crate) const METRIC_SWEPT: &str = "roamly_cache_swept_total";
pub(crate) const METRIC_FLIGHT_WAIT: &str = "roamly_cache_flight_wait_total";

/// Point-in-time copy of the cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    pub invalidations: u64,
    pub errors: u64,
}

impl CacheStats {
    /// `hits / (hits + misses)`, or 0 when nothing has been looked up yet.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

/// Lock-free counters, mirrored into the `metrics` facade.
#[derive(Debug, Default)]
pub struct StatsCollector {
    hits: AtomicU64,
    misses: AtomicU64,
    sets: AtomicU64,
    deletes: AtomicU64,
    invalidations: AtomicU64,
    errors: AtomicU64,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_HIT).increment(1);
    }

    pub fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_MISS).increment(1);
    }

    pub fn record_set(&self) {
        self.sets.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_SET).increment(1);
    }

    pub fn record_delete(&self) {
        self.deletes.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_DELETE).increment(1);
    }

    pub fn record_invalidation(&self) {
        self.invalidations.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_INVALIDATION).increment(1);
    }

    pub fn record_error(&self, kind: &'static str) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        counter!(METRIC_ERROR, "kind" => kind).increment(1);
    }

    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            sets: self.sets.load(Ordering::Relaxed),
            deletes: self.deletes.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }

    pub fn hit_rate(&self) -> f64 {
        self.snapshot().hit_rate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use metrics_util::debugging::DebuggingRecorder;

    use super::*;

    #[test]
    fn hit_rate_is_zero_before_lookups() {
        let stats = StatsCollector::new();
        assert_eq!(stats.hit_rate(), 0.0);

        stats.record_set();
        stats.record_delete();
        assert_eq!(stats.hit_rate(), 0.0);
    }

    #[test]
    fn hit_rate_follows_hits_over_lookups() {
        let stats = StatsCollector::new();
        for _ in 0..3 {
            stats.record_hit();
        }
        stats.record_miss();

        assert_eq!(stats.hit_rate(), 0.75);
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.hits, 3);
        assert_eq!(snapshot.misses, 1);
    }

    #[test]
    fn counters_are_emitted_as_metrics() {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let stats = StatsCollector::new();
            stats.record_hit();
            stats.record_miss();
            stats.record_set();
            stats.record_delete();
            stats.record_invalidation();
            stats.record_error("unavailable");
        });

        let names: HashSet<String> = snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
            .collect();

        for expected in [
            METRIC_HIT,
            METRIC_MISS,
            METRIC_SET,
            METRIC_DELETE,
            METRIC_INVALIDATION,
            METRIC_ERROR,
        ] {
            assert!(names.contains(expected), "missing metric {expected}");
        }
    }
}
