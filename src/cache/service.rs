//! The cache facade used by services and the HTTP middleware.
//!
//! Every storage or serialization failure is absorbed here: reads degrade to
//! a miss, writes to a no-op, and the failure is logged and counted. The only
//! errors a caller ever sees come from its own `compute` in
//! [`Cache::get_or_set`].

use std::collections::HashSet;
use std::error::Error as StdError;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::backend::{BackendError, CacheBackend, EntryInfo};
use super::config::CacheConfig;
use super::error::{CacheError, ComputeError};
use super::flight::{self, FlightOutcome, Role, SingleFlight};
use super::lock::mutex_lock;
use super::stats::{CacheStats, METRIC_FLIGHT_WAIT, StatsCollector};
use super::store::MemoryStore;
use super::sweeper::{self, SweeperHandle};

/// Per-call options for [`Cache::set`], [`Cache::get_or_set`] and warm-up.
#[derive(Debug, Clone, Default)]
pub struct CacheOptions {
    /// Entry lifetime; the configured default when `None`.
    pub ttl: Option<Duration>,
    pub tags: HashSet<String>,
    /// Bound on how long a `get_or_set` waiter waits for the leader.
    pub wait_timeout: Option<Duration>,
}

impl CacheOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_ttl_secs(self, seconds: u64) -> Self {
        self.with_ttl(Duration::from_secs(seconds))
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }
}

/// One pre-serialized entry for [`Cache::warm_up`].
#[derive(Debug)]
pub struct WarmItem {
    key: String,
    payload: Result<Bytes, BackendError>,
    options: CacheOptions,
}

impl WarmItem {
    pub fn new<T>(key: impl Into<String>, value: &T, options: CacheOptions) -> Self
    where
        T: Serialize + ?Sized,
    {
        Self {
            key: key.into(),
            payload: encode(value),
            options,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }
}

/// Outcome of a warm-up batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    pub stored: usize,
    pub skipped: usize,
}

/// Tag-indexed TTL cache.
///
/// Construct one per process with [`Cache::start`] and share it behind an
/// `Arc`; there is no global instance.
pub struct Cache {
    config: CacheConfig,
    backend: Arc<dyn CacheBackend>,
    flights: SingleFlight,
    stats: StatsCollector,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl Cache {
    /// Facade over an arbitrary backend. No sweeper is running until
    /// [`Cache::spawn_sweeper`] is called.
    pub fn new(config: CacheConfig, backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            config,
            backend,
            flights: SingleFlight::new(),
            stats: StatsCollector::new(),
            sweeper: Mutex::new(None),
        }
    }

    pub fn in_memory(config: CacheConfig) -> Self {
        Self::new(config, Arc::new(MemoryStore::new()))
    }

    /// Allocate the in-memory store and start the sweep task.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: CacheConfig) -> Arc<Self> {
        let cache = Arc::new(Self::in_memory(config));
        cache.spawn_sweeper();
        cache
    }

    /// Start the periodic sweep if the cache is enabled and none is running.
    pub fn spawn_sweeper(&self) {
        if !self.config.enabled {
            return;
        }
        let mut slot = mutex_lock(&self.sweeper, "roamly::cache::service", "spawn_sweeper");
        if slot.is_some() {
            return;
        }
        *slot = Some(sweeper::spawn(
            Arc::clone(&self.backend),
            self.config.sweep_interval(),
            self.config.sweep_batch_size(),
        ));
    }

    /// Stop the sweep task and wait for it to exit.
    pub async fn shutdown(&self) {
        let handle = mutex_lock(&self.sweeper, "roamly::cache::service", "shutdown").take();
        if let Some(handle) = handle {
            handle.stop().await;
            info!(target = "roamly::cache::service", "cache shut down");
        }
    }

    /// Run one purge pass immediately.
    pub async fn sweep_now(&self) -> usize {
        sweeper::sweep_once(self.backend.as_ref(), self.config.sweep_batch_size()).await
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        if !self.config.enabled {
            return None;
        }
        let value = self.lookup(key).await;
        if value.is_some() {
            self.stats.record_hit();
            debug!(cache = "facade", outcome = "hit", key, "cache lookup");
        } else {
            self.stats.record_miss();
            debug!(cache = "facade", outcome = "miss", key, "cache lookup");
        }
        value
    }

    pub async fn set<T>(&self, key: &str, value: &T, options: CacheOptions)
    where
        T: Serialize + ?Sized,
    {
        if !self.config.enabled {
            return;
        }
        let stored = match encode(value) {
            Ok(bytes) => self.store(key, bytes, &options).await,
            Err(err) => Err(err),
        };
        if let Err(err) = stored {
            self.absorb("set", key, &err);
        }
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// Concurrent callers for the same key share a single compute: the
    /// first becomes the leader and the rest wait on its result, each up to
    /// its own `wait_timeout`.
    pub async fn get_or_set<T, F, Fut, E>(
        &self,
        key: &str,
        options: CacheOptions,
        compute: F,
    ) -> Result<T, CacheError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: StdError + Send + Sync + 'static,
    {
        if !self.config.enabled {
            return compute()
                .await
                .map_err(|err| ComputeError::new(key, err).into());
        }

        let wait_timeout = options
            .wait_timeout
            .unwrap_or_else(|| self.config.flight_wait_timeout());
        let deadline = Instant::now() + wait_timeout;

        let flight = loop {
            if let Some(value) = self.lookup::<T>(key).await {
                self.stats.record_hit();
                debug!(cache = "facade", outcome = "hit", key, "get_or_set");
                return Ok(value);
            }

            match self.flights.join(key) {
                Role::Leader(flight) => {
                    // A previous leader may have stored the value between
                    // our lookup and the join.
                    if let Some(value) = self.lookup::<T>(key).await {
                        drop(flight);
                        self.stats.record_hit();
                        debug!(cache = "facade", outcome = "hit", key, "get_or_set");
                        return Ok(value);
                    }
                    break Some(flight);
                }
                Role::Waiter(rx) => {
                    counter!(METRIC_FLIGHT_WAIT).increment(1);
                    debug!(cache = "facade", key, "waiting on in-flight compute");
                    match flight::wait(rx, deadline).await {
                        FlightOutcome::Ready(bytes) => match decode::<T>(&bytes) {
                            Ok(value) => {
                                self.stats.record_miss();
                                return Ok(value);
                            }
                            Err(err) => {
                                self.absorb("get_or_set", key, &err);
                                break None;
                            }
                        },
                        FlightOutcome::Failed(err) => {
                            self.stats.record_miss();
                            return Err(err.into());
                        }
                        FlightOutcome::Abandoned => continue,
                        FlightOutcome::TimedOut => {
                            let waited_ms =
                                u64::try_from(wait_timeout.as_millis()).unwrap_or(u64::MAX);
                            warn!(
                                cache = "facade",
                                key,
                                waited_ms,
                                "gave up waiting on in-flight compute"
                            );
                            return Err(CacheError::WaitTimeout {
                                key: key.to_string(),
                                waited: wait_timeout,
                            });
                        }
                    }
                }
            }
        };

        self.stats.record_miss();
        debug!(cache = "facade", outcome = "miss", key, "computing value");

        let value = match compute().await {
            Ok(value) => value,
            Err(err) => {
                let err = ComputeError::new(key, err);
                if let Some(flight) = flight {
                    flight.fail(err.clone());
                }
                return Err(err.into());
            }
        };

        let bytes = match encode(&value) {
            Ok(bytes) => bytes,
            Err(err) => {
                // Waiters see the flight abandoned and retry.
                self.absorb("get_or_set", key, &err);
                return Ok(value);
            }
        };

        if let Err(err) = self.store(key, bytes.clone(), &options).await {
            self.absorb("get_or_set", key, &err);
        }
        if let Some(flight) = flight {
            flight.complete(bytes);
        }
        Ok(value)
    }

    pub async fn delete(&self, key: &str) -> bool {
        if !self.config.enabled {
            return false;
        }
        match self.backend.delete(key).await {
            Ok(removed) => {
                self.stats.record_delete();
                debug!(cache = "facade", key, removed, "cache delete");
                removed
            }
            Err(err) => {
                self.absorb("delete", key, &err);
                false
            }
        }
    }

    pub async fn delete_many<S: AsRef<str>>(&self, keys: &[S]) -> usize {
        if !self.config.enabled || keys.is_empty() {
            return 0;
        }
        let keys: Vec<String> = keys.iter().map(|key| key.as_ref().to_string()).collect();
        match self.backend.delete_many(&keys).await {
            Ok(removed) => {
                self.stats.record_delete();
                debug!(cache = "facade", requested = keys.len(), removed, "cache delete_many");
                removed
            }
            Err(err) => {
                self.absorb("delete_many", &keys.join(","), &err);
                0
            }
        }
    }

    /// Remove every entry carrying any of `tags`.
    pub async fn invalidate_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> usize {
        if !self.config.enabled || tags.is_empty() {
            return 0;
        }
        let tags: Vec<String> = tags.iter().map(|tag| tag.as_ref().to_string()).collect();
        match self.backend.invalidate_tags(&tags).await {
            Ok(removed) => {
                self.stats.record_invalidation();
                info!(cache = "facade", tags = ?tags, removed, "cache tags invalidated");
                removed
            }
            Err(err) => {
                self.absorb("invalidate_by_tags", &tags.join(","), &err);
                0
            }
        }
    }

    /// Store a batch of entries. Items that fail are logged and skipped.
    pub async fn warm_up(&self, items: Vec<WarmItem>) -> WarmReport {
        let mut report = WarmReport::default();
        if !self.config.enabled {
            return report;
        }

        for item in items {
            let WarmItem {
                key,
                payload,
                options,
            } = item;
            let stored = match payload {
                Ok(bytes) => self.store(&key, bytes, &options).await,
                Err(err) => Err(err),
            };
            match stored {
                Ok(()) => report.stored += 1,
                Err(err) => {
                    self.stats.record_error(err.kind());
                    warn!(cache = "facade", key, error = %err, "skipping warm-up item");
                    report.skipped += 1;
                }
            }
        }

        info!(
            cache = "facade",
            stored = report.stored,
            skipped = report.skipped,
            "cache warm-up finished"
        );
        report
    }

    /// Wipe every entry and tag. `false` only when the backend is unreachable.
    pub async fn clear_all(&self) -> bool {
        match self.backend.clear().await {
            Ok(()) => {
                info!(cache = "facade", "cache cleared");
                true
            }
            Err(err) => {
                self.absorb("clear_all", "*", &err);
                false
            }
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    pub fn hit_rate(&self) -> f64 {
        self.stats.hit_rate()
    }

    /// Keys with a `get_or_set` compute currently running.
    pub fn in_flight(&self) -> usize {
        self.flights.in_flight()
    }

    /// Stored entries, including expired ones the sweeper has not reached.
    pub async fn entry_count(&self) -> usize {
        match self.backend.len().await {
            Ok(count) => count,
            Err(err) => {
                self.absorb("entry_count", "*", &err);
                0
            }
        }
    }

    pub async fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        match self.backend.keys_for_tag(tag).await {
            Ok(keys) => keys,
            Err(err) => {
                self.absorb("keys_for_tag", tag, &err);
                HashSet::new()
            }
        }
    }

    pub async fn inspect(&self, key: &str) -> Option<EntryInfo> {
        match self.backend.inspect(key).await {
            Ok(info) => info,
            Err(err) => {
                self.absorb("inspect", key, &err);
                None
            }
        }
    }

    /// Read and decode without touching the hit/miss counters.
    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = match self.backend.get(key).await {
            Ok(bytes) => bytes?,
            Err(err) => {
                self.absorb("get", key, &err);
                return None;
            }
        };
        match decode(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                self.absorb("get", key, &err);
                None
            }
        }
    }

    async fn store(
        &self,
        key: &str,
        bytes: Bytes,
        options: &CacheOptions,
    ) -> Result<(), BackendError> {
        if key.is_empty() {
            return Err(BackendError::rejected("cache key must not be empty"));
        }
        let ttl = options.ttl.unwrap_or_else(|| self.config.default_ttl());
        if ttl.is_zero() {
            return Err(BackendError::rejected("ttl must be greater than zero"));
        }
        self.backend.set(key, bytes, ttl, &options.tags).await?;
        self.stats.record_set();
        debug!(
            cache = "facade",
            key,
            ttl_secs = ttl.as_secs(),
            tags = options.tags.len(),
            "cache set"
        );
        Ok(())
    }

    pub(crate) fn absorb(&self, op: &'static str, key: &str, err: &BackendError) {
        self.stats.record_error(err.kind());
        match err {
            BackendError::Rejected(_) => {
                debug!(cache = "facade", op, key, error = %err, "cache write skipped")
            }
            _ => warn!(
                cache = "facade",
                op,
                key,
                error = %err,
                "cache operation failed; continuing without cache"
            ),
        }
    }
}

fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Bytes, BackendError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(BackendError::serialization)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, BackendError> {
    serde_json::from_slice(bytes).map_err(BackendError::serialization)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("catalog offline")]
    struct Offline;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Listing {
        id: u32,
        name: String,
    }

    fn cache() -> Cache {
        Cache::in_memory(CacheConfig::default())
    }

    fn listing(id: u32) -> Listing {
        Listing {
            id,
            name: format!("listing-{id}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn get_returns_stored_value_until_ttl() {
        let cache = cache();
        cache
            .set("k", &listing(1), CacheOptions::new().with_ttl_secs(10))
            .await;

        assert_eq!(cache.get::<Listing>("k").await, Some(listing(1)));
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_eq!(cache.get::<Listing>("k").await, None);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.sets, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn default_ttl_applies_when_unset() {
        let cache = Cache::in_memory(CacheConfig {
            default_ttl_seconds: 30,
            ..Default::default()
        });
        cache.set("k", &1_u32, CacheOptions::new()).await;

        tokio::time::advance(Duration::from_secs(29)).await;
        assert_eq!(cache.get::<u32>("k").await, Some(1));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.get::<u32>("k").await, None);
    }

    #[tokio::test]
    async fn zero_ttl_and_empty_key_are_not_stored() {
        let cache = cache();
        cache
            .set("k", &1_u32, CacheOptions::new().with_ttl(Duration::ZERO))
            .await;
        cache.set("", &1_u32, CacheOptions::new()).await;

        assert_eq!(cache.entry_count().await, 0);
        assert_eq!(cache.stats().sets, 0);
    }

    #[tokio::test]
    async fn invalidate_removes_every_key_sharing_a_tag() {
        let cache = cache();
        let shared = CacheOptions::new().with_tag("destinations:list");
        cache.set("a", &1_u32, shared.clone().with_tag("destination:1")).await;
        cache.set("b", &2_u32, shared).await;
        cache
            .set("c", &3_u32, CacheOptions::new().with_tag("packages:list"))
            .await;

        assert_eq!(cache.invalidate_by_tags(&["destinations:list"]).await, 2);
        assert_eq!(cache.get::<u32>("a").await, None);
        assert_eq!(cache.get::<u32>("b").await, None);
        assert_eq!(cache.get::<u32>("c").await, Some(3));
        assert!(cache.keys_for_tag("destination:1").await.is_empty());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[tokio::test]
    async fn get_or_set_computes_once_then_hits() {
        let cache = cache();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_set("k", CacheOptions::new(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Offline>(listing(7))
                })
                .await
                .expect("compute succeeds");
            assert_eq!(value, listing(7));
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
    }

    #[tokio::test]
    async fn concurrent_get_or_set_shares_one_compute() {
        let cache = Arc::new(cache());
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = tokio::sync::watch::channel(false);

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let mut gate = gate.clone();
            tasks.push(tokio::spawn(async move {
                cache
                    .get_or_set("hot", CacheOptions::new(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.wait_for(|open| *open).await;
                        Ok::<_, Offline>(listing(1))
                    })
                    .await
            }));
        }

        while cache.flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        release.send_replace(true);

        for task in tasks {
            let value = task.await.expect("task").expect("compute succeeds");
            assert_eq!(value, listing(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.flights.in_flight(), 0);
    }

    /// Memory store whose next armed `get` parks after reading until released.
    struct GatedStore {
        inner: MemoryStore,
        armed: std::sync::atomic::AtomicBool,
        parked: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    impl GatedStore {
        fn new() -> Self {
            Self {
                inner: MemoryStore::new(),
                armed: std::sync::atomic::AtomicBool::new(false),
                parked: tokio::sync::Notify::new(),
                release: tokio::sync::Notify::new(),
            }
        }
    }

    #[async_trait]
    impl CacheBackend for GatedStore {
        async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
            let read = CacheBackend::get(&self.inner, key).await;
            if self.armed.swap(false, Ordering::SeqCst) {
                self.parked.notify_one();
                self.release.notified().await;
            }
            read
        }
        async fn set(
            &self,
            key: &str,
            value: Bytes,
            ttl: Duration,
            tags: &HashSet<String>,
        ) -> Result<(), BackendError> {
            CacheBackend::set(&self.inner, key, value, ttl, tags).await
        }
        async fn delete(&self, key: &str) -> Result<bool, BackendError> {
            CacheBackend::delete(&self.inner, key).await
        }
        async fn delete_many(&self, keys: &[String]) -> Result<usize, BackendError> {
            CacheBackend::delete_many(&self.inner, keys).await
        }
        async fn invalidate_tags(&self, tags: &[String]) -> Result<usize, BackendError> {
            CacheBackend::invalidate_tags(&self.inner, tags).await
        }
        async fn keys_for_tag(&self, tag: &str) -> Result<HashSet<String>, BackendError> {
            CacheBackend::keys_for_tag(&self.inner, tag).await
        }
        async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, BackendError> {
            CacheBackend::inspect(&self.inner, key).await
        }
        async fn clear(&self) -> Result<(), BackendError> {
            CacheBackend::clear(&self.inner).await
        }
        async fn purge_expired(&self, batch_size: usize) -> Result<usize, BackendError> {
            CacheBackend::purge_expired(&self.inner, batch_size).await
        }
        async fn len(&self) -> Result<usize, BackendError> {
            CacheBackend::len(&self.inner).await
        }
    }

    #[tokio::test]
    async fn caller_arriving_after_the_leader_finished_reuses_its_value() {
        let store = Arc::new(GatedStore::new());
        let backend: Arc<dyn CacheBackend> = Arc::clone(&store) as Arc<dyn CacheBackend>;
        let cache = Arc::new(Cache::new(CacheConfig::default(), backend));
        let calls = Arc::new(AtomicUsize::new(0));
        let (release, gate) = tokio::sync::watch::channel(false);

        let first = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            let mut gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("late", CacheOptions::new(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        let _ = gate.wait_for(|open| *open).await;
                        Ok::<_, Offline>(listing(1))
                    })
                    .await
            })
        };
        while calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        // The second caller misses while the first is still computing and
        // stalls before it can join the flight.
        store.armed.store(true, Ordering::SeqCst);
        let second = {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            tokio::spawn(async move {
                cache
                    .get_or_set("late", CacheOptions::new(), || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        Ok::<_, Offline>(listing(2))
                    })
                    .await
            })
        };
        store.parked.notified().await;

        release.send_replace(true);
        assert_eq!(
            first.await.expect("first task").expect("first succeeds"),
            listing(1)
        );
        assert_eq!(cache.in_flight(), 0);

        store.release.notify_one();
        assert_eq!(
            second.await.expect("second task").expect("second succeeds"),
            listing(1)
        );
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get::<Listing>("late").await, Some(listing(1)));
    }

    #[tokio::test]
    async fn compute_failure_stores_nothing_and_allows_retry() {
        let cache = cache();

        let err = cache
            .get_or_set("k", CacheOptions::new(), || async {
                Err::<Listing, _>(Offline)
            })
            .await
            .expect_err("compute fails");
        match err {
            CacheError::Compute(inner) => {
                assert_eq!(inner.key(), "k");
                assert!(inner.downcast_ref::<Offline>().is_some());
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(cache.entry_count().await, 0);

        let value = cache
            .get_or_set("k", CacheOptions::new(), || async {
                Ok::<_, Offline>(listing(2))
            })
            .await
            .expect("retry succeeds");
        assert_eq!(value, listing(2));
    }

    #[tokio::test]
    async fn waiters_receive_the_leaders_failure() {
        let cache = Arc::new(cache());
        let (release, gate) = tokio::sync::watch::channel(false);

        let leader = {
            let cache = Arc::clone(&cache);
            let mut gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("k", CacheOptions::new(), || async move {
                        let _ = gate.wait_for(|open| *open).await;
                        Err::<Listing, _>(Offline)
                    })
                    .await
            })
        };
        while cache.flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let waiter = {
            let cache = Arc::clone(&cache);
            tokio::spawn(async move {
                cache
                    .get_or_set("k", CacheOptions::new(), || async {
                        Ok::<_, Offline>(listing(9))
                    })
                    .await
            })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        release.send_replace(true);

        assert!(matches!(
            leader.await.expect("leader task"),
            Err(CacheError::Compute(_))
        ));
        assert!(matches!(
            waiter.await.expect("waiter task"),
            Err(CacheError::Compute(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn waiter_times_out_independently() {
        let cache = Arc::new(cache());
        let (release, gate) = tokio::sync::watch::channel(false);

        let leader = {
            let cache = Arc::clone(&cache);
            let mut gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .get_or_set("slow", CacheOptions::new(), || async move {
                        let _ = gate.wait_for(|open| *open).await;
                        Ok::<_, Offline>(listing(3))
                    })
                    .await
            })
        };
        while cache.flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }

        let err = cache
            .get_or_set(
                "slow",
                CacheOptions::new().with_wait_timeout(Duration::from_millis(100)),
                || async { Ok::<_, Offline>(listing(4)) },
            )
            .await
            .expect_err("waiter times out");
        assert!(matches!(err, CacheError::WaitTimeout { .. }));

        release.send_replace(true);
        assert_eq!(
            leader.await.expect("leader task").expect("leader succeeds"),
            listing(3)
        );
        assert_eq!(cache.get::<Listing>("slow").await, Some(listing(3)));
    }

    #[tokio::test]
    async fn warm_up_skips_bad_items() {
        let cache = cache();
        let report = cache
            .warm_up(vec![
                WarmItem::new("a", &listing(1), CacheOptions::new().with_tag("t")),
                WarmItem::new("", &listing(2), CacheOptions::new()),
                WarmItem::new("b", &listing(3), CacheOptions::new().with_ttl(Duration::ZERO)),
                WarmItem::new("c", &listing(4), CacheOptions::new()),
            ])
            .await;

        assert_eq!(report, WarmReport { stored: 2, skipped: 2 });
        assert_eq!(cache.keys_for_tag("t").await, HashSet::from(["a".to_string()]));
        assert_eq!(cache.get::<Listing>("c").await, Some(listing(4)));
    }

    #[tokio::test]
    async fn delete_and_delete_many_report_live_removals() {
        let cache = cache();
        for key in ["a", "b", "c"] {
            cache.set(key, &key, CacheOptions::new()).await;
        }

        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);
        assert_eq!(cache.delete_many(&["b", "c", "missing"]).await, 2);
        assert_eq!(cache.entry_count().await, 0);
        assert_eq!(cache.stats().deletes, 3);
    }

    #[tokio::test]
    async fn clear_all_makes_every_key_miss() {
        let cache = cache();
        cache
            .set("k", &1_u32, CacheOptions::new().with_tag("t").with_ttl_secs(60))
            .await;
        let info = cache.inspect("k").await.expect("entry present");
        assert_eq!(info.tags, vec!["t".to_string()]);

        assert!(cache.clear_all().await);
        assert_eq!(cache.get::<u32>("k").await, None);
        assert!(cache.inspect("k").await.is_none());
        assert!(cache.keys_for_tag("t").await.is_empty());
    }

    #[tokio::test]
    async fn disabled_cache_behaves_as_absent() {
        let cache = Cache::in_memory(CacheConfig {
            enabled: false,
            ..Default::default()
        });
        let calls = AtomicUsize::new(0);

        cache.set("k", &1_u32, CacheOptions::new()).await;
        assert_eq!(cache.get::<u32>("k").await, None);
        for _ in 0..2 {
            cache
                .get_or_set("k", CacheOptions::new(), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, Offline>(1_u32)
                })
                .await
                .expect("compute succeeds");
        }

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(cache.stats(), CacheStats::default());
    }

    #[tokio::test]
    async fn decode_failure_is_a_counted_miss() {
        let cache = cache();
        cache.set("k", "not a number", CacheOptions::new()).await;

        assert_eq!(cache.get::<u32>("k").await, None);
        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.errors, 1);
    }

    struct Unreachable;

    #[async_trait]
    impl CacheBackend for Unreachable {
        async fn get(&self, _: &str) -> Result<Option<Bytes>, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn set(
            &self,
            _: &str,
            _: Bytes,
            _: Duration,
            _: &HashSet<String>,
        ) -> Result<(), BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn delete(&self, _: &str) -> Result<bool, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn delete_many(&self, _: &[String]) -> Result<usize, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn invalidate_tags(&self, _: &[String]) -> Result<usize, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn keys_for_tag(&self, _: &str) -> Result<HashSet<String>, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn inspect(&self, _: &str) -> Result<Option<EntryInfo>, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn clear(&self) -> Result<(), BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn purge_expired(&self, _: usize) -> Result<usize, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
        async fn len(&self) -> Result<usize, BackendError> {
            Err(BackendError::unavailable("connection refused"))
        }
    }

    #[tokio::test]
    async fn unreachable_backend_fails_open() {
        let cache = Cache::new(CacheConfig::default(), Arc::new(Unreachable));

        assert_eq!(cache.get::<u32>("k").await, None);
        cache.set("k", &1_u32, CacheOptions::new()).await;
        assert!(!cache.delete("k").await);
        assert_eq!(cache.invalidate_by_tags(&["t"]).await, 0);
        assert!(!cache.clear_all().await);

        let value = cache
            .get_or_set("k", CacheOptions::new(), || async { Ok::<_, Offline>(5_u32) })
            .await
            .expect("compute result is still returned");
        assert_eq!(value, 5);
        assert!(cache.stats().errors >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn start_and_shutdown_manage_the_sweeper() {
        let cache = Cache::start(CacheConfig {
            sweep_interval_seconds: 5,
            ..Default::default()
        });
        cache
            .set("k", &1_u32, CacheOptions::new().with_ttl_secs(1))
            .await;

        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(cache.entry_count().await, 0);

        cache.shutdown().await;
        cache.shutdown().await;
    }
}
