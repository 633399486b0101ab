//! In-memory entry store.
//!
//! Entries live in a sharded map and are immutable once inserted: a `set`
//! swaps in a fresh `Arc<CacheEntry>`, so readers never observe a partially
//! written entry. Writers of the same key serialize on one of a fixed set of
//! stripe mutexes; readers never take a stripe.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use tokio::time::Instant;

use super::backend::{BackendError, CacheBackend, EntryInfo};
use super::keys::hash_value;
use super::lock::mutex_lock;
use super::tag_index::TagIndex;

const SOURCE: &str = "cache::store";
const STRIPES: usize = 64;
/// Upper bound used when `now + ttl` does not fit in an `Instant`.
const MAX_TTL: Duration = Duration::from_secs(10 * 365 * 24 * 60 * 60);

/// A single cached value with its expiry and tags.
#[derive(Debug)]
pub struct CacheEntry {
    pub value: Bytes,
    pub created_at: Instant,
    pub expires_at: Instant,
    pub tags: HashSet<String>,
}

impl CacheEntry {
    fn new(value: Bytes, ttl: Duration, tags: HashSet<String>) -> Self {
        let created_at = Instant::now();
        let expires_at = created_at
            .checked_add(ttl)
            .unwrap_or_else(|| created_at + MAX_TTL);
        Self {
            value,
            created_at,
            expires_at,
            tags,
        }
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Entry store plus tag index, kept consistent under per-key stripes.
pub struct MemoryStore {
    entries: DashMap<String, Arc<CacheEntry>>,
    tags: TagIndex,
    stripes: Box<[Mutex<()>]>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            tags: TagIndex::new(),
            stripes: (0..STRIPES).map(|_| Mutex::new(())).collect(),
        }
    }

    fn stripe(&self, key: &str, op: &'static str) -> MutexGuard<'_, ()> {
        let index = (hash_value(key) % self.stripes.len() as u64) as usize;
        mutex_lock(&self.stripes[index], SOURCE, op)
    }

    /// Live value for `key`; an expired entry is removed on the way out.
    pub fn get(&self, key: &str) -> Option<Bytes> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        if entry.is_expired_at(now) {
            self.remove_if_expired(key, now);
            return None;
        }
        Some(entry.value.clone())
    }

    /// Insert or replace the entry for `key`.
    ///
    /// New tags are registered before the entry becomes visible, and tags the
    /// previous entry held but the new one does not are dropped afterwards, so
    /// a live entry is always reachable from each of its tags.
    pub fn set(&self, key: &str, value: Bytes, ttl: Duration, tags: HashSet<String>) {
        let entry = Arc::new(CacheEntry::new(value, ttl, tags));

        let _stripe = self.stripe(key, "set");
        self.tags.register(key, &entry.tags);
        let previous = self.entries.insert(key.to_string(), Arc::clone(&entry));
        if let Some(previous) = previous {
            self.tags
                .unregister(key, previous.tags.difference(&entry.tags));
        }
    }

    /// Remove `key`; true when a live entry was removed.
    pub fn delete(&self, key: &str) -> bool {
        let now = Instant::now();
        let _stripe = self.stripe(key, "delete");
        match self.entries.remove(key) {
            Some((key, entry)) => {
                self.tags.unregister(&key, &entry.tags);
                !entry.is_expired_at(now)
            }
            None => false,
        }
    }

    pub fn delete_many(&self, keys: &[String]) -> usize {
        let unique: HashSet<&String> = keys.iter().collect();
        unique.into_iter().filter(|key| self.delete(key)).count()
    }

    /// Remove every entry carrying any of `tags`.
    ///
    /// The affected key set is snapshotted from the index first; each key is
    /// then removed under its own stripe, and only if the entry stored at that
    /// moment still carries one of the tags. A key that was concurrently
    /// re-set without those tags is left alone and its stale index slots are
    /// dropped.
    pub fn invalidate_tags(&self, tags: &[String]) -> usize {
        let now = Instant::now();
        let wanted: HashSet<&str> = tags.iter().map(String::as_str).collect();
        let mut removed = 0;

        for key in self.tags.keys_for_tags(tags) {
            let _stripe = self.stripe(&key, "invalidate_tags");
            let taken = self.entries.remove_if(&key, |_, entry| {
                entry.tags.iter().any(|tag| wanted.contains(tag.as_str()))
            });

            match taken {
                Some((key, entry)) => {
                    self.tags.unregister(&key, &entry.tags);
                    if !entry.is_expired_at(now) {
                        removed += 1;
                    }
                }
                None => {
                    let held = self
                        .entries
                        .get(&key)
                        .map(|entry| entry.tags.clone())
                        .unwrap_or_default();
                    for tag in &wanted {
                        if !held.contains(*tag) {
                            self.tags.unregister_one(&key, tag);
                        }
                    }
                }
            }
        }

        removed
    }

    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.tags.keys_for_tag(tag)
    }

    pub fn inspect(&self, key: &str) -> Option<EntryInfo> {
        let now = Instant::now();
        let entry = self.entries.get(key).map(|entry| Arc::clone(entry.value()))?;
        if entry.is_expired_at(now) {
            return None;
        }

        let mut tags: Vec<String> = entry.tags.iter().cloned().collect();
        tags.sort_unstable();
        Some(EntryInfo {
            key: key.to_string(),
            tags,
            size_bytes: entry.value.len(),
            age_seconds: now.saturating_duration_since(entry.created_at).as_secs(),
            ttl_remaining_seconds: entry.expires_at.saturating_duration_since(now).as_secs(),
        })
    }

    /// Wipe everything. Takes every stripe so no write lands half-way through.
    pub fn clear(&self) {
        let _stripes: Vec<MutexGuard<'_, ()>> = self
            .stripes
            .iter()
            .map(|stripe| mutex_lock(stripe, SOURCE, "clear"))
            .collect();
        self.entries.clear();
        self.tags.clear();
    }

    /// Keys whose entries are expired at `now`.
    ///
    /// Iteration read-locks one shard at a time.
    pub fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.entries
            .iter()
            .filter(|entry| entry.value().is_expired_at(now))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Remove `key` only if its current entry is expired at `now`.
    pub fn remove_if_expired(&self, key: &str, now: Instant) -> bool {
        let _stripe = self.stripe(key, "expire");
        match self
            .entries
            .remove_if(key, |_, entry| entry.is_expired_at(now))
        {
            Some((key, entry)) => {
                self.tags.unregister(&key, &entry.tags);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn tag_count(&self) -> usize {
        self.tags.tag_count()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheBackend for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, BackendError> {
        Ok(MemoryStore::get(self, key))
    }

    async fn set(
        &self,
        key: &str,
        value: Bytes,
        ttl: Duration,
        tags: &HashSet<String>,
    ) -> Result<(), BackendError> {
        MemoryStore::set(self, key, value, ttl, tags.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        Ok(MemoryStore::delete(self, key))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<usize, BackendError> {
        Ok(MemoryStore::delete_many(self, keys))
    }

    async fn invalidate_tags(&self, tags: &[String]) -> Result<usize, BackendError> {
        Ok(MemoryStore::invalidate_tags(self, tags))
    }

    async fn keys_for_tag(&self, tag: &str) -> Result<HashSet<String>, BackendError> {
        Ok(MemoryStore::keys_for_tag(self, tag))
    }

    async fn inspect(&self, key: &str) -> Result<Option<EntryInfo>, BackendError> {
        Ok(MemoryStore::inspect(self, key))
    }

    async fn clear(&self) -> Result<(), BackendError> {
        MemoryStore::clear(self);
        Ok(())
    }

    async fn purge_expired(&self, batch_size: usize) -> Result<usize, BackendError> {
        let now = Instant::now();
        let expired = self.expired_keys(now);
        let mut purged = 0;

        for batch in expired.chunks(batch_size.max(1)) {
            purged += batch
                .iter()
                .filter(|key| self.remove_if_expired(key, now))
                .count();
            tokio::task::yield_now().await;
        }

        Ok(purged)
    }

    async fn len(&self) -> Result<usize, BackendError> {
        Ok(MemoryStore::len(self))
    }
}
