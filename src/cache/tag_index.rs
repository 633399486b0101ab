//! Reverse index from tag to the keys currently carrying it.
//!
//! The index is only ever mutated by [`MemoryStore`](super::store::MemoryStore)
//! while it holds the per-key stripe of the key being registered or removed,
//! which is what keeps `tag → key` consistent with the entries themselves.

use std::collections::HashSet;

use dashmap::DashMap;

/// Tracks `tag → keys` so a whole group of entries can be found in one lookup.
#[derive(Default)]
pub struct TagIndex {
    keys_by_tag: DashMap<String, HashSet<String>>,
}

impl TagIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under every tag in `tags`.
    pub fn register<'a>(&self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.keys_by_tag
                .entry(tag.clone())
                .or_default()
                .insert(key.to_string());
        }
    }

    /// Remove `key` from every tag in `tags`, dropping tags left without keys.
    pub fn unregister<'a>(&self, key: &str, tags: impl IntoIterator<Item = &'a String>) {
        for tag in tags {
            self.unregister_one(key, tag);
        }
    }

    /// Remove `key` from a single tag.
    pub fn unregister_one(&self, key: &str, tag: &str) {
        let now_empty = match self.keys_by_tag.get_mut(tag) {
            Some(mut keys) => {
                keys.remove(key);
                keys.is_empty()
            }
            None => false,
        };

        if now_empty {
            // Re-checked under the shard lock: a concurrent register may have
            // repopulated the tag in between.
            self.keys_by_tag.remove_if(tag, |_, keys| keys.is_empty());
        }
    }

    /// Get all keys currently registered under `tag`.
    pub fn keys_for_tag(&self, tag: &str) -> HashSet<String> {
        self.keys_by_tag
            .get(tag)
            .map(|keys| keys.clone())
            .unwrap_or_default()
    }

    /// Union of the keys registered under any of `tags`.
    pub fn keys_for_tags<S: AsRef<str>>(&self, tags: &[S]) -> HashSet<String> {
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.keys_by_tag.get(tag.as_ref()) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        self.keys_by_tag.clear();
    }

    /// Get the number of tags with at least one key.
    pub fn tag_count(&self) -> usize {
        self.keys_by_tag.len()
    }
}
