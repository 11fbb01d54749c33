//! Tag index for bulk invalidation
//!
//! Maps a tag to the set of keys carrying it. The index lives inside the
//! owning store's critical section: every entry insert/delete updates the
//! index in the same lock scope, so readers never observe a key tagged in
//! the entry but missing from the index (or the reverse).

use crate::key::CacheKey;
use std::collections::{HashMap, HashSet};

/// tag -> set of keys carrying that tag
#[derive(Debug, Default)]
pub struct TagIndex {
    index: HashMap<String, HashSet<CacheKey>>,
}

impl TagIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `key` under each of `tags`
    pub fn insert(&mut self, key: &CacheKey, tags: &HashSet<String>) {
        for tag in tags {
            self.index
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
    }

    /// Remove `key` from each of `tags`, dropping emptied tag sets
    pub fn remove(&mut self, key: &CacheKey, tags: &HashSet<String>) {
        for tag in tags {
            if let Some(keys) = self.index.get_mut(tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.index.remove(tag);
                }
            }
        }
    }

    /// Union of keys carrying any of the given tags
    pub fn keys_for_tags<'a>(
        &self,
        tags: impl IntoIterator<Item = &'a str>,
    ) -> HashSet<CacheKey> {
        let mut keys = HashSet::new();
        for tag in tags {
            if let Some(tagged) = self.index.get(tag) {
                keys.extend(tagged.iter().cloned());
            }
        }
        keys
    }

    /// Keys carrying a single tag
    pub fn keys_for_tag(&self, tag: &str) -> Option<&HashSet<CacheKey>> {
        self.index.get(tag)
    }

    /// Number of distinct tags currently indexed
    pub fn tag_count(&self) -> usize {
        self.index.len()
    }

    /// Drop all tag associations
    pub fn clear(&mut self) {
        self.index.clear();
    }
}
