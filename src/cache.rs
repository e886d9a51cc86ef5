//! Screen-scoped cache of fetched option lists.
//!
//! Keyed by `(level_id, parent_id)` with `None` as the root level's parent
//! key. Entries are write-once-per-key in practice; a later identical fetch
//! overwrites with an equal value, so overwrites are harmless. The cache is
//! what keeps URL hydration from flooding the network: re-walking a chain
//! whose levels were already fetched is pure cache hits.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::provider::LookupOption;

type CacheKey = (String, Option<String>);

#[derive(Debug, Default)]
pub struct LookupCache {
    entries: Mutex<HashMap<CacheKey, Vec<LookupOption>>>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, level_id: &str, parent_id: Option<&str>) -> Option<Vec<LookupOption>> {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(level_id.to_string(), parent_id.map(str::to_string)))
            .cloned()
    }

    pub fn insert(&self, level_id: &str, parent_id: Option<&str>, options: Vec<LookupOption>) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(
                (level_id.to_string(), parent_id.map(str::to_string)),
                options,
            );
    }

    /// Drop every cached list. Hosts call this when they want reference
    /// data refetched on the next walk (e.g. a hard reset).
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
