//! Shared terminology lookup with read-through caching.
//!
//! Code crosswalks (ICD to SNOMED, drug code to ingredient, ...) live behind
//! the [`CodeLookup`] trait. A [`CachedLookup`] is built once at pipeline
//! start and passed into worker contexts by reference; there is no global
//! mutable state. The cache also remembers misses, so an unknown code is
//! resolved against the backing lookup only once.

use std::collections::HashMap;

use dashmap::DashMap;

/// A terminology crosswalk from a source code to a display or target code.
pub trait CodeLookup: Send + Sync {
    fn resolve(&self, code: &str) -> Option<String>;
}

/// Read-through cache in front of a [`CodeLookup`].
///
/// Backed by a concurrent map; safe for shared use across workers.
pub struct CachedLookup<L> {
    inner: L,
    cache: DashMap<String, Option<String>>,
}

impl<L: CodeLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: DashMap::new(),
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }
}

impl<L: CodeLookup> CodeLookup for CachedLookup<L> {
    fn resolve(&self, code: &str) -> Option<String> {
        if let Some(hit) = self.cache.get(code) {
            return hit.clone();
        }
        let resolved = self.inner.resolve(code);
        self.cache.insert(code.to_string(), resolved.clone());
        resolved
    }
}

/// Static table-backed lookup used by tests and the demo binary.
#[derive(Default)]
pub struct TableLookup {
    table: HashMap<String, String>,
}

impl TableLookup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, code: impl Into<String>, target: impl Into<String>) {
        self.table.insert(code.into(), target.into());
    }
}

impl CodeLookup for TableLookup {
    fn resolve(&self, code: &str) -> Option<String> {
        self.table.get(code).cloned()
    }
}
