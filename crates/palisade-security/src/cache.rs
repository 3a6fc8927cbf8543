//! Permission verdict cache.
//!
//! A bounded LRU keyed by everything a verdict depends on. One mutex guards the map, so a
//! wholesale [`PermissionCache::clear`] is ordered against every concurrent get and put.

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use palisade_common_core::{ProjectId, StructureId, UserId};
use palisade_vfs::Permissions;
use parking_lot::Mutex;
use serde::Serialize;

use crate::resolver::Verdict;

/// Capacity used when a zero capacity is configured.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Identifies one permission question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PermissionCacheKey {
    /// Bit 1: filter requires visibility. Bit 0: lock check requested.
    mode: u8,
    user: UserId,
    project: ProjectId,
    resource: StructureId,
    required: Permissions,
}

impl PermissionCacheKey {
    pub fn new(
        requires_visible: bool,
        check_lock: bool,
        user: UserId,
        project: ProjectId,
        resource: StructureId,
        required: Permissions,
    ) -> Self {
        Self {
            mode: (u8::from(requires_visible) << 1) | u8::from(check_lock),
            user,
            project,
            resource,
            required,
        }
    }

    pub fn mode(&self) -> u8 {
        self.mode
    }
}

/// Cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub clears: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Thread-safe LRU of permission verdicts.
///
/// Only [`Verdict::Allowed`] and [`Verdict::Denied`] are ever stored.
pub struct PermissionCache {
    entries: Mutex<LruCache<PermissionCacheKey, Verdict>>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    clears: AtomicU64,
}

impl PermissionCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or_else(|| NonZeroUsize::new(DEFAULT_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            clears: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &PermissionCacheKey) -> Option<Verdict> {
        let verdict = self.entries.lock().get(key).copied();
        let counter = if verdict.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        verdict
    }

    /// Stores a cacheable verdict; other verdicts are ignored.
    pub fn put(&self, key: PermissionCacheKey, verdict: Verdict) {
        if !verdict.is_cacheable() {
            return;
        }
        let evicted = self.entries.lock().push(key, verdict);
        if matches!(evicted, Some((old, _)) if old != key) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Drops every verdict.
    pub fn clear(&self) {
        self.entries.lock().clear();
        self.clears.fetch_add(1, Ordering::Relaxed);
    }

    /// Looks a key up without touching recency or counters.
    pub fn peek(&self, key: &PermissionCacheKey) -> Option<Verdict> {
        self.entries.lock().peek(key).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let entries = self.entries.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            clears: self.clears.load(Ordering::Relaxed),
            entries: entries.len(),
            capacity: entries.cap().get(),
        }
    }
}

impl Default for PermissionCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for PermissionCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionCache").field("stats", &self.stats()).finish()
    }
}
