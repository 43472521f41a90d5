// app/cache.rs
//
// Content-hash-keyed cache layer (C9): avoids re-parsing and re-analyzing a
// crash log that has not changed since it was last scanned, and evicts
// entries that have been idle past a configurable timeout.
//
// Grounded on the teacher's `app/profile_mgr.rs` load-and-cache pattern,
// generalised from a single global profile cache to per-key fine-grained
// locking (one `Mutex` per cache slot, rather than one lock for the whole
// map) so concurrent scheduler workers don't serialize on cache lookups for
// unrelated logs.

use crate::core::model::{AnalysisOutputs, CacheEntry, CrashLog};
use crate::core::validators::sha256_hex;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};
use std::time::{Duration, Instant};

/// Content-hash key: SHA-256 of the log file's raw bytes, so an edited or
/// regenerated log (even at the same path) is treated as a new entry.
pub type CacheKey = String;

pub fn cache_key(raw_bytes: &[u8]) -> CacheKey {
    sha256_hex(raw_bytes)
}

struct Slot {
    entry: Mutex<Option<CacheEntry>>,
}

/// A cache of parsed-and-analyzed crash logs, keyed by content hash.
///
/// The outer map is guarded by one `RwLock` for structural changes (insert
/// a new key, evict a stale one); each entry's value has its own `Mutex` so
/// reads/writes to one log's cached outputs never block access to another's.
pub struct AnalysisCache {
    slots: RwLock<HashMap<CacheKey, Slot>>,
    idle_timeout: Duration,
}

impl AnalysisCache {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    /// Look up a cached entry, refreshing its `last_accessed` stamp on hit.
    pub fn get(&self, key: &CacheKey) -> Option<(CrashLog, AnalysisOutputs)> {
        let slots = self.slots.read().expect("cache map lock poisoned");
        let slot = slots.get(key)?;
        let mut guard = slot.entry.lock().expect("cache slot lock poisoned");
        let entry = guard.as_mut()?;
        entry.last_accessed = Instant::now();
        Some((entry.log.clone(), entry.outputs.clone()))
    }

    /// Insert or replace the cached entry for `key`.
    pub fn put(&self, key: CacheKey, log: CrashLog, outputs: AnalysisOutputs) {
        let entry = CacheEntry {
            log,
            outputs,
            last_accessed: Instant::now(),
        };

        {
            let slots = self.slots.read().expect("cache map lock poisoned");
            if let Some(slot) = slots.get(&key) {
                *slot.entry.lock().expect("cache slot lock poisoned") = Some(entry);
                return;
            }
        }

        let mut slots = self.slots.write().expect("cache map lock poisoned");
        slots.entry(key).or_insert_with(|| Slot { entry: Mutex::new(None) }).entry
            .lock()
            .expect("cache slot lock poisoned")
            .replace(entry);
    }

    /// Remove every entry whose `last_accessed` is older than the idle
    /// timeout. Returns the number of entries evicted.
    pub fn evict_idle(&self) -> usize {
        let now = Instant::now();
        let mut slots = self.slots.write().expect("cache map lock poisoned");
        let before = slots.len();
        slots.retain(|_, slot| {
            let guard = slot.entry.lock().expect("cache slot lock poisoned");
            match guard.as_ref() {
                Some(entry) => now.duration_since(entry.last_accessed) < self.idle_timeout,
                None => false,
            }
        });
        before - slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.read().expect("cache map lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model::PluginAnalysis;
    use crate::core::parser::parse_text;
    use std::path::PathBuf;

    fn sample_log() -> CrashLog {
        let text = "Buffout 4 v1.28.0 for Fallout 4 v1.10.163\nUnhandled exception \"EXCEPTION_ACCESS_VIOLATION\" at 0x0\n";
        parse_text(&PathBuf::from("x.log"), text).unwrap()
    }

    fn sample_outputs() -> AnalysisOutputs {
        AnalysisOutputs {
            suspects: Vec::new(),
            mod_findings: Vec::new(),
            plugin_analysis: PluginAnalysis::default(),
        }
    }

    #[test]
    fn put_then_get_returns_the_same_entry() {
        let cache = AnalysisCache::new(Duration::from_secs(600));
        let key = cache_key(b"some raw bytes");
        cache.put(key.clone(), sample_log(), sample_outputs());
        let hit = cache.get(&key);
        assert!(hit.is_some());
    }

    #[test]
    fn miss_on_unknown_key() {
        let cache = AnalysisCache::new(Duration::from_secs(600));
        assert!(cache.get(&cache_key(b"never inserted")).is_none());
    }

    #[test]
    fn evict_idle_removes_entries_past_timeout() {
        let cache = AnalysisCache::new(Duration::from_millis(1));
        let key = cache_key(b"some raw bytes");
        cache.put(key.clone(), sample_log(), sample_outputs());
        std::thread::sleep(Duration::from_millis(20));
        let evicted = cache.evict_idle();
        assert_eq!(evicted, 1);
        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn different_content_hashes_to_different_keys() {
        let a = cache_key(b"log a");
        let b = cache_key(b"log b");
        assert_ne!(a, b);
    }

    #[test]
    fn put_twice_on_same_key_replaces_rather_than_duplicates() {
        let cache = AnalysisCache::new(Duration::from_secs(600));
        let key = cache_key(b"same content");
        cache.put(key.clone(), sample_log(), sample_outputs());
        cache.put(key.clone(), sample_log(), sample_outputs());
        assert_eq!(cache.len(), 1);
    }
}
