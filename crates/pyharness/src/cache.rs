//! Compiled-code cache: an LRU keyed by SHA-256 digests of program text.
//!
//! Every test case of a question re-runs the learner's code with a different
//! suffix, and the same combined program is run again each time the learner
//! presses Run without editing. Each worker keeps its own [`CompileCache`] so
//! those repeats skip compilation. The cache lives and dies with its worker;
//! a replacement worker starts cold.
//!
//! Failed compilations are not cached.

use std::num::NonZeroUsize;

use lru::LruCache;
use sha2::{Digest, Sha256};

/// A 32-byte SHA-256 digest used as a cache key.
pub type CacheKey = [u8; 32];

/// SHA-256 of `source`.
pub fn cache_key(source: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.finalize().into()
}

/// LRU map from program digest to a compiled artefact.
pub struct CompileCache<T> {
    entries: LruCache<CacheKey, T>,
    hits: u64,
    misses: u64,
}

impl<T: Clone> CompileCache<T> {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
            hits: 0,
            misses: 0,
        }
    }

    /// Return the cached artefact for `source`, compiling it with `compile`
    /// on a miss. Errors from `compile` are passed through and leave the cache
    /// unchanged.
    pub fn get_or_try_insert_with<E, F>(&mut self, source: &str, compile: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let key = cache_key(source);
        if let Some(hit) = self.entries.get(&key) {
            self.hits += 1;
            return Ok(hit.clone());
        }
        self.misses += 1;
        let compiled = compile()?;
        self.entries.put(key, compiled.clone());
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // (1) identical sources share a key; different sources do not
    #[test]
    fn test_cache_key_deterministic() {
        assert_eq!(cache_key("print(1)"), cache_key("print(1)"));
        assert_ne!(cache_key("print(1)"), cache_key("print(2)"));
    }

    // (2) second lookup is a hit and does not recompile
    #[test]
    fn test_hit_skips_compile() {
        let mut cache: CompileCache<String> = CompileCache::new(4);
        let mut compiles = 0;
        for _ in 0..3 {
            let out: Result<String, ()> = cache.get_or_try_insert_with("x = 1", || {
                compiles += 1;
                Ok("code".to_string())
            });
            assert_eq!(out, Ok("code".to_string()));
        }
        assert_eq!(compiles, 1);
        assert_eq!(cache.hits(), 2);
        assert_eq!(cache.misses(), 1);
    }

    // (3) failures are not remembered
    #[test]
    fn test_errors_not_cached() {
        let mut cache: CompileCache<String> = CompileCache::new(4);
        let first: Result<String, &str> = cache.get_or_try_insert_with("def f(:", || Err("bad"));
        assert_eq!(first, Err("bad"));
        assert!(cache.is_empty());
    }

    // (4) least recently used entry is evicted at capacity
    #[test]
    fn test_eviction() {
        let mut cache: CompileCache<u32> = CompileCache::new(2);
        let ok = |n: u32| move || Ok::<u32, ()>(n);
        cache.get_or_try_insert_with("a", ok(1)).unwrap();
        cache.get_or_try_insert_with("b", ok(2)).unwrap();
        // Touch "a" so "b" becomes least recent.
        cache.get_or_try_insert_with("a", ok(99)).unwrap();
        cache.get_or_try_insert_with("c", ok(3)).unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_or_try_insert_with("c", ok(0)), Ok(3));
        assert_eq!(cache.get_or_try_insert_with("a", ok(0)), Ok(1));
        // "b" was evicted, so it compiles again.
        assert_eq!(cache.get_or_try_insert_with("b", ok(20)), Ok(20));
    }

    // (5) zero capacity is clamped
    #[test]
    fn test_zero_capacity_clamped() {
        let cache: CompileCache<u8> = CompileCache::new(0);
        assert_eq!(cache.capacity(), 1);
    }
}
