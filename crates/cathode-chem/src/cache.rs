//! Content-addressed memoization for the pure formula operations
//!
//! `parse`, `normalize` and `classify` are referentially transparent, so
//! their results can be cached under the exact input text. The cache is an
//! optimization only: [`NoCache`] gives identical results.
//!
//! Uses the moka crate for thread-safe caching with an optional bound.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use moka::sync::Cache;
use serde::{Deserialize, Serialize};

use cathode_core::CacheConfig;

use crate::classify::EntityTag;
use crate::formula::Composition;

// ============================================================================
// Keys and Values
// ============================================================================

/// Operation whose result is cached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheOp {
    Parse,
    Normalize,
    Classify,
}

/// Cache key: the operation plus the full input text, never a digest
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    op: CacheOp,
    text: String,
}

/// Cached result of one operation
#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Composition(Arc<Composition>),
    Text(String),
    Tag(EntityTag),
}

/// Storage policy for formula results
pub trait FormulaCache: Send + Sync {
    fn get(&self, op: CacheOp, text: &str) -> Option<CachedValue>;

    fn insert(&self, op: CacheOp, text: &str, value: CachedValue);

    fn stats(&self) -> CacheStatsReport;
}

/// Build the cache described by the configuration
pub fn from_config(config: &CacheConfig) -> Arc<dyn FormulaCache> {
    if !config.enabled {
        return Arc::new(NoCache);
    }
    if config.max_capacity == 0 {
        Arc::new(MokaFormulaCache::unbounded())
    } else {
        Arc::new(MokaFormulaCache::bounded(config.max_capacity))
    }
}

// ============================================================================
// Moka Cache
// ============================================================================

/// In-memory cache backed by `moka::sync::Cache`
#[derive(Clone)]
pub struct MokaFormulaCache {
    cache: Cache<CacheKey, CachedValue>,
    stats: Arc<CacheStats>,
}

impl MokaFormulaCache {
    /// Cache without an entry limit
    pub fn unbounded() -> Self {
        Self {
            cache: Cache::builder().build(),
            stats: Arc::new(CacheStats::new("formula")),
        }
    }

    /// Cache holding at most `max_capacity` entries
    pub fn bounded(max_capacity: u64) -> Self {
        Self {
            cache: Cache::builder().max_capacity(max_capacity).build(),
            stats: Arc::new(CacheStats::new("formula")),
        }
    }

    /// Current number of entries
    pub fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks();
        self.cache.entry_count()
    }

    /// Drop every entry and reset the counters
    pub fn clear(&self) {
        self.cache.invalidate_all();
        self.cache.run_pending_tasks();
        self.stats.reset();
    }
}

impl FormulaCache for MokaFormulaCache {
    fn get(&self, op: CacheOp, text: &str) -> Option<CachedValue> {
        let key = CacheKey {
            op,
            text: text.to_string(),
        };
        let result = self.cache.get(&key);

        if result.is_some() {
            self.stats.record_hit();
        } else {
            self.stats.record_miss();
        }

        result
    }

    fn insert(&self, op: CacheOp, text: &str, value: CachedValue) {
        let key = CacheKey {
            op,
            text: text.to_string(),
        };
        self.cache.insert(key, value);
        self.stats.record_write();
    }

    fn stats(&self) -> CacheStatsReport {
        self.stats.report()
    }
}

impl Default for MokaFormulaCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

/// Caching disabled: every lookup misses and inserts are dropped
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl FormulaCache for NoCache {
    fn get(&self, _op: CacheOp, _text: &str) -> Option<CachedValue> {
        None
    }

    fn insert(&self, _op: CacheOp, _text: &str, _value: CachedValue) {}

    fn stats(&self) -> CacheStatsReport {
        CacheStats::new("disabled").report()
    }
}

// ============================================================================
// Cache Statistics
// ============================================================================

/// Hit/miss counters for cache monitoring
#[derive(Debug)]
pub struct CacheStats {
    name: String,
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheStats {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        self.writes.store(0, Ordering::Relaxed);
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses();
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }

    pub fn report(&self) -> CacheStatsReport {
        CacheStatsReport {
            name: self.name.clone(),
            hits: self.hits(),
            misses: self.misses(),
            writes: self.writes(),
            total_requests: self.hits() + self.misses(),
            hit_rate: self.hit_rate(),
        }
    }
}

/// Serializable cache statistics report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheStatsReport {
    pub name: String,
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub total_requests: u64,
    /// Hit rate (0.0 - 1.0)
    pub hit_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_moka_cache_basic() {
        let cache = MokaFormulaCache::unbounded();

        assert!(cache.get(CacheOp::Normalize, "NaMnO2").is_none());
        assert_eq!(cache.stats().misses, 1);

        cache.insert(
            CacheOp::Normalize,
            "NaMnO2",
            CachedValue::Text("NaMnO2".to_string()),
        );
        assert_eq!(
            cache.get(CacheOp::Normalize, "NaMnO2"),
            Some(CachedValue::Text("NaMnO2".to_string()))
        );

        let report = cache.stats();
        assert_eq!(report.hits, 1);
        assert_eq!(report.writes, 1);
        assert!((report.hit_rate - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_operations_do_not_share_entries() {
        let cache = MokaFormulaCache::unbounded();
        cache.insert(CacheOp::Classify, "NM", CachedValue::Tag(EntityTag::Abbreviation));
        assert!(cache.get(CacheOp::Normalize, "NM").is_none());
        assert!(cache.get(CacheOp::Classify, "NM ").is_none());
    }

    #[test]
    fn test_clear_resets() {
        let cache = MokaFormulaCache::bounded(16);
        cache.insert(CacheOp::Normalize, "a", CachedValue::Text("a".to_string()));
        assert_eq!(cache.entry_count(), 1);
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.stats().writes, 0);
    }

    #[test]
    fn test_no_cache() {
        let cache = NoCache;
        cache.insert(CacheOp::Normalize, "a", CachedValue::Text("a".to_string()));
        assert!(cache.get(CacheOp::Normalize, "a").is_none());
        assert_eq!(cache.stats().total_requests, 0);
    }

    #[test]
    fn test_from_config() {
        let disabled = from_config(&CacheConfig {
            enabled: false,
            max_capacity: 0,
        });
        disabled.insert(CacheOp::Parse, "x", CachedValue::Text("x".to_string()));
        assert!(disabled.get(CacheOp::Parse, "x").is_none());

        let enabled = from_config(&CacheConfig::default());
        enabled.insert(CacheOp::Parse, "x", CachedValue::Text("x".to_string()));
        assert!(enabled.get(CacheOp::Parse, "x").is_some());
    }
}
