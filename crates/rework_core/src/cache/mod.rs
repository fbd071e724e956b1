//! Read-through cache for filter dimension values (workshops, models, ...).
//!
//! Provides:
//! - TTL-based expiration per dimension
//! - Explicit invalidation after imports
//! - Thread-safe access via Mutex

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::config::EngineConfig;
use crate::error::AppError;
use crate::filter::Dimension;

struct CachedValues {
    values: Vec<String>,
    loaded_at: Instant,
}

#[derive(Default)]
struct CacheState {
    entries: HashMap<Dimension, CachedValues>,
    hits: u64,
    misses: u64,
}

/// Dimension value cache, owned by whoever serves filter options.
pub struct DimensionCache {
    state: Mutex<CacheState>,
    ttl: Duration,
}

impl DimensionCache {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_ttl(config.cache_ttl_seconds)
    }

    pub fn with_ttl(ttl_seconds: u64) -> Self {
        DimensionCache {
            state: Mutex::new(CacheState::default()),
            ttl: Duration::from_secs(ttl_seconds),
        }
    }

    // A panic while holding the lock leaves the map consistent; keep serving it.
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return cached values for `dimension` while fresh, otherwise call `loader` and store
    /// its result. Loader errors are returned and nothing is cached.
    pub fn get_or_load<F>(&self, dimension: Dimension, loader: F) -> Result<Vec<String>, AppError>
    where
        F: FnOnce() -> Result<Vec<String>, AppError>,
    {
        {
            let mut state = self.lock();
            let fresh = state
                .entries
                .get(&dimension)
                .filter(|cached| cached.loaded_at.elapsed() < self.ttl)
                .map(|cached| cached.values.clone());
            if let Some(values) = fresh {
                state.hits += 1;
                return Ok(values);
            }
            state.misses += 1;
        }

        // Loader runs without the lock held; a concurrent miss may load twice.
        let values = loader()?;
        tracing::debug!(
            dimension = dimension.as_str(),
            count = values.len(),
            "loaded dimension values"
        );
        self.lock().entries.insert(
            dimension,
            CachedValues {
                values: values.clone(),
                loaded_at: Instant::now(),
            },
        );
        Ok(values)
    }

    /// Drop every cached dimension (call after data changes).
    pub fn invalidate_all(&self) {
        self.lock().entries.clear();
    }

    pub fn invalidate(&self, dimension: Dimension) {
        self.lock().entries.remove(&dimension);
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.lock();
        let mut cached_dimensions = state.entries.keys().copied().collect::<Vec<_>>();
        cached_dimensions.sort();
        CacheStats {
            cached_dimensions,
            hits: state.hits,
            misses: state.misses,
            ttl_seconds: self.ttl.as_secs(),
        }
    }
}

impl Default for DimensionCache {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

/// Cache statistics for monitoring
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    pub cached_dimensions: Vec<Dimension>,
    pub hits: u64,
    pub misses: u64,
    pub ttl_seconds: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::thread;

    fn values(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cache_hit_skips_loader() {
        let cache = DimensionCache::default();
        let calls = Cell::new(0);
        let load = || {
            calls.set(calls.get() + 1);
            Ok::<_, AppError>(values(&["Central", "North"]))
        };

        assert_eq!(cache.get_or_load(Dimension::Workshop, load).unwrap().len(), 2);
        assert_eq!(cache.get_or_load(Dimension::Workshop, load).unwrap().len(), 2);
        assert_eq!(calls.get(), 1);

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.cached_dimensions, vec![Dimension::Workshop]);
    }

    #[test]
    fn test_cache_expiration() {
        let cache = DimensionCache::with_ttl(1);
        cache
            .get_or_load(Dimension::Model, || Ok(values(&["Bus"])))
            .unwrap();

        thread::sleep(Duration::from_millis(1100));

        let reloaded = cache
            .get_or_load(Dimension::Model, || Ok(values(&["Bus", "Truck"])))
            .unwrap();
        assert_eq!(reloaded, values(&["Bus", "Truck"]));
    }

    #[test]
    fn test_loader_errors_are_not_cached() {
        let cache = DimensionCache::default();
        let err = cache
            .get_or_load(Dimension::Section, || {
                Err(AppError::new("DB_QUERY_FAILED", "boom"))
            })
            .unwrap_err();
        assert_eq!(err.code, "DB_QUERY_FAILED");
        assert!(cache.stats().cached_dimensions.is_empty());

        let ok = cache
            .get_or_load(Dimension::Section, || Ok(values(&["Brakes"])))
            .unwrap();
        assert_eq!(ok, values(&["Brakes"]));
    }

    #[test]
    fn test_cache_invalidate_all() {
        let cache = DimensionCache::default();
        cache
            .get_or_load(Dimension::Workshop, || Ok(values(&["Central"])))
            .unwrap();
        cache
            .get_or_load(Dimension::Vehicle, || Ok(values(&["V1"])))
            .unwrap();
        assert_eq!(cache.stats().cached_dimensions.len(), 2);

        cache.invalidate_all();
        assert!(cache.stats().cached_dimensions.is_empty());
    }
}
