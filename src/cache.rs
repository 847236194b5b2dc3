use crate::descramble::{CopyStep, ScrambleScheme};
use crate::identity::SourceId;
use crate::types::CatalogEntry;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;

/// Cache key for full detail entries
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct DetailKey {
    source: SourceId,
    remote_id: String,
}

/// Cache key for descramble plans
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
struct PlanKey {
    identifier: String,
    width: u32,
    height: u32,
    scheme: ScrambleScheme,
}

/// Cache for parsed detail entries and descramble step plans.
///
/// Plan caching relies on the engine's determinism: the same key always maps
/// to the same step list.
#[derive(Clone)]
pub struct SourceCache {
    detail_cache: Cache<DetailKey, Arc<CatalogEntry>>,
    plan_cache: Cache<PlanKey, Arc<Vec<CopyStep>>>,
}

impl SourceCache {
    /// Create a new cache with default settings
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create a new cache with custom configuration
    pub fn with_config(config: CacheConfig) -> Self {
        let detail_cache = Cache::builder()
            .max_capacity(config.detail_max_entries)
            .time_to_live(config.detail_ttl)
            .build();

        let plan_cache = Cache::builder()
            .max_capacity(config.plan_max_entries)
            .time_to_live(config.plan_ttl)
            .build();

        Self {
            detail_cache,
            plan_cache,
        }
    }

    /// Get a cached detail entry
    pub async fn get_detail(&self, source: SourceId, remote_id: &str) -> Option<CatalogEntry> {
        let key = DetailKey {
            source,
            remote_id: remote_id.to_string(),
        };

        self.detail_cache.get(&key).await.map(|arc| (*arc).clone())
    }

    /// Cache a detail entry
    pub async fn set_detail(&self, source: SourceId, remote_id: &str, entry: CatalogEntry) {
        let key = DetailKey {
            source,
            remote_id: remote_id.to_string(),
        };

        self.detail_cache.insert(key, Arc::new(entry)).await;
    }

    /// Get a cached descramble plan
    pub async fn get_plan(
        &self,
        identifier: &str,
        width: u32,
        height: u32,
        scheme: ScrambleScheme,
    ) -> Option<Arc<Vec<CopyStep>>> {
        let key = PlanKey {
            identifier: identifier.to_string(),
            width,
            height,
            scheme,
        };

        self.plan_cache.get(&key).await
    }

    /// Cache a descramble plan
    pub async fn set_plan(
        &self,
        identifier: &str,
        width: u32,
        height: u32,
        scheme: ScrambleScheme,
        steps: Vec<CopyStep>,
    ) -> Arc<Vec<CopyStep>> {
        let key = PlanKey {
            identifier: identifier.to_string(),
            width,
            height,
            scheme,
        };

        let steps = Arc::new(steps);
        self.plan_cache.insert(key, steps.clone()).await;
        steps
    }

    /// Clear all caches
    pub fn clear(&self) {
        self.detail_cache.invalidate_all();
        self.plan_cache.invalidate_all();
    }

    /// Get cache statistics
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            detail_entries: self.detail_cache.entry_count(),
            plan_entries: self.plan_cache.entry_count(),
        }
    }
}

impl Default for SourceCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Cache configuration
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of detail entries
    pub detail_max_entries: u64,
    /// TTL for detail entries
    pub detail_ttl: Duration,
    /// Maximum number of descramble plans
    pub plan_max_entries: u64,
    /// TTL for descramble plans
    pub plan_ttl: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            detail_max_entries: 500,
            detail_ttl: Duration::from_secs(3600), // 1 hour
            plan_max_entries: 2000,
            plan_ttl: Duration::from_secs(86400), // 24 hours
        }
    }
}

/// Cache statistics
#[derive(Debug, Clone)]
pub struct CacheStats {
    pub detail_entries: u64,
    pub plan_entries: u64,
}
