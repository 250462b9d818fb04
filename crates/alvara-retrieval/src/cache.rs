//! Legislation catalog cache using moka
//!
//! Holds the single catalog listing. Writers call [`LegislationCache::invalidate`];
//! a load that started before an invalidation never repopulates the cache.

use crate::corpus::Regulation;
use crate::error::RetrievalResult;
use moka::future::Cache;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Default lifetime of a cached catalog
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(300);

/// Cached catalog of regulation files
#[derive(Debug)]
pub struct LegislationCache {
    inner: Cache<(), Arc<Vec<Regulation>>>,
    generation: AtomicU64,
}

impl Default for LegislationCache {
    fn default() -> Self {
        Self::new(DEFAULT_CATALOG_TTL)
    }
}

impl LegislationCache {
    /// Create cache with time-based expiration
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().max_capacity(1).time_to_live(ttl).build(),
            generation: AtomicU64::new(0),
        }
    }

    /// Cached catalog, if present
    pub async fn get(&self) -> Option<Arc<Vec<Regulation>>> {
        self.inner.get(&()).await
    }

    /// Return the cached catalog or load and cache it
    ///
    /// # Errors
    /// Propagates the loader's error; nothing is cached in that case.
    pub async fn get_or_load<F, Fut>(&self, load: F) -> RetrievalResult<Arc<Vec<Regulation>>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = RetrievalResult<Vec<Regulation>>>,
    {
        if let Some(hit) = self.inner.get(&()).await {
            return Ok(hit);
        }

        let started_at = self.generation.load(Ordering::Acquire);
        let fresh = Arc::new(load().await?);
        if self.generation.load(Ordering::Acquire) == started_at {
            self.inner.insert((), Arc::clone(&fresh)).await;
        } else {
            tracing::debug!("catalog changed during load, not caching");
        }
        Ok(fresh)
    }

    /// Drop the cached catalog
    pub async fn invalidate(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.inner.invalidate_all();
        self.inner.run_pending_tasks().await;
    }
}
