//! Two-tier regulation retrieval
//!
//! An ALL-terms search runs first. Only when it returns nothing is the same
//! term list searched once more in ANY mode. Each search goes through the
//! retry scheduler on its own, so a quota failure never adds a third tier.
//! Search results are never cached; the catalog listing is, and every catalog
//! write invalidates it.

use crate::cache::LegislationCache;
use crate::corpus::{MatchMode, NewRegulation, Regulation, RegulationCorpus, RetrievedExcerpt};
use crate::error::RetrievalResult;
use crate::normalize::query_terms;
use crate::retry::RetryScheduler;
use std::sync::Arc;
use tracing::{debug, info};

/// Default number of excerpts per turn
pub const DEFAULT_RESULT_LIMIT: usize = 5;

/// Retrieval front end over a regulation corpus
pub struct RetrievalClient {
    corpus: Arc<dyn RegulationCorpus>,
    catalog: LegislationCache,
    retry: RetryScheduler,
    limit: usize,
}

impl std::fmt::Debug for RetrievalClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalClient")
            .field("limit", &self.limit)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl RetrievalClient {
    /// Create client with the default limit and catalog cache
    #[must_use]
    pub fn new(corpus: Arc<dyn RegulationCorpus>) -> Self {
        Self {
            corpus,
            catalog: LegislationCache::default(),
            retry: RetryScheduler::default(),
            limit: DEFAULT_RESULT_LIMIT,
        }
    }

    /// Set maximum excerpts per retrieval
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Use a specific retry schedule for searches
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryScheduler) -> Self {
        self.retry = retry;
        self
    }

    /// Use a specific catalog cache
    #[inline]
    #[must_use]
    pub fn with_catalog_cache(mut self, cache: LegislationCache) -> Self {
        self.catalog = cache;
        self
    }

    /// Retrieve excerpts for an already normalized query
    ///
    /// Zero hits after both tiers is `Ok(vec![])`.
    ///
    /// # Errors
    /// Corpus failures that are final, or still failing after retries.
    pub async fn retrieve(&self, normalized: &str) -> RetrievalResult<Vec<RetrievedExcerpt>> {
        let terms = query_terms(normalized);
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = self.search(&terms, MatchMode::All).await?;
        if hits.is_empty() {
            debug!(query = normalized, "exact search empty, broadening to any-term");
            hits = self.search(&terms, MatchMode::Any).await?;
        }
        hits.truncate(self.limit);

        info!(query = normalized, hits = hits.len(), "retrieval finished");
        Ok(hits)
    }

    async fn search(&self, terms: &[String], mode: MatchMode) -> RetrievalResult<Vec<RetrievedExcerpt>> {
        self.retry
            .run(move || self.corpus.search(terms, mode, self.limit))
            .await
    }

    /// Catalog of regulation files, served from cache when possible
    ///
    /// # Errors
    /// Corpus failures are returned as is.
    pub async fn list_laws(&self) -> RetrievalResult<Arc<Vec<Regulation>>> {
        self.catalog.get_or_load(|| self.corpus.list()).await
    }

    /// Add a regulation and invalidate the catalog
    ///
    /// # Errors
    /// Corpus failures are returned as is; the catalog is invalidated anyway.
    pub async fn add_law(&self, regulation: NewRegulation) -> RetrievalResult<Regulation> {
        let result = self.corpus.insert(regulation).await;
        self.catalog.invalidate().await;
        result
    }

    /// Remove a regulation and invalidate the catalog
    ///
    /// # Errors
    /// Corpus failures are returned as is; the catalog is invalidated anyway.
    pub async fn delete_law(&self, id: &str) -> RetrievalResult<()> {
        let result = self.corpus.delete(id).await;
        self.catalog.invalidate().await;
        result
    }
}
