//! Alvará Retrieval - regulation lookup for audit turns
//!
//! Provides:
//! - Query normalization tuned for Portuguese legal questions
//! - Two-tier full-text retrieval (all terms, then any term)
//! - The legislation catalog cache with invalidate-on-write
//! - Backoff for quota and overload failures, shared with the agent
//! - A PostgREST corpus and an in-memory corpus
//!
//! # Example
//!
//! ```rust,ignore
//! use alvara_retrieval::prelude::*;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), RetrievalError> {
//! let client = RetrievalClient::new(Arc::new(MemoryCorpus::new()));
//! let query = normalize_query("qual artigo fala do prisma de ventilação");
//! let excerpts = client.retrieve(&query).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod client;
pub mod corpus;
pub mod error;
pub mod normalize;
pub mod postgrest;
pub mod retry;

pub use cache::{LegislationCache, DEFAULT_CATALOG_TTL};
pub use client::{RetrievalClient, DEFAULT_RESULT_LIMIT};
pub use corpus::{
    LawCategory, MatchMode, MemoryCorpus, NewRegulation, RecordedSearch, Regulation,
    RegulationCorpus, RetrievedExcerpt,
};
pub use error::{RetrievalError, RetrievalResult};
pub use normalize::{normalize_query, query_terms, STOP_WORDS};
pub use postgrest::PostgrestCorpus;
pub use retry::{Recoverable, RetryPolicy, RetryScheduler};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for retrieval
    pub use crate::{
        normalize_query, MatchMode, MemoryCorpus, RegulationCorpus, RetrievalClient,
        RetrievalError, RetrievedExcerpt,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
