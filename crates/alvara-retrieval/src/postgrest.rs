//! Regulation corpus served by a PostgREST endpoint
//!
//! Search uses the `fts(portuguese)` operator, so terms are joined with the
//! tsquery operators `&` and `|`.

use crate::corpus::{
    LawCategory, MatchMode, NewRegulation, Regulation, RegulationCorpus, RetrievedExcerpt,
};
use crate::error::{RetrievalError, RetrievalResult};
use reqwest::{Client, RequestBuilder, Response};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Table holding the regulation files
pub const DEFAULT_TABLE: &str = "legislation_files";

/// Column carrying the full-text index
pub const DEFAULT_SEARCH_COLUMN: &str = "extracted_text";

#[derive(Debug, Deserialize)]
struct SearchRow {
    name: String,
    #[serde(default)]
    category: LawCategory,
    #[serde(default)]
    extracted_text: Option<String>,
}

/// PostgREST-backed corpus
#[derive(Debug, Clone)]
pub struct PostgrestCorpus {
    http: Client,
    base_url: String,
    api_key: String,
    table: String,
    search_column: String,
}

impl PostgrestCorpus {
    /// Create corpus client for a project URL and anon key
    ///
    /// # Errors
    /// - `RetrievalError::Config` if url or key is empty
    /// - `RetrievalError::Http` if the HTTP client cannot be built
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> RetrievalResult<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let api_key = api_key.into();
        if base_url.is_empty() || api_key.is_empty() {
            return Err(RetrievalError::Config(
                "corpus url and api key are required".to_string(),
            ));
        }

        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        Ok(Self {
            http,
            base_url,
            api_key,
            table: DEFAULT_TABLE.to_string(),
            search_column: DEFAULT_SEARCH_COLUMN.to_string(),
        })
    }

    /// Use another table
    #[inline]
    #[must_use]
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Use another full-text column
    #[inline]
    #[must_use]
    pub fn with_search_column(mut self, column: impl Into<String>) -> Self {
        self.search_column = column.into();
        self
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn checked(response: Response) -> RetrievalResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(RetrievalError::status_error(status.as_u16(), body))
    }

    /// tsquery for the given terms
    #[must_use]
    pub fn tsquery(terms: &[String], mode: MatchMode) -> String {
        terms.join(mode.operator())
    }
}

#[async_trait::async_trait]
impl RegulationCorpus for PostgrestCorpus {
    async fn search(
        &self,
        terms: &[String],
        mode: MatchMode,
        limit: usize,
    ) -> RetrievalResult<Vec<RetrievedExcerpt>> {
        let filter = format!("fts(portuguese).{}", Self::tsquery(terms, mode));
        debug!(?mode, filter = %filter, "corpus search");

        let limit = limit.to_string();
        let request = self.http.get(self.endpoint()).query(&[
            ("select", "name,category,extracted_text"),
            (self.search_column.as_str(), filter.as_str()),
            ("limit", limit.as_str()),
        ]);
        let response = Self::checked(self.authorized(request).send().await?).await?;
        let rows: Vec<SearchRow> = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| RetrievedExcerpt {
                title: row.name,
                category: row.category,
                excerpt: row.extracted_text.unwrap_or_default(),
            })
            .collect())
    }

    async fn list(&self) -> RetrievalResult<Vec<Regulation>> {
        let request = self
            .http
            .get(self.endpoint())
            .query(&[("select", "*"), ("order", "category")]);
        let response = Self::checked(self.authorized(request).send().await?).await?;
        response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))
    }

    async fn insert(&self, regulation: NewRegulation) -> RetrievalResult<Regulation> {
        let request = self
            .http
            .post(self.endpoint())
            .header("Prefer", "return=representation")
            .json(&[regulation]);
        let response = Self::checked(self.authorized(request).send().await?).await?;
        let mut rows: Vec<Regulation> = response
            .json()
            .await
            .map_err(|e| RetrievalError::Decode(e.to_string()))?;
        rows.pop()
            .ok_or_else(|| RetrievalError::Decode("insert returned no row".to_string()))
    }

    async fn delete(&self, id: &str) -> RetrievalResult<()> {
        let request = self
            .http
            .delete(self.endpoint())
            .query(&[("id", format!("eq.{id}"))]);
        Self::checked(self.authorized(request).send().await?).await?;
        Ok(())
    }
}
