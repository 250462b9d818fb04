//! Regulation corpus boundary and an in-process implementation

use crate::error::{RetrievalError, RetrievalResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::{Mutex, RwLock};

/// How search terms combine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MatchMode {
    /// Every term must match
    All,
    /// Any term may match
    Any,
}

impl MatchMode {
    /// Full-text operator joining terms
    #[must_use]
    pub fn operator(self) -> &'static str {
        match self {
            Self::All => " & ",
            Self::Any => " | ",
        }
    }
}

/// Kind of regulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LawCategory {
    /// Zoning law
    Zoneamento,
    /// Building code
    CodigoObras,
    /// Master plan
    PlanoDiretor,
    /// Environmental law
    Ambiental,
    /// Anything else
    #[default]
    #[serde(other)]
    Outros,
}

impl fmt::Display for LawCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Zoneamento => "ZONEAMENTO",
            Self::CodigoObras => "CODIGO_OBRAS",
            Self::PlanoDiretor => "PLANO_DIRETOR",
            Self::Ambiental => "AMBIENTAL",
            Self::Outros => "OUTROS",
        };
        f.write_str(label)
    }
}

/// Catalog entry of a regulation file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Regulation {
    /// Corpus identifier
    pub id: String,
    /// Law name
    pub name: String,
    /// Law kind
    #[serde(default)]
    pub category: LawCategory,
    /// Short description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location of the source file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Text extracted from the file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// Regulation to add to the catalog
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRegulation {
    /// Law name
    pub name: String,
    /// Law kind
    pub category: LawCategory,
    /// Short description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Location of the source file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_url: Option<String>,
    /// Text extracted from the file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

impl NewRegulation {
    /// Regulation with name and category only
    #[must_use]
    pub fn new(name: impl Into<String>, category: LawCategory) -> Self {
        Self {
            name: name.into(),
            category,
            description: None,
            file_url: None,
            extracted_text: None,
        }
    }

    /// With extracted text
    #[inline]
    #[must_use]
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.extracted_text = Some(text.into());
        self
    }

    /// With description
    #[inline]
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Search hit handed to the model as context
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedExcerpt {
    /// Law name
    pub title: String,
    /// Law kind
    pub category: LawCategory,
    /// Matching text
    pub excerpt: String,
}

/// Full-text indexed regulation store
#[async_trait::async_trait]
pub trait RegulationCorpus: Send + Sync {
    /// Ranked search, at most `limit` hits
    async fn search(
        &self,
        terms: &[String],
        mode: MatchMode,
        limit: usize,
    ) -> RetrievalResult<Vec<RetrievedExcerpt>>;

    /// Whole catalog ordered by category
    async fn list(&self) -> RetrievalResult<Vec<Regulation>>;

    /// Add a regulation
    async fn insert(&self, regulation: NewRegulation) -> RetrievalResult<Regulation>;

    /// Remove a regulation
    async fn delete(&self, id: &str) -> RetrievalResult<()>;
}

/// Search issued against a [`MemoryCorpus`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSearch {
    /// Terms as received
    pub terms: Vec<String>,
    /// Combination mode
    pub mode: MatchMode,
}

/// Corpus held in memory with substring matching
#[derive(Debug, Default)]
pub struct MemoryCorpus {
    regulations: RwLock<Vec<Regulation>>,
    searches: Mutex<Vec<RecordedSearch>>,
    list_calls: Mutex<usize>,
}

impl MemoryCorpus {
    /// Create empty corpus
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Searches received so far, oldest first
    #[must_use]
    pub fn searches(&self) -> Vec<RecordedSearch> {
        self.searches.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Number of catalog listings served
    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.lock().map(|n| *n).unwrap_or_default()
    }

    fn poisoned() -> RetrievalError {
        RetrievalError::Config("memory corpus lock poisoned".to_string())
    }
}

fn score(regulation: &Regulation, terms: &[String]) -> usize {
    let haystack = format!(
        "{} {}",
        regulation.name.to_lowercase(),
        regulation.extracted_text.as_deref().unwrap_or_default().to_lowercase()
    );
    terms
        .iter()
        .filter(|term| haystack.contains(&term.to_lowercase()))
        .count()
}

#[async_trait::async_trait]
impl RegulationCorpus for MemoryCorpus {
    async fn search(
        &self,
        terms: &[String],
        mode: MatchMode,
        limit: usize,
    ) -> RetrievalResult<Vec<RetrievedExcerpt>> {
        if let Ok(mut searches) = self.searches.lock() {
            searches.push(RecordedSearch {
                terms: terms.to_vec(),
                mode,
            });
        }

        let regulations = self.regulations.read().map_err(|_| Self::poisoned())?;
        let mut hits: Vec<(usize, &Regulation)> = regulations
            .iter()
            .map(|r| (score(r, terms), r))
            .filter(|(matched, _)| match mode {
                MatchMode::All => *matched == terms.len() && *matched > 0,
                MatchMode::Any => *matched > 0,
            })
            .collect();
        hits.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.name.cmp(&b.1.name)));

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(_, r)| RetrievedExcerpt {
                title: r.name.clone(),
                category: r.category,
                excerpt: r.extracted_text.clone().unwrap_or_default(),
            })
            .collect())
    }

    async fn list(&self) -> RetrievalResult<Vec<Regulation>> {
        if let Ok(mut calls) = self.list_calls.lock() {
            *calls += 1;
        }
        let mut all = self.regulations.read().map_err(|_| Self::poisoned())?.clone();
        all.sort_by_key(|r| r.category.to_string());
        Ok(all)
    }

    async fn insert(&self, regulation: NewRegulation) -> RetrievalResult<Regulation> {
        let stored = Regulation {
            id: ulid::Ulid::new().to_string(),
            name: regulation.name,
            category: regulation.category,
            description: regulation.description,
            file_url: regulation.file_url,
            extracted_text: regulation.extracted_text,
        };
        self.regulations
            .write()
            .map_err(|_| Self::poisoned())?
            .push(stored.clone());
        Ok(stored)
    }

    async fn delete(&self, id: &str) -> RetrievalResult<()> {
        let mut regulations = self.regulations.write().map_err(|_| Self::poisoned())?;
        let before = regulations.len();
        regulations.retain(|r| r.id != id);
        if regulations.len() == before {
            return Err(RetrievalError::NotFound(id.to_string()));
        }
        Ok(())
    }
}
