//! Assistant configuration
//!
//! Loaded from TOML; secrets come from the environment and override the file.

use crate::error::ConfigError;
pub use alvara_retrieval::retry::RetryPolicy;
use alvara_record::CaseRef;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable holding the model API key
pub const ENV_GEMINI_API_KEY: &str = "GEMINI_API_KEY";
/// Environment variable holding the corpus project URL
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
/// Environment variable holding the corpus anon key
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";

/// Model endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiSettings {
    /// API root, without the model path
    pub base_url: String,
    /// API key
    pub api_key: Option<String>,
}

impl Default for GeminiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            api_key: None,
        }
    }
}

/// Regulation corpus settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusSettings {
    /// Project URL
    pub url: Option<String>,
    /// Anonymous key
    pub anon_key: Option<String>,
    /// Table of regulation files
    pub table: String,
}

impl Default for CorpusSettings {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            table: alvara_retrieval::postgrest::DEFAULT_TABLE.to_string(),
        }
    }
}

/// Assistant configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    /// Model name
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Wall-clock limit of one turn, in seconds
    pub turn_timeout_secs: u64,
    /// Stream opening retries
    pub retry: RetryPolicy,
    /// Excerpts per retrieval
    pub retrieval_limit: usize,
    /// Messages must be longer than this to trigger retrieval
    pub rag_min_chars: usize,
    /// Model endpoint
    pub gemini: GeminiSettings,
    /// Regulation corpus endpoint
    pub corpus: CorpusSettings,
    /// Known cases, by protocol number
    pub cases: Vec<CaseRef>,
    /// Directory of the JSON record store
    pub store_dir: PathBuf,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.1,
            turn_timeout_secs: 600,
            retry: RetryPolicy::default(),
            retrieval_limit: alvara_retrieval::DEFAULT_RESULT_LIMIT,
            rag_min_chars: 5,
            gemini: GeminiSettings::default(),
            corpus: CorpusSettings::default(),
            cases: Vec::new(),
            store_dir: PathBuf::from("audits"),
        }
    }
}

impl AssistantConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML text
    ///
    /// # Errors
    /// - `ConfigError::Parse` on invalid TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load a TOML file and apply environment overrides
    ///
    /// # Errors
    /// - `ConfigError::Io` if the file cannot be read
    /// - `ConfigError::Parse` on invalid TOML
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_toml_str(&text)?.with_env_overrides())
    }

    /// Apply secrets from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply secrets from a variable lookup
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let lookup = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = lookup(ENV_GEMINI_API_KEY) {
            self.gemini.api_key = Some(key);
        }
        if let Some(url) = lookup(ENV_SUPABASE_URL) {
            self.corpus.url = Some(url);
        }
        if let Some(key) = lookup(ENV_SUPABASE_ANON_KEY) {
            self.corpus.anon_key = Some(key);
        }
        self
    }

    /// Model API key
    ///
    /// # Errors
    /// - `ConfigError::Missing` if no key is configured
    pub fn gemini_api_key(&self) -> Result<&str, ConfigError> {
        self.gemini
            .api_key
            .as_deref()
            .ok_or(ConfigError::Missing(ENV_GEMINI_API_KEY))
    }

    /// Turn deadline
    #[must_use]
    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }

    /// With model name
    #[inline]
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// With temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// With turn timeout
    #[inline]
    #[must_use]
    pub fn with_turn_timeout(mut self, timeout: Duration) -> Self {
        self.turn_timeout_secs = timeout.as_secs();
        self
    }

    /// With retry policy
    #[inline]
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// With retrieval limit
    #[inline]
    #[must_use]
    pub fn with_retrieval_limit(mut self, limit: usize) -> Self {
        self.retrieval_limit = limit;
        self
    }

    /// With store directory
    #[inline]
    #[must_use]
    pub fn with_store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = dir.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_turn_contract() {
        let config = AssistantConfig::new();
        assert_eq!(config.model, "gemini-2.5-flash");
        assert_eq!(config.turn_timeout(), Duration::from_secs(600));
        assert_eq!(config.rag_min_chars, 5);
        assert_eq!(config.retrieval_limit, 5);
    }

    #[test]
    fn retry_delays_double() {
        let policy = RetryPolicy::default();
        let delays: Vec<_> = (0..3).map(|n| policy.delay_for(n).as_millis()).collect();
        assert_eq!(delays, vec![2000, 4000, 8000]);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = AssistantConfig::from_toml_str(
            r#"
            model = "gemini-2.5-pro"

            [retry]
            max_retries = 1

            [[cases]]
            case_id = "c-1"
            protocol = "2024/0153"
            case_kind = "HABITE_SE"
            "#,
        )
        .unwrap();
        assert_eq!(config.model, "gemini-2.5-pro");
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.initial_delay_ms, 2000);
        assert_eq!(config.cases.len(), 1);
        assert_eq!(config.cases[0].case_kind, alvara_record::CaseKind::HabiteSe);
    }

    #[test]
    fn environment_overrides_file_secrets() {
        let mut config = AssistantConfig::new();
        config.gemini.api_key = Some("from-file".to_string());
        let config = config.with_overrides_from(|key| match key {
            ENV_GEMINI_API_KEY => Some("from-env".to_string()),
            ENV_SUPABASE_URL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.gemini_api_key().unwrap(), "from-env");
        assert_eq!(config.corpus.url, None);
    }

    #[test]
    fn missing_key_is_reported() {
        let err = AssistantConfig::new().gemini_api_key().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_GEMINI_API_KEY)));
    }
}
