//! Search configuration

use crate::error::{SearchError, SearchResult};
use odm_path::PathAddress;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const DEFAULT_CONCURRENCY: usize = 4;

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_language() -> String {
    "en".to_string()
}

/// Connection description resolved from the store
///
/// Tagged on `type`; each variant owns its endpoint's concurrency limit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ConnectionSpec {
    /// SPARQL query endpoint
    Sparql {
        id: String,
        endpoint: String,
        #[serde(default = "default_concurrency")]
        concurrency: usize,
        /// Address of a prefix table (`name -> iri`) to prepend to queries
        #[serde(default, skip_serializing_if = "Option::is_none")]
        prefixes: Option<PathAddress>,
    },
    /// Wikibase action API
    Wikibase {
        id: String,
        api: String,
        #[serde(default = "default_language")]
        language: String,
        #[serde(default = "default_concurrency")]
        concurrency: usize,
    },
}

impl ConnectionSpec {
    /// Connection id
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Sparql { id, .. } | Self::Wikibase { id, .. } => id,
        }
    }

    /// Maximum concurrent queries against the endpoint (at least one)
    #[must_use]
    pub fn concurrency(&self) -> usize {
        match self {
            Self::Sparql { concurrency, .. } | Self::Wikibase { concurrency, .. } => (*concurrency).max(1),
        }
    }

    /// Endpoint URL
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Sparql { endpoint, .. } => endpoint,
            Self::Wikibase { api, .. } => api,
        }
    }
}

/// Search session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Debounce window for interactive search
    pub debounce_ms: u64,
    /// Row limit for channels built without an explicit limit
    pub default_limit: usize,
    /// Maximum cached `(channel, input)` results
    pub cache_capacity: u64,
    /// Lifetime of cached results
    pub cache_ttl_secs: u64,
    /// Inputs pre-warmed concurrently
    pub precache_pool_size: usize,
    /// Single characters to pre-warm
    pub precache_alphabet: String,
    /// Curated multi-character inputs to pre-warm
    pub precache_prefixes: Vec<String>,
    /// Connections available to the host
    pub connections: Vec<ConnectionSpec>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 150,
            default_limit: 10,
            cache_capacity: 4096,
            cache_ttl_secs: 600,
            precache_pool_size: 4,
            precache_alphabet: "abcdefghijklmnopqrstuvwxyz0123456789".to_string(),
            precache_prefixes: [
                "th", "he", "in", "er", "an", "re", "on", "at", "en", "nd", "st", "es", "or", "te",
                "ar", "al", "ma", "co", "de", "ca",
            ]
            .iter()
            .map(|p| (*p).to_string())
            .collect(),
            connections: Vec::new(),
        }
    }
}

impl SearchConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from TOML; missing keys take defaults
    ///
    /// # Errors
    /// Returns `Config` on malformed TOML or invalid values
    pub fn from_toml_str(text: &str) -> SearchResult<Self> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// Returns `Config` naming the first invalid field
    pub fn validate(&self) -> SearchResult<()> {
        if self.precache_pool_size == 0 {
            return Err(SearchError::Config("precache_pool_size must be at least 1".into()));
        }
        if self.default_limit == 0 {
            return Err(SearchError::Config("default_limit must be at least 1".into()));
        }
        Ok(())
    }

    /// Set debounce window
    #[must_use]
    pub fn with_debounce_ms(mut self, ms: u64) -> Self {
        self.debounce_ms = ms;
        self
    }

    /// Set default row limit
    #[must_use]
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }

    /// Set cache capacity
    #[must_use]
    pub fn with_cache_capacity(mut self, capacity: u64) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Set precache pool size
    #[must_use]
    pub fn with_precache_pool_size(mut self, size: usize) -> Self {
        self.precache_pool_size = size;
        self
    }

    /// Set precache alphabet
    #[must_use]
    pub fn with_precache_alphabet(mut self, alphabet: impl Into<String>) -> Self {
        self.precache_alphabet = alphabet.into();
        self
    }

    /// Set curated precache prefixes
    #[must_use]
    pub fn with_precache_prefixes<I, S>(mut self, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.precache_prefixes = prefixes.into_iter().map(Into::into).collect();
        self
    }

    #[inline]
    #[must_use]
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    #[inline]
    #[must_use]
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Inputs to pre-warm: every alphabet character, then the curated
    /// prefixes, without duplicates
    #[must_use]
    pub fn precache_inputs(&self) -> Vec<String> {
        let mut inputs: Vec<String> = Vec::new();
        let candidates = self
            .precache_alphabet
            .chars()
            .map(String::from)
            .chain(self.precache_prefixes.iter().cloned());
        for input in candidates {
            if !input.is_empty() && !inputs.contains(&input) {
                inputs.push(input);
            }
        }
        inputs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults() {
        let config = SearchConfig::default();
        assert_eq!(config.debounce(), Duration::from_millis(150));
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.precache_inputs().len(), 36 + 20);
    }

    #[test]
    fn builder_chain() {
        let config = SearchConfig::new()
            .with_debounce_ms(50)
            .with_precache_alphabet("ab")
            .with_precache_prefixes(["ab", "cd"]);
        assert_eq!(config.debounce_ms, 50);
        assert_eq!(config.precache_inputs(), vec!["a", "b", "ab", "cd"]);
    }

    #[test]
    fn from_toml_with_connections() {
        let config = SearchConfig::from_toml_str(
            r#"
            debounce_ms = 75

            [[connections]]
            type = "sparql"
            id = "wikidata"
            endpoint = "https://query.example.org/sparql"
            prefixes = "static#conn.prefixes.wikidata"

            [[connections]]
            type = "wikibase"
            id = "commons"
            api = "https://commons.example.org/w/api.php"
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.debounce_ms, 75);
        assert_eq!(config.default_limit, 10);
        assert_eq!(config.connections.len(), 2);
        assert_eq!(config.connections[0].concurrency(), 4);
        assert_eq!(config.connections[1].id(), "commons");
        assert!(matches!(
            &config.connections[1],
            ConnectionSpec::Wikibase { language, concurrency: 2, .. } if language == "en"
        ));
    }

    #[test]
    fn invalid_toml_is_a_config_error() {
        let err = SearchConfig::from_toml_str("precache_pool_size = 0").unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));

        let err = SearchConfig::from_toml_str("debounce_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, SearchError::Config(_)));
    }

    #[test]
    fn unknown_connection_type_is_rejected() {
        let err = serde_json::from_str::<ConnectionSpec>(r#"{"type":"ldap","id":"x"}"#);
        assert!(err.is_err());
    }
}
