//! Search configuration

use crate::search::error::{SearchError, SearchResult};
use crate::search::facet_cache::DEFAULT_REFRESH_INTERVAL;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Query scope (context path) the facet set is looked up for
    pub scope: String,

    /// Facet snapshot refresh interval in seconds
    pub facet_refresh_interval_secs: u64,

    /// Forward the backend debug flag with every query
    pub debug: bool,

    /// Page size of newly created queries
    pub default_max_results: i64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            scope: "/".to_string(),
            facet_refresh_interval_secs: DEFAULT_REFRESH_INTERVAL.as_secs(),
            debug: false,
            default_max_results: 10,
        }
    }
}

impl SearchConfig {
    pub fn facet_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.facet_refresh_interval_secs)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.scope.trim().is_empty() {
            return Err(SearchError::InvalidConfiguration(
                "search.scope must not be empty".to_string(),
            ));
        }
        if self.default_max_results < 0 {
            return Err(SearchError::InvalidConfiguration(
                "search.default_max_results must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.config.scope = scope.into();
        self
    }

    pub fn facet_refresh_interval_secs(mut self, secs: u64) -> Self {
        self.config.facet_refresh_interval_secs = secs;
        self
    }

    pub fn debug(mut self, enabled: bool) -> Self {
        self.config.debug = enabled;
        self
    }

    pub fn default_max_results(mut self, max: i64) -> Self {
        self.config.default_max_results = max;
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Solr repository configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SolrConfig {
    /// Base URL of the Solr server, e.g. `http://localhost:8983/solr`
    pub base_url: String,

    /// Collection (core) name
    pub collection: String,

    /// Encoded parameter length above which queries are sent as POST
    pub get_post_threshold: usize,

    pub request_timeout_secs: u64,
}

impl Default for SolrConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8983/solr".to_string(),
            collection: "documents".to_string(),
            get_post_threshold: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl SolrConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// How a committing publish job makes its documents visible
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CommitStrategy {
    /// `add` followed by an explicit `commit`
    #[default]
    Explicit,
    /// `add` with a commit-within deadline
    Within,
}

/// Publish pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Maximum number of concurrently running publish jobs
    pub workers: usize,

    pub commit_strategy: CommitStrategy,

    /// Commit deadline used by [`CommitStrategy::Within`]
    pub commit_within_ms: u64,

    /// Initial state of the commits toggle
    pub commits_enabled: bool,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            commit_strategy: CommitStrategy::Explicit,
            commit_within_ms: 180_000,
            commits_enabled: true,
        }
    }
}

impl PublishConfig {
    pub fn commit_within(&self) -> Duration {
        Duration::from_millis(self.commit_within_ms)
    }

    pub fn validate(&self) -> SearchResult<()> {
        if self.workers == 0 {
            return Err(SearchError::InvalidConfiguration(
                "publish.workers must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
