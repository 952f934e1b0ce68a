use crate::metrics::MetricsConfig;
use crate::search::{FacetDefinition, PublishConfig, SearchConfig, SolrConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming the configuration file
pub const CONFIG_PATH_ENV: &str = "FACET_SEARCH_CONFIG";

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Search engine configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Solr repository configuration
    #[serde(default)]
    pub solr: SolrConfig,

    /// Publish pipeline configuration
    #[serde(default)]
    pub publish: PublishConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,

    /// Static facet definitions of the configured scope
    #[serde(default)]
    pub facets: Vec<FacetDefinition>,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> Result<Self, config::ConfigError> {
        let config_path = std::env::var(CONFIG_PATH_ENV)
            .unwrap_or_else(|_| "config/facet-search.toml".to_string());

        Self::defaults()
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: FACET_SEARCH_)
            .add_source(
                config::Environment::with_prefix("FACET_SEARCH")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Load defaults overridden by a mandatory config file
    pub fn load_from_file(path: &Path) -> Result<Self, config::ConfigError> {
        Self::defaults()
            .add_source(config::File::from(path).required(true))
            .build()?
            .try_deserialize()
    }

    /// Load defaults overridden by an inline TOML document
    pub fn from_toml_str(toml: &str) -> Result<Self, config::ConfigError> {
        Self::defaults()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }

    fn defaults() -> config::ConfigBuilder<config::builder::DefaultState> {
        config::Config::builder().add_source(config::File::from_str(
            DEFAULT_CONFIG,
            config::FileFormat::Toml,
        ))
    }

    /// Check cross-field constraints
    pub fn validate(&self) -> crate::error::Result<()> {
        self.search.validate()?;
        self.publish.validate()?;
        self.metrics
            .validate()
            .map_err(crate::error::AppError::Configuration)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level, used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "facet-search".to_string()
}
