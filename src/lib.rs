//! Faceted search engine for Solr-style backends.
//!
//! - [`search`]: query model, facet cache, translator, result adapter,
//!   repository handles and the publish pipeline
//! - [`metrics`]: the metrics sink contract and its Prometheus and in-memory sinks
//! - [`config`]: layered configuration (embedded defaults, file, environment)
//! - [`telemetry`]: tracing subscriber setup

pub mod config;
pub mod error;
pub mod metrics;
pub mod search;
pub mod telemetry;

pub use self::config::Config;
pub use error::{AppError, Result};
pub use search::{SearchError, SearchResult, SearchService};
