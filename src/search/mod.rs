//! Faceted search query/result engine and document publish pipeline
//!
//! This module turns backend-agnostic queries into Solr-style backend
//! queries and backend responses back into results:
//!
//! - **Query model**: free text, raw filter queries, attribute and facet
//!   filters, sort fields, paging and result projection
//! - **Facets**: per-scope facet definitions served from a TTL cache with
//!   single-flight refresh
//! - **Results**: documents and facet counts adapted lazily on first access
//! - **Publishing**: asynchronous batch indexing with commit control,
//!   cancellation and throughput metrics
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │               SearchService                      │
//! ├──────────────────────────────────────────────────┤
//! │  - create_query()   - find_by_query()            │
//! │  - find_by_id()     - find_by_ids()              │
//! │  - publish()        - commit() / optimize()      │
//! └──────────────────────────────────────────────────┘
//!        │                 │                  │
//!        ▼                 ▼                  ▼
//! ┌─────────────┐  ┌────────────────┐  ┌──────────────────┐
//! │ FacetCache  │  │ QueryTranslator│  │ DocumentPublisher│
//! │ FacetSource │  │ QueryResult    │  │ (tokio tasks)    │
//! └─────────────┘  └────────────────┘  └──────────────────┘
//!                          │                  │
//!                          ▼                  ▼
//! ┌──────────────────────────────────────────────────┐
//! │   SearchRepository (SolrRepository, in-memory)   │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use facet_search::metrics::InMemoryMetricsSink;
//! use facet_search::search::{
//!     Facet, InMemoryRepository, PublishConfig, SearchConfigBuilder, SearchService,
//!     StaticFacetSource, Document,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let facets = StaticFacetSource::new();
//!     facets.put("/shop", Facet::new("color").with_name("Color"));
//!
//!     let search = SearchService::new(
//!         SearchConfigBuilder::new().scope("/shop").build(),
//!         PublishConfig::default(),
//!         Arc::new(facets),
//!         Arc::new(InMemoryRepository::new()),
//!         Arc::new(InMemoryMetricsSink::new()),
//!     )?;
//!
//!     search
//!         .publish(vec![Document::new().with_value("color", "blue")], true)?
//!         .wait()
//!         .await;
//!
//!     let result = search.find_by_query(&search.create_query()).await?;
//!     println!("Found {} documents", result.num_found());
//!
//!     Ok(())
//! }
//! ```

mod backend;
mod config;
mod conventions;
mod document;
mod error;
mod facet;
mod facet_cache;
mod memory;
mod publish;
mod query;
mod result;
mod service;
mod solr;
mod translator;

pub use backend::{
    BackendDocument, BackendQuery, BackendResponse, FacetCount, FacetField, QueryParser,
    SearchRepository, SortOrder,
};
pub use self::config::{
    CommitStrategy, PublishConfig, SearchConfig, SearchConfigBuilder, SolrConfig,
};
pub use conventions::{
    escape_query_chars, facet_attribute_id, facet_field_name, ATTRIBUTE_DESCRIPTION,
    ATTRIBUTE_ID, ATTRIBUTE_NAME, ATTRIBUTE_TITLE, ATTRIBUTE_URI_PATH, FACET_FIELD_SUFFIX,
};
pub use document::{AttributeType, AttributeValue, Document, DocumentAttribute};
pub use error::{SearchError, SearchResult};
pub use facet::{
    Facet, FacetDefinition, FacetMap, FacetQuery, FacetSource, FacetSourceError,
    SelectionStrategy, StaticFacetSource, TermCombination,
};
pub use facet_cache::{FacetCache, DEFAULT_REFRESH_INTERVAL};
pub use memory::InMemoryRepository;
pub use publish::{DocumentPublisher, PublishEvent, PublishHandle, PublishOutcome};
pub use query::{AttributeFilter, FacetFilter, FilterType, Query, ResultProjection, SortDirection};
pub use result::{QueryResult, ResultFacet, ResultFacetValue};
pub use service::SearchService;
pub use solr::SolrRepository;
pub use translator::QueryTranslator;
