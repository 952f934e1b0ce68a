//! Main search service implementation

use crate::config::Config;
use crate::metrics::{MetricsSink, Operation, ThroughputRecorder};
use crate::search::backend::{BackendQuery, QueryParser, SearchRepository};
use crate::search::config::{PublishConfig, SearchConfig};
use crate::search::conventions::{escape_query_chars, ATTRIBUTE_ID};
use crate::search::document::Document;
use crate::search::error::{SearchError, SearchResult};
use crate::search::facet::{FacetMap, FacetSource, StaticFacetSource};
use crate::search::facet_cache::FacetCache;
use crate::search::publish::{DocumentPublisher, PublishHandle};
use crate::search::query::Query;
use crate::search::result::QueryResult;
use crate::search::solr::SolrRepository;
use crate::search::translator::{QueryTranslator, ALL_FIELDS};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Main search service
///
/// Owns the facet cache, the translator and the publish pipeline for one
/// query scope. Collaborators are injected: the facet source, the
/// repository handle and the metrics sink.
pub struct SearchService {
    /// Identity stamped on every query this service creates
    id: Uuid,

    config: SearchConfig,
    facet_cache: FacetCache,
    translator: QueryTranslator,
    repository: Arc<dyn SearchRepository>,
    recorder: ThroughputRecorder,
    publisher: DocumentPublisher,
}

impl SearchService {
    /// Create a new search service
    pub fn new(
        config: SearchConfig,
        publish_config: PublishConfig,
        facet_source: Arc<dyn FacetSource>,
        repository: Arc<dyn SearchRepository>,
        metrics: Arc<dyn MetricsSink>,
    ) -> SearchResult<Self> {
        config.validate()?;
        publish_config.validate()?;

        let id = Uuid::new_v4();
        let recorder = ThroughputRecorder::new(metrics);
        let publisher =
            DocumentPublisher::new(repository.clone(), recorder.clone(), publish_config);

        info!(service_id = %id, scope = %config.scope, "Search service created");

        Ok(Self {
            id,
            facet_cache: FacetCache::new(facet_source, config.facet_refresh_interval()),
            translator: QueryTranslator::new(id, config.debug),
            config,
            repository,
            recorder,
            publisher,
        })
    }

    /// Wire a Solr-backed service with the configured static facets
    pub fn from_config(config: &Config, metrics: Arc<dyn MetricsSink>) -> SearchResult<Self> {
        let facets = StaticFacetSource::from_definitions(
            config.search.scope.clone(),
            config.facets.iter().cloned(),
        );
        let repository = SolrRepository::new(&config.solr)?;

        Self::new(
            config.search.clone(),
            config.publish.clone(),
            Arc::new(facets),
            Arc::new(repository),
            metrics,
        )
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Create an empty query bound to this service
    pub fn create_query(&self) -> Query {
        Query::new(self.id).with_max_results(self.config.default_max_results)
    }

    /// Execute a query created by [`create_query`](Self::create_query)
    pub async fn find_by_query(&self, query: &Query) -> SearchResult<QueryResult> {
        // Reject before touching the facet source or the backend
        self.translator.translate(query, &FacetMap::new())?;

        let facets = self.facet_cache.get_facets(&self.config.scope).await;
        let backend_query = self.translator.translate(query, &facets)?;

        let in_flight = self.recorder.start(Operation::Query);
        match self.repository.query(&backend_query).await {
            Ok(response) => {
                debug!(
                    scope = %self.config.scope,
                    num_found = response.num_found,
                    q_time_ms = response.q_time,
                    "Query executed"
                );
                in_flight.finished(response.docs.len() as u64);
                Ok(QueryResult::new(response, facets))
            }
            Err(e) => {
                in_flight.failed();
                Err(e)
            }
        }
    }

    /// Look up a single document; `Ok(None)` when it does not exist
    pub async fn find_by_id(&self, id: &str) -> SearchResult<Option<Document>> {
        if id.trim().is_empty() {
            return Err(SearchError::InvalidArgument("id must not be blank".to_string()));
        }
        let query = format!("{}:{}", ATTRIBUTE_ID, escape_query_chars(id));
        let mut documents = self.lookup(query, 1).await?;
        Ok(documents.pop())
    }

    /// Look up documents by id; missing ids are left out of the map
    pub async fn find_by_ids<S: AsRef<str>>(
        &self,
        ids: &[S],
    ) -> SearchResult<HashMap<String, Document>> {
        if ids.is_empty() {
            return Err(SearchError::InvalidArgument("ids list is empty".to_string()));
        }
        if ids.iter().any(|id| id.as_ref().trim().is_empty()) {
            return Err(SearchError::InvalidArgument(
                "unsupported blank id found in ids list".to_string(),
            ));
        }

        let terms = ids
            .iter()
            .map(|id| escape_query_chars(id.as_ref()))
            .collect::<Vec<_>>()
            .join(" OR ");
        let query = format!("{}:({})", ATTRIBUTE_ID, terms);

        let documents = self.lookup(query, ids.len()).await?;
        Ok(documents
            .into_iter()
            .filter_map(|doc| doc.id().map(str::to_string).map(|id| (id, doc)))
            .collect())
    }

    async fn lookup(&self, query: String, count: usize) -> SearchResult<Vec<Document>> {
        let backend_query = BackendQuery {
            query: Some(query),
            parser: QueryParser::Standard,
            start: 0,
            rows: count as u64,
            fields: Some(ALL_FIELDS.to_string()),
            ..BackendQuery::default()
        };

        let in_flight = self.recorder.start(Operation::DocsRetrievedById);
        match self.repository.query(&backend_query).await {
            Ok(response) => {
                in_flight.finished(count as u64);
                Ok(response
                    .docs
                    .iter()
                    .map(Document::from_backend_fields)
                    .collect())
            }
            Err(e) => {
                in_flight.failed();
                Err(e)
            }
        }
    }

    /// Schedule documents for indexing; see [`DocumentPublisher::publish`]
    pub fn publish<I>(&self, documents: I, commit: bool) -> SearchResult<PublishHandle>
    where
        I: IntoIterator<Item = Document>,
    {
        self.publisher.publish(documents, commit)
    }

    pub fn publisher(&self) -> &DocumentPublisher {
        &self.publisher
    }

    /// Set the commits toggle and return its previous value
    pub fn set_commits_enabled(&self, enabled: bool) -> bool {
        self.publisher.set_commits_enabled(enabled)
    }

    pub async fn commit(&self) -> SearchResult<()> {
        self.repository.commit().await
    }

    pub async fn optimize(&self) -> SearchResult<()> {
        self.repository.optimize().await
    }

    /// Active facets of this service's scope
    pub async fn facets(&self) -> Arc<FacetMap> {
        self.facet_cache.get_facets(&self.config.scope).await
    }

    /// Stop accepting publish jobs; pending jobs end as cancelled
    pub fn shutdown(&self) {
        self.publisher.shutdown();
    }
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("id", &self.id)
            .field("scope", &self.config.scope)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::InMemoryMetricsSink;
    use crate::search::config::SearchConfigBuilder;
    use crate::search::facet::Facet;
    use crate::search::memory::InMemoryRepository;

    struct Fixture {
        service: SearchService,
        repository: Arc<InMemoryRepository>,
        metrics: Arc<InMemoryMetricsSink>,
    }

    fn fixture() -> Fixture {
        let facets = StaticFacetSource::new();
        facets.put("/shop", Facet::new("color"));
        let repository = Arc::new(InMemoryRepository::new());
        let metrics = Arc::new(InMemoryMetricsSink::new());
        let service = SearchService::new(
            SearchConfigBuilder::new().scope("/shop").build(),
            PublishConfig::default(),
            Arc::new(facets),
            repository.clone(),
            metrics.clone(),
        )
        .unwrap();
        Fixture {
            service,
            repository,
            metrics,
        }
    }

    #[tokio::test]
    async fn test_create_query_uses_default_page_size() {
        let f = fixture();
        assert_eq!(f.service.create_query().max_results(), 10);
    }

    #[tokio::test]
    async fn test_foreign_query_rejected_before_io() {
        let f = fixture();
        let other = fixture();
        let query = other.service.create_query();

        let result = f.service.find_by_query(&query).await;
        assert!(matches!(result, Err(SearchError::InvalidQuery(_))));
        assert_eq!(f.metrics.snapshot(Operation::Query).started, 0);
    }

    #[tokio::test]
    async fn test_negative_max_results_rejected() {
        let f = fixture();
        let query = f.service.create_query().with_max_results(-1);
        assert!(matches!(
            f.service.find_by_query(&query).await,
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_ids_validation() {
        let f = fixture();
        let empty: [&str; 0] = [];
        assert!(matches!(
            f.service.find_by_ids(&empty).await,
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.service.find_by_ids(&["a", " "]).await,
            Err(SearchError::InvalidArgument(_))
        ));
        assert!(matches!(
            f.service.find_by_id("").await,
            Err(SearchError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn test_find_by_id_not_found_is_none() {
        let f = fixture();
        assert!(f.service.find_by_id("nope").await.unwrap().is_none());

        let stats = f.metrics.snapshot(Operation::DocsRetrievedById);
        assert_eq!(stats.finished, 1);
        assert_eq!(stats.items, 1);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let f = fixture();
        f.repository.fail_with(Some("connection refused".to_string()));

        let query = f.service.create_query();
        assert!(matches!(
            f.service.find_by_query(&query).await,
            Err(SearchError::Backend(_))
        ));
        assert_eq!(f.metrics.snapshot(Operation::Query).failed, 1);
    }

    #[tokio::test]
    async fn test_commit_passes_through() {
        let f = fixture();
        f.service.commit().await.unwrap();
        f.service.optimize().await.unwrap();
        assert_eq!(f.repository.commit_count(), 1);
    }
}
