//! Common fixtures for integration tests

#![allow(dead_code)]

use facet_search::metrics::InMemoryMetricsSink;
use facet_search::search::{
    Document, Facet, InMemoryRepository, PublishConfig, SearchConfigBuilder, SearchService,
    SelectionStrategy, StaticFacetSource,
};
use std::collections::HashMap;
use std::sync::Arc;

pub const SCOPE: &str = "/shop";

pub struct TestEngine {
    pub service: SearchService,
    pub repository: Arc<InMemoryRepository>,
    pub metrics: Arc<InMemoryMetricsSink>,
    pub facets: StaticFacetSource,
}

/// Engine over an in-memory repository with a single-select `color` facet
pub fn engine() -> TestEngine {
    engine_with(PublishConfig::default())
}

pub fn engine_with(publish: PublishConfig) -> TestEngine {
    let facets = StaticFacetSource::new();
    facets.put(SCOPE, Facet::new("color").with_name("Color"));

    let repository = Arc::new(InMemoryRepository::new());
    let metrics = Arc::new(InMemoryMetricsSink::new());
    let service = SearchService::new(
        SearchConfigBuilder::new().scope(SCOPE).build(),
        publish,
        Arc::new(facets.clone()),
        repository.clone(),
        metrics.clone(),
    )
    .expect("valid engine configuration");

    TestEngine {
        service,
        repository,
        metrics,
        facets,
    }
}

/// Make `color` a multi-select facet
pub fn multi_select_color(engine: &TestEngine) {
    engine.facets.put(
        SCOPE,
        Facet::new("color")
            .with_name("Color")
            .with_selection_strategy(SelectionStrategy::Multi),
    );
}

pub fn product(id: &str, name: &str, color: &str) -> Document {
    Document::new()
        .with_id(id)
        .with_name(name)
        .with_value("color", color)
}

/// Publish and commit, waiting for the job to finish
pub async fn index(engine: &TestEngine, documents: Vec<Document>) {
    let outcome = engine
        .service
        .publish(documents, true)
        .expect("publisher accepts jobs")
        .wait()
        .await;
    assert!(outcome.is_completed(), "publish failed: {:?}", outcome);
}

/// Parse Prometheus exposition text into metric name -> sample lines
pub fn parse_prometheus_output(output: &str) -> HashMap<String, Vec<String>> {
    let mut metrics: HashMap<String, Vec<String>> = HashMap::new();

    for line in output.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let name_end = line.find(|c: char| c == '{' || c == ' ').unwrap_or(line.len());
        metrics
            .entry(line[..name_end].to_string())
            .or_default()
            .push(line.to_string());
    }

    metrics
}
