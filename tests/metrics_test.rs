//! Prometheus export of engine throughput metrics

mod common;

use common::{parse_prometheus_output, product, SCOPE};
use facet_search::metrics::{metric_set_id, MetricsConfig, PrometheusMetricsSink};
use facet_search::search::{
    Facet, InMemoryRepository, PublishConfig, SearchConfigBuilder, SearchService,
    StaticFacetSource,
};
use std::sync::Arc;

#[tokio::test]
async fn test_engine_operations_are_exported() {
    let sink = Arc::new(
        PrometheusMetricsSink::new(&metric_set_id(SCOPE), &MetricsConfig::default()).unwrap(),
    );
    let facets = StaticFacetSource::new();
    facets.put(SCOPE, Facet::new("color"));
    let service = SearchService::new(
        SearchConfigBuilder::new().scope(SCOPE).build(),
        PublishConfig::default(),
        Arc::new(facets),
        Arc::new(InMemoryRepository::new()),
        sink.clone(),
    )
    .unwrap();

    service
        .publish(vec![product("1", "Shirt", "blue"), product("2", "Scarf", "red")], true)
        .unwrap()
        .wait()
        .await;
    service.find_by_query(&service.create_query()).await.unwrap();
    service.find_by_id("1").await.unwrap();

    let output = sink.gather();
    let metrics = parse_prometheus_output(&output);

    let started = &metrics["facet_search_requests_started_total"];
    for operation in ["docs_published", "query", "docs_retrieved_by_id"] {
        assert!(
            started.iter().any(|l| l.contains(&format!("operation=\"{}\"", operation))),
            "missing {} in {:?}",
            operation,
            started
        );
    }

    let items = &metrics["facet_search_items_processed_total"];
    assert!(items
        .iter()
        .any(|l| l.contains("operation=\"docs_published\"") && l.ends_with(" 2")));
    assert!(output.contains("metric_set=\"facet_search.documents[/shop]\""));
    assert!(metrics.contains_key("facet_search_request_duration_seconds_bucket"));
}

#[test]
fn test_sinks_for_different_scopes_do_not_collide() {
    let config = MetricsConfig::default();
    let shop = PrometheusMetricsSink::new(&metric_set_id("/shop"), &config);
    let blog = PrometheusMetricsSink::new(&metric_set_id("/blog"), &config);
    assert!(shop.is_ok());
    assert!(blog.is_ok());
}
