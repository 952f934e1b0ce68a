//! Criterion benchmarks for query translation and result adaptation
//!
//! These benchmarks measure:
//! - Translation of a plain query
//! - Translation with facet filters over a growing facet model
//! - Lazy facet building on a backend response

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use facet_search::metrics::NoopMetricsSink;
use facet_search::search::{
    BackendResponse, Facet, FacetCount, FacetField, FacetFilter, FacetMap, InMemoryRepository,
    PublishConfig, QueryResult, QueryTranslator, SearchConfig, SearchService, SelectionStrategy,
    StaticFacetSource,
};
use std::sync::Arc;

fn service() -> SearchService {
    SearchService::new(
        SearchConfig::default(),
        PublishConfig::default(),
        Arc::new(StaticFacetSource::new()),
        Arc::new(InMemoryRepository::new()),
        Arc::new(NoopMetricsSink),
    )
    .expect("valid configuration")
}

fn facet_model(size: usize) -> FacetMap {
    (0..size)
        .map(|i| {
            let facet = Facet::new(format!("attr{}", i))
                .with_selection_strategy(SelectionStrategy::Multi);
            (facet.attribute_id().to_string(), facet)
        })
        .collect()
}

fn bench_translate_plain(c: &mut Criterion) {
    let service = service();
    let translator = QueryTranslator::new(service.id(), false);
    let query = service.create_query().with_query("linen shirt");
    let facets = FacetMap::new();

    c.bench_function("translate_plain", |b| {
        b.iter(|| translator.translate(black_box(&query), &facets))
    });
}

fn bench_translate_faceted(c: &mut Criterion) {
    let service = service();
    let translator = QueryTranslator::new(service.id(), false);
    let mut group = c.benchmark_group("translate_faceted");

    for size in [1, 10, 50] {
        let facets = facet_model(size);
        let query = facets.values().fold(service.create_query(), |q, facet| {
            q.with_facet_filter(FacetFilter::new(facet.clone()).with_values(["a", "b"]))
        });

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| translator.translate(black_box(&query), &facets))
        });
    }

    group.finish();
}

fn bench_result_facets(c: &mut Criterion) {
    let facets = Arc::new(facet_model(10));
    let response = BackendResponse {
        num_found: 1000,
        facet_fields: (0..10)
            .map(|i| FacetField {
                name: format!("{{!ex=attr{}}}attr{}_facet", i, i),
                values: (0..100)
                    .map(|v| FacetCount {
                        name: format!("value{}", v),
                        count: v,
                    })
                    .collect(),
            })
            .collect(),
        ..BackendResponse::default()
    };

    c.bench_function("result_facets", |b| {
        b.iter(|| {
            let result = QueryResult::new(response.clone(), facets.clone());
            black_box(result.facets().len())
        })
    });
}

criterion_group!(
    benches,
    bench_translate_plain,
    bench_translate_faceted,
    bench_result_facets
);
criterion_main!(benches);
