//! Integration tests for the document publish pipeline

mod common;

use common::{engine, engine_with, product};
use facet_search::metrics::Operation;
use facet_search::search::{CommitStrategy, PublishConfig, PublishOutcome};

#[tokio::test]
async fn test_uncommitted_documents_become_visible_on_commit() {
    let engine = engine();
    let outcome = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], false)
        .unwrap()
        .wait()
        .await;
    assert!(outcome.is_completed());

    assert!(engine.service.find_by_id("1").await.unwrap().is_none());
    assert_eq!(engine.repository.pending_len(), 1);

    engine.service.commit().await.unwrap();
    assert!(engine.service.find_by_id("1").await.unwrap().is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn test_cancel_before_start() {
    let engine = engine();
    let handle = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap();

    // The job cannot start before this task yields
    assert!(handle.cancel());
    assert_eq!(handle.wait().await, PublishOutcome::Cancelled);

    assert_eq!(engine.repository.add_count(), 0);
    assert_eq!(engine.metrics.snapshot(Operation::DocsPublished).started, 0);
}

#[tokio::test]
async fn test_cancel_after_completion_fails() {
    let engine = engine();
    let handle = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap();
    engine.service.publisher().wait_idle().await;

    assert!(!handle.cancel());
    assert!(handle.wait().await.is_completed());
}

#[tokio::test(flavor = "current_thread")]
async fn test_shutdown_cancels_jobs_not_yet_started() {
    let engine = engine();
    let handle = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap();

    engine.service.shutdown();
    assert_eq!(handle.wait().await, PublishOutcome::Cancelled);

    let stats = engine.metrics.snapshot(Operation::DocsPublished);
    assert_eq!(stats.started, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(engine.repository.add_count(), 0);
    assert!(engine
        .service
        .publish(vec![product("2", "Scarf", "red")], true)
        .is_err());
}

#[tokio::test]
async fn test_failed_job_is_reported_on_status_channel() {
    let engine = engine();
    let mut events = engine.service.publisher().subscribe();
    engine
        .repository
        .fail_with(Some("HTTP 500 from backend".to_string()));

    let handle = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap();
    let job_id = handle.job_id();
    engine.service.publisher().wait_idle().await;

    let event = events.recv().await.unwrap();
    assert_eq!(event.job_id, job_id);
    assert!(matches!(event.outcome, PublishOutcome::Failed { .. }));

    let stats = engine.metrics.snapshot(Operation::DocsPublished);
    assert_eq!(stats.started, 1);
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.in_flight(), 0);
}

#[tokio::test]
async fn test_concurrent_jobs_all_complete() {
    let engine = engine_with(PublishConfig {
        workers: 2,
        ..Default::default()
    });

    let handles: Vec<_> = (0..8)
        .map(|i| {
            engine
                .service
                .publish(vec![product(&i.to_string(), "Item", "blue")], true)
                .unwrap()
        })
        .collect();
    engine.service.publisher().wait_idle().await;

    assert_eq!(engine.service.publisher().pending_jobs(), 0);
    for handle in handles {
        assert!(handle.wait().await.is_completed());
    }
    assert_eq!(engine.repository.committed_len(), 8);

    let stats = engine.metrics.snapshot(Operation::DocsPublished);
    assert_eq!(stats.finished, 8);
    assert_eq!(stats.items, 8);
}

#[tokio::test]
async fn test_commit_within_strategy() {
    let engine = engine_with(PublishConfig {
        commit_strategy: CommitStrategy::Within,
        ..Default::default()
    });

    let outcome = engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap()
        .wait()
        .await;

    assert!(outcome.is_completed());
    assert_eq!(engine.repository.commit_count(), 1);
    assert!(engine.service.find_by_id("1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_disabled_commits_leave_documents_pending() {
    let engine = engine();
    assert!(engine.service.set_commits_enabled(false));

    engine
        .service
        .publish(vec![product("1", "Shirt", "blue")], true)
        .unwrap()
        .wait()
        .await;

    assert_eq!(engine.repository.commit_count(), 0);
    assert_eq!(engine.repository.pending_len(), 1);
}
