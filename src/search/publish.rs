//! Asynchronous document publish pipeline

use crate::metrics::{Operation, ThroughputRecorder};
use crate::search::backend::SearchRepository;
use crate::search::config::{CommitStrategy, PublishConfig};
use crate::search::document::Document;
use crate::search::error::{SearchError, SearchResult};
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::task::JoinError;
use tokio::sync::{broadcast, oneshot, Notify, Semaphore};
use tracing::{debug, error, info};
use uuid::Uuid;

const STATUS_CHANNEL_CAPACITY: usize = 256;

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Final state of a publish job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Completed { documents: usize, elapsed: Duration },
    Failed { error: String },
    Cancelled,
}

impl PublishOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, PublishOutcome::Completed { .. })
    }
}

/// Status channel message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishEvent {
    pub job_id: Uuid,
    pub outcome: PublishOutcome,
}

/// Handle to one scheduled publish job
#[derive(Debug)]
pub struct PublishHandle {
    job_id: Uuid,
    document_ids: Vec<String>,
    state: Arc<AtomicU8>,
    outcome: oneshot::Receiver<PublishOutcome>,
}

impl PublishHandle {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Ids of the published documents, including assigned ones
    pub fn document_ids(&self) -> &[String] {
        &self.document_ids
    }

    /// Cancel the job; only succeeds before it starts running
    pub fn cancel(&self) -> bool {
        self.state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Wait for the job to complete, fail or be cancelled
    pub async fn wait(self) -> PublishOutcome {
        // A dropped sender means the task was torn down with the runtime
        self.outcome.await.unwrap_or(PublishOutcome::Cancelled)
    }
}

struct Inner {
    repository: Arc<dyn SearchRepository>,
    recorder: ThroughputRecorder,
    config: PublishConfig,
    permits: Arc<Semaphore>,
    active: AtomicBool,
    commits_enabled: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    events: broadcast::Sender<PublishEvent>,
}

/// Schedules publish jobs on a bounded pool of tokio tasks
#[derive(Clone)]
pub struct DocumentPublisher {
    inner: Arc<Inner>,
}

impl DocumentPublisher {
    pub fn new(
        repository: Arc<dyn SearchRepository>,
        recorder: ThroughputRecorder,
        config: PublishConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let workers = config.workers.max(1);
        let commits_enabled = config.commits_enabled;
        Self {
            inner: Arc::new(Inner {
                repository,
                recorder,
                config,
                permits: Arc::new(Semaphore::new(workers)),
                active: AtomicBool::new(true),
                commits_enabled: AtomicBool::new(commits_enabled),
                in_flight: AtomicUsize::new(0),
                idle: Notify::new(),
                events,
            }),
        }
    }

    /// Schedule a publish job and return immediately.
    ///
    /// Documents without an id get a fresh UUID before scheduling. With
    /// `commit` the job commits after adding, unless commits are disabled.
    pub fn publish<I>(&self, documents: I, commit: bool) -> SearchResult<PublishHandle>
    where
        I: IntoIterator<Item = Document>,
    {
        if !self.is_active() {
            return Err(SearchError::Unavailable(
                "document publisher is shut down".to_string(),
            ));
        }
        let runtime = Handle::try_current()
            .map_err(|e| SearchError::Unavailable(format!("no async runtime: {}", e)))?;

        let mut documents: Vec<Document> = documents.into_iter().collect();
        let document_ids = documents
            .iter_mut()
            .map(|doc| match doc.id() {
                Some(id) => id.to_string(),
                None => {
                    let id = Uuid::new_v4().to_string();
                    doc.set_id(id.clone());
                    id
                }
            })
            .collect();

        let job_id = Uuid::new_v4();
        let state = Arc::new(AtomicU8::new(PENDING));
        let (tx, rx) = oneshot::channel();

        self.inner.in_flight.fetch_add(1, Ordering::AcqRel);
        debug!(job_id = %job_id, documents = documents.len(), commit, "Scheduled publish job");

        let inner = self.inner.clone();
        let job_state = state.clone();
        runtime.spawn(async move {
            let _slot = JobSlot(inner.clone());
            let job = {
                let inner = inner.clone();
                tokio::spawn(async move {
                    inner.execute(job_id, &job_state, documents, commit).await
                })
            };
            let outcome = match job.await {
                Ok(outcome) => outcome,
                Err(e) if e.is_panic() => {
                    let message = panic_message(e);
                    error!(job_id = %job_id, error = %message, "Publish job panicked");
                    PublishOutcome::Failed {
                        error: format!("publish job panicked: {}", message),
                    }
                }
                Err(_) => PublishOutcome::Cancelled,
            };
            inner.complete(job_id, outcome, tx);
        });

        Ok(PublishHandle {
            job_id,
            document_ids,
            state,
            outcome: rx,
        })
    }

    /// Receive the outcome of every job finishing after this call
    pub fn subscribe(&self) -> broadcast::Receiver<PublishEvent> {
        self.inner.events.subscribe()
    }

    /// Wait until no scheduled job is left
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Number of scheduled or running jobs
    pub fn pending_jobs(&self) -> usize {
        self.inner.in_flight.load(Ordering::Acquire)
    }

    /// Set the commits toggle and return its previous value
    pub fn set_commits_enabled(&self, enabled: bool) -> bool {
        self.inner.commits_enabled.swap(enabled, Ordering::AcqRel)
    }

    pub fn commits_enabled(&self) -> bool {
        self.inner.commits_enabled.load(Ordering::Acquire)
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// Deactivate the pipeline; jobs that have not started end as cancelled
    pub fn shutdown(&self) {
        if self.inner.active.swap(false, Ordering::AcqRel) {
            info!(pending = self.pending_jobs(), "Document publisher shut down");
        }
    }
}

impl std::fmt::Debug for DocumentPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentPublisher")
            .field("active", &self.is_active())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

impl Inner {
    async fn execute(
        &self,
        job_id: Uuid,
        state: &AtomicU8,
        documents: Vec<Document>,
        commit: bool,
    ) -> PublishOutcome {
        let _permit = match self.permits.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return PublishOutcome::Cancelled,
        };

        if state
            .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!(job_id = %job_id, "Publish job cancelled before start");
            return PublishOutcome::Cancelled;
        }
        if !self.active.load(Ordering::Acquire) {
            debug!(job_id = %job_id, "Publisher inactive, publish job cancelled");
            return PublishOutcome::Cancelled;
        }

        let in_flight = self.recorder.start(Operation::DocsPublished);
        let started = Instant::now();

        match self.submit(&documents, commit).await {
            Ok(()) => {
                let elapsed = started.elapsed();
                in_flight.finished(documents.len() as u64);
                info!(
                    job_id = %job_id,
                    documents = documents.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Published documents"
                );
                PublishOutcome::Completed {
                    documents: documents.len(),
                    elapsed,
                }
            }
            Err(e) => {
                in_flight.failed();
                error!(
                    job_id = %job_id,
                    documents = documents.len(),
                    error = %e,
                    "Error while submitting documents to the search backend"
                );
                PublishOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    async fn submit(&self, documents: &[Document], commit: bool) -> SearchResult<()> {
        let commit = commit && self.commits_enabled.load(Ordering::Acquire);
        match (commit, self.config.commit_strategy) {
            (false, _) => self.repository.add(documents).await,
            (true, CommitStrategy::Explicit) => {
                self.repository.add(documents).await?;
                self.repository.commit().await
            }
            (true, CommitStrategy::Within) => {
                self.repository
                    .add_with_commit_within(documents, self.config.commit_within())
                    .await
            }
        }
    }

    fn complete(
        &self,
        job_id: Uuid,
        outcome: PublishOutcome,
        tx: oneshot::Sender<PublishOutcome>,
    ) {
        // Nobody subscribed or the handle was dropped: both are fine
        let _ = self.events.send(PublishEvent {
            job_id,
            outcome: outcome.clone(),
        });
        let _ = tx.send(outcome);
    }
}

/// Counts a scheduled job until its task ends, however it ends
struct JobSlot(Arc<Inner>);

impl Drop for JobSlot {
    fn drop(&mut self) {
        if self.0.in_flight.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.idle.notify_waiters();
        }
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}
