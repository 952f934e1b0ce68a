//! TTL cache over the facet source with single-flight refresh

use crate::search::facet::{FacetMap, FacetSource};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Default refresh interval of a scope's facet snapshot
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Default)]
struct ScopeEntry {
    snapshot: RwLock<Arc<FacetMap>>,
    last_refresh: Mutex<Option<Instant>>,
    refreshing: AtomicBool,
    /// Bumped by `invalidate`; a refresh started under an older generation
    /// does not mark the entry fresh
    generation: AtomicU64,
}

impl ScopeEntry {
    fn is_stale(&self, interval: Duration) -> bool {
        match *self.last_refresh.lock() {
            Some(at) => at.elapsed() > interval,
            None => true,
        }
    }

    /// Claim the refresh slot; `None` if another caller holds it
    fn try_begin_refresh(&self) -> Option<RefreshGuard<'_>> {
        self.refreshing
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RefreshGuard(&self.refreshing))
    }

    fn current(&self) -> Arc<FacetMap> {
        self.snapshot.read().clone()
    }
}

/// Releases the refresh slot, also when the refreshing future is dropped
struct RefreshGuard<'a>(&'a AtomicBool);

impl Drop for RefreshGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Per-scope facet snapshots, refreshed at most once per interval.
///
/// Only one refresh per scope runs at a time. Callers that arrive while a
/// refresh is in flight get the last good snapshot immediately. Facet
/// source failures are logged and never reach the caller.
pub struct FacetCache {
    source: Arc<dyn FacetSource>,
    refresh_interval: Duration,
    scopes: DashMap<String, Arc<ScopeEntry>>,
}

impl FacetCache {
    pub fn new(source: Arc<dyn FacetSource>, refresh_interval: Duration) -> Self {
        Self {
            source,
            refresh_interval,
            scopes: DashMap::new(),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// Active facets of a scope, keyed by attribute id
    pub async fn get_facets(&self, scope: &str) -> Arc<FacetMap> {
        let entry = self
            .scopes
            .entry(scope.to_string())
            .or_default()
            .value()
            .clone();

        if entry.is_stale(self.refresh_interval) {
            if let Some(_guard) = entry.try_begin_refresh() {
                // Another caller may have refreshed between the check and the claim
                if entry.is_stale(self.refresh_interval) {
                    self.refresh(scope, &entry).await;
                }
            }
        }

        entry.current()
    }

    /// Force the next read of a scope to refresh
    pub fn invalidate(&self, scope: &str) {
        if let Some(entry) = self.scopes.get(scope) {
            let mut last_refresh = entry.last_refresh.lock();
            entry.generation.fetch_add(1, Ordering::AcqRel);
            *last_refresh = None;
        }
    }

    async fn refresh(&self, scope: &str, entry: &ScopeEntry) {
        let generation = entry.generation.load(Ordering::Acquire);
        let started = Instant::now();

        match self.source.get_facets(scope).await {
            Ok(Some(facets)) => {
                debug!(scope = %scope, facets = facets.len(), "Refreshed facet snapshot");
                *entry.snapshot.write() = Arc::new(facets);
            }
            Ok(None) => {
                debug!(scope = %scope, "No facet source configured for scope, facets disabled");
                *entry.snapshot.write() = Arc::new(FacetMap::new());
            }
            Err(e) => {
                warn!(scope = %scope, error = %e, "Facet refresh failed, serving stale facets");
            }
        }

        // Stamped on failure too, so a failing source is retried once per interval
        let mut last_refresh = entry.last_refresh.lock();
        if entry.generation.load(Ordering::Acquire) == generation {
            *last_refresh = Some(started);
        }
    }
}

impl std::fmt::Debug for FacetCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FacetCache")
            .field("refresh_interval", &self.refresh_interval)
            .field("scopes", &self.scopes.len())
            .finish()
    }
}
