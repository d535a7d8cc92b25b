//! Fetch lifecycle and snapshot ownership.
//!
//! At most one fetch runs at a time. Each fetch records the generation it
//! was launched under; a chain switch bumps the generation so a slower
//! fetch for the previous chain is discarded instead of committed.

use crate::codec::{self, CodecError};
use crate::models::{ChainId, Snapshot};
use crate::source::{SourceAdapter, SourceError};
use crate::storage::KeyValueStore;
use crate::sync::persisted;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Failures of a single refresh.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("fetch failed: {0}")]
    Source(#[from] SourceError),

    #[error("malformed vault payload: {0}")]
    Codec(#[from] CodecError),

    #[error("refresh task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Controller lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// Nothing fetched yet in this process.
    Idle,
    Fetching,
    Committed,
}

/// How a finished fetch was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    Committed { generation: u64, vaults: usize },
    /// The context changed while fetching; the result was dropped.
    Stale { generation: u64, current: u64 },
}

pub type RefreshHandle = JoinHandle<Result<RefreshOutcome, SyncError>>;

struct Inner {
    chain_id: ChainId,
    generation: u64,
    /// Generation of the fetch that holds the busy flag.
    in_flight: Option<u64>,
    snapshot: Arc<Snapshot>,
    committed: bool,
}

/// Owner of the committed snapshot and the fetch lifecycle.
#[derive(Clone)]
pub struct WatchController {
    source: Arc<dyn SourceAdapter>,
    store: Arc<dyn KeyValueStore>,
    inner: Arc<Mutex<Inner>>,
}

impl WatchController {
    /// Create a controller seeded with the persisted snapshot.
    pub fn new(source: Arc<dyn SourceAdapter>, store: Arc<dyn KeyValueStore>, chain_id: ChainId) -> Self {
        let snapshot = persisted::load_snapshot(store.as_ref());
        debug!(
            vaults = snapshot.vaults.len(),
            last_update = snapshot.last_update,
            "Loaded persisted snapshot"
        );

        Self {
            source,
            store,
            inner: Arc::new(Mutex::new(Inner {
                chain_id,
                generation: 0,
                in_flight: None,
                snapshot: Arc::new(snapshot),
                committed: false,
            })),
        }
    }

    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        self.inner.lock().snapshot.clone()
    }

    pub fn is_updating(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }

    pub fn state(&self) -> SyncState {
        let inner = self.inner.lock();
        if inner.in_flight.is_some() {
            SyncState::Fetching
        } else if inner.committed {
            SyncState::Committed
        } else {
            SyncState::Idle
        }
    }

    pub fn chain_id(&self) -> ChainId {
        self.inner.lock().chain_id
    }

    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Startup fetch; served from source caches where possible.
    pub fn start(&self, chain_id: ChainId) -> Option<RefreshHandle> {
        self.refresh(chain_id, false)
    }

    /// User-requested refresh of the active chain.
    pub fn update(&self) -> Option<RefreshHandle> {
        let chain_id = self.chain_id();
        self.refresh(chain_id, true)
    }

    /// Switch the active chain, abandoning any fetch for the previous one.
    pub fn set_chain(&self, chain_id: ChainId) -> Option<RefreshHandle> {
        {
            let mut inner = self.inner.lock();
            if let Some(stale) = inner.in_flight.take() {
                inner.generation += 1;
                info!(
                    stale,
                    generation = inner.generation,
                    "Chain changed to {} during fetch; previous result will be discarded",
                    chain_id
                );
            }
            inner.chain_id = chain_id;
        }
        self.refresh(chain_id, false)
    }

    /// Launch a fetch unless one is already running.
    ///
    /// Must be called within a tokio runtime. Returns `None` when a fetch is
    /// already in flight.
    pub fn refresh(&self, chain_id: ChainId, force_revalidate: bool) -> Option<RefreshHandle> {
        let generation = {
            let mut inner = self.inner.lock();
            if inner.in_flight.is_some() {
                debug!("Refresh requested while fetching; ignored");
                return None;
            }
            inner.chain_id = chain_id;
            inner.in_flight = Some(inner.generation);
            inner.generation
        };

        info!(
            generation,
            source = self.source.kind(),
            "Refreshing vaults for chain {} (revalidate: {})",
            chain_id,
            force_revalidate
        );
        let controller = self.clone();
        Some(tokio::spawn(async move {
            controller.run_fetch(chain_id, force_revalidate, generation).await
        }))
    }

    async fn run_fetch(
        &self,
        chain_id: ChainId,
        force_revalidate: bool,
        generation: u64,
    ) -> Result<RefreshOutcome, SyncError> {
        let started = Instant::now();
        let result = self.source.fetch(chain_id, force_revalidate).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut inner = self.inner.lock();
        if inner.in_flight == Some(generation) {
            inner.in_flight = None;
        }
        if inner.generation != generation {
            info!(
                generation,
                current = inner.generation,
                elapsed_ms,
                "Discarding stale fetch for chain {}",
                chain_id
            );
            return Ok(RefreshOutcome::Stale {
                generation,
                current: inner.generation,
            });
        }

        let raw = result.map_err(|e| {
            warn!(generation, elapsed_ms, "Fetch for chain {} failed: {}", chain_id, e);
            SyncError::from(e)
        })?;
        let vaults = codec::revive_vaults(raw.vaults).map_err(|e| {
            warn!(generation, "Rejecting malformed payload for chain {}: {}", chain_id, e);
            SyncError::from(e)
        })?;

        let snapshot = Snapshot {
            vaults,
            last_update: raw.access.unwrap_or_else(|| Utc::now().timestamp_millis()),
            network: raw.network,
        };
        if let Err(e) = persisted::save_snapshot(self.store.as_ref(), &snapshot) {
            warn!("Failed to persist snapshot: {}", e);
        }

        let count = snapshot.vaults.len();
        inner.snapshot = Arc::new(snapshot);
        inner.committed = true;
        info!(generation, elapsed_ms, vaults = count, "Committed snapshot for chain {}", chain_id);

        Ok(RefreshOutcome::Committed {
            generation,
            vaults: count,
        })
    }
}

/// Await a refresh handle, if any.
pub async fn wait_idle(handle: Option<RefreshHandle>) -> Result<Option<RefreshOutcome>, SyncError> {
    match handle {
        Some(handle) => handle.await?.map(Some),
        None => Ok(None),
    }
}
