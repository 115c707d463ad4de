use crate::{ArchiverError, Lease};
use alloy_primitives::B256;
use blob_archiver_beacon_types::BlockHeader;
use blob_archiver_storage::{BackfillProcess, BackfillProcesses, DataStore, StorageError};
use tokio::sync::{Mutex, Notify};
use tracing::{debug, info};

/// Tracks the historical walks in progress and persists their progress.
///
/// The index of walks is kept in memory and written to the archive after every change. All
/// changes go through one async mutex that stays locked across the write, and a change is only
/// applied in memory once the write succeeded. While a write is in flight the in-memory index is
/// marked stale, so after a failed or cancelled write the next operation reads the index back
/// from the archive, whether or not the write reached it.
///
/// The in-memory index is reloaded from the archive whenever the lease was (re)acquired since it
/// was last read, so progress made by another instance in between is not overwritten.
#[derive(Debug)]
pub struct BackfillTracker<S> {
    store: S,
    state: Mutex<TrackerState>,
    added: Notify,
}

#[derive(Debug, Default)]
struct TrackerState {
    processes: BackfillProcesses,
    /// Lease generation the index was read in, `None` if it has to be read again.
    generation: Option<u64>,
}

impl<S: DataStore> BackfillTracker<S> {
    /// Creates a tracker that reads the index from `store` on first use.
    pub fn new(store: S) -> Self {
        Self { store, state: Mutex::new(TrackerState::default()), added: Notify::new() }
    }

    /// Creates a tracker populated with the index currently persisted in `store`.
    pub async fn load(store: S) -> Result<Self, StorageError> {
        let processes = store.read_backfill_processes().await?;
        debug!(target: "archiver::backfill", count = processes.len(), "Loaded backfill processes");
        let tracker = Self::new(store);
        tracker.state.lock().await.processes = processes;
        Ok(tracker)
    }

    /// Persists `next` and makes it the in-memory index.
    ///
    /// If the write fails or the future is dropped halfway, the index stays marked stale.
    async fn commit(
        &self,
        state: &mut TrackerState,
        next: BackfillProcesses,
    ) -> Result<(), StorageError> {
        let generation = state.generation.take();
        self.store.write_backfill_processes(&next).await?;
        state.processes = next;
        state.generation = generation;
        Ok(())
    }

    /// Re-reads the index if the lease changed hands since it was last read.
    async fn sync(&self, state: &mut TrackerState, lease: &Lease) -> Result<(), StorageError> {
        let generation = lease.generation();
        if state.generation != Some(generation) {
            state.processes = self.store.read_backfill_processes().await?;
            state.generation = Some(generation);
            debug!(target: "archiver::backfill", count = state.processes.len(), generation, "Reloaded backfill processes");
        }
        Ok(())
    }

    /// Returns a copy of the walks in progress.
    pub async fn processes(&self, lease: &Lease) -> Result<BackfillProcesses, StorageError> {
        let mut state = self.state.lock().await;
        self.sync(&mut state, lease).await?;
        Ok(state.processes.clone())
    }

    /// Returns the walk starting at `start`, registering and persisting a new one if there is
    /// none yet.
    pub async fn start_or_resume(
        &self,
        lease: &Lease,
        start: BlockHeader,
    ) -> Result<BackfillProcess, ArchiverError> {
        let mut state = self.state.lock().await;
        self.sync(&mut state, lease).await?;
        if let Some(existing) = state.processes.get(&start.root) {
            debug!(target: "archiver::backfill", start = %start.root, current = %existing.current_block.root, "Resuming backfill");
            return Ok(existing.clone())
        }

        lease.ensure_held()?;
        let process = BackfillProcess::new(start);
        let mut next = state.processes.clone();
        next.insert(process.start_hash(), process.clone());
        self.commit(&mut state, next).await?;
        drop(state);

        info!(
            target: "archiver::backfill",
            start = %process.start_hash(),
            slot = process.start_block.slot(),
            "Started backfill"
        );
        self.added.notify_one();
        Ok(process)
    }

    /// Moves the frontier of the walk starting at `start_hash` to `current` and persists it.
    pub async fn advance(
        &self,
        lease: &Lease,
        start_hash: B256,
        current: BlockHeader,
    ) -> Result<(), ArchiverError> {
        let mut state = self.state.lock().await;
        self.sync(&mut state, lease).await?;
        lease.ensure_held()?;

        let mut next = state.processes.clone();
        let process = next.get_mut(&start_hash).ok_or(ArchiverError::UnknownBackfill(start_hash))?;
        process.current_block = current;
        self.commit(&mut state, next).await?;
        Ok(())
    }

    /// Removes the walk starting at `start_hash` and persists the index.
    ///
    /// Completing an unknown walk is a no-op.
    pub async fn complete(&self, lease: &Lease, start_hash: B256) -> Result<(), ArchiverError> {
        let mut state = self.state.lock().await;
        self.sync(&mut state, lease).await?;
        if !state.processes.contains_key(&start_hash) {
            return Ok(())
        }
        lease.ensure_held()?;

        let mut next = state.processes.clone();
        next.remove(&start_hash);
        self.commit(&mut state, next).await?;
        info!(target: "archiver::backfill", start = %start_hash, remaining = state.processes.len(), "Completed backfill");
        Ok(())
    }

    /// Resolves once a walk was registered after the previous call.
    pub async fn added(&self) {
        self.added.notified().await
    }
}
