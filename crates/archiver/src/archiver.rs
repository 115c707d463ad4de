//! The chain walker.

use crate::{
    or_cancelled, ArchiverConfig, ArchiverError, BackfillTracker, Lease, LockCoordinator,
};
use blob_archiver_beacon_client::BeaconClient;
use blob_archiver_beacon_types::{BlockHeader, BlockId};
use blob_archiver_storage::{BackfillProcess, BlobData, DataStore};
use futures::future::join_all;
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Error of [`Archiver::rearchive_range`], carrying the slot it stopped at.
#[derive(Debug, thiserror::Error)]
#[error("failed to rearchive slot {slot}: {source}")]
pub struct RearchiveError {
    /// The slot that could not be archived.
    pub slot: u64,
    /// Why.
    #[source]
    pub source: ArchiverError,
}

/// Archives the blob sidecars of a beacon chain.
///
/// The archiver follows the head of the chain and walks parent links back to the newest block
/// that is already archived, which also absorbs reorgs: the walk from a new branch stops at the
/// common ancestor. Gaps too long to close inline are registered as backfills that close them one
/// block per step and survive restarts.
///
/// Every write requires the [`Lease`]; an instance that does not hold it only reads.
#[derive(Debug)]
pub struct Archiver<B, S> {
    beacon: B,
    store: S,
    config: ArchiverConfig,
    archiver_id: String,
    lease: Lease,
    tracker: BackfillTracker<S>,
}

impl<B, S> Archiver<B, S>
where
    B: BeaconClient + 'static,
    S: DataStore + Clone + 'static,
{
    /// Creates an archiver. The lease is not held until [`Self::start`] or [`Self::acquire_lease`].
    pub fn new(beacon: B, store: S, config: ArchiverConfig) -> Self {
        let archiver_id =
            config.archiver_id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self {
            beacon,
            tracker: BackfillTracker::new(store.clone()),
            store,
            config,
            archiver_id,
            lease: Lease::default(),
        }
    }

    /// The id this instance records in the lockfile.
    pub fn archiver_id(&self) -> &str {
        &self.archiver_id
    }

    /// The lease gating writes.
    pub const fn lease(&self) -> &Lease {
        &self.lease
    }

    /// The backfill tracker.
    pub const fn tracker(&self) -> &BackfillTracker<S> {
        &self.tracker
    }

    /// The archive.
    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Returns a coordinator for this instance's lease.
    pub fn lock_coordinator(&self) -> LockCoordinator<S> {
        LockCoordinator::new(
            self.store.clone(),
            self.archiver_id.clone(),
            self.config.lock,
            self.lease.clone(),
        )
    }

    /// Waits for the lease and keeps renewing it in a background task until `cancel` fires.
    pub async fn acquire_lease(
        &self,
        cancel: &CancellationToken,
    ) -> Result<tokio::task::JoinHandle<()>, ArchiverError> {
        let mut lock = self.lock_coordinator();
        lock.wait_for_lease(cancel).await?;
        Ok(tokio::spawn(lock.run_heartbeat(cancel.clone())))
    }

    /// Archives the blobs of block `id` unless they are already stored.
    ///
    /// With `overwrite` the blobs are fetched and written even if they exist. Returns the header
    /// of the block and whether it was archived before.
    pub async fn persist_block(
        &self,
        id: BlockId,
        overwrite: bool,
    ) -> Result<(BlockHeader, bool), ArchiverError> {
        let header = self.beacon.beacon_block_header(id).await?;
        let existed = self.persist_header(&header, overwrite).await?;
        Ok((header, existed))
    }

    /// Archives the blobs of the block behind `header`, returning whether they were stored
    /// already.
    async fn persist_header(
        &self,
        header: &BlockHeader,
        overwrite: bool,
    ) -> Result<bool, ArchiverError> {
        if !overwrite && self.store.exists(header.root).await? {
            trace!(target: "archiver::walker", root = %header.root, "Blobs already archived");
            return Ok(true)
        }

        let sidecars = self.beacon.blob_sidecars(BlockId::Root(header.root)).await?;
        let count = sidecars.len();
        self.lease.ensure_held()?;
        self.store.write_blob(&BlobData::new(header.root, sidecars)).await?;

        debug!(
            target: "archiver::walker",
            root = %header.root,
            slot = header.slot(),
            blobs = count,
            overwrite,
            "Archived blobs"
        );
        Ok(false)
    }

    /// Archives the head and its ancestors until an archived block is reached.
    ///
    /// The walk also stops at the origin block and at the first block whose parent the beacon
    /// node does not know. After `max_live_walk_depth` blocks the rest of the gap is handed to a
    /// backfill starting at the oldest block of the walk.
    ///
    /// Headers are collected first and blobs written oldest first, so an archived block always
    /// sits on top of archived ancestors or of a registered backfill. A walk that fails or is
    /// cancelled halfway leaves no gap behind: the next walk stops at the newest block written
    /// and redoes the rest.
    pub async fn process_blocks_until_known_block(&self) -> Result<(), ArchiverError> {
        let mut pending = Vec::new();
        let mut id = BlockId::Head;
        let mut handover = false;

        loop {
            let header = match self.beacon.beacon_block_header(id).await {
                Ok(header) => header,
                Err(err) if err.is_not_found() && !pending.is_empty() => {
                    debug!(target: "archiver::walker", %id, "Parent unknown to the beacon node, stopping walk");
                    break
                }
                Err(err) => return Err(err.into()),
            };
            if self.store.exists(header.root).await? {
                break
            }

            let parent = header.parent_root();
            let is_origin = header.root == self.config.origin_block;
            pending.push(header);
            if is_origin {
                debug!(target: "archiver::walker", root = %self.config.origin_block, "Reached origin block");
                break
            }
            if pending.len() as u64 >= self.config.max_live_walk_depth {
                handover = true;
                break
            }
            id = BlockId::Root(parent);
        }

        let (Some(head), Some(oldest)) = (pending.first(), pending.last()) else { return Ok(()) };
        if handover {
            info!(
                target: "archiver::walker",
                depth = pending.len(),
                frontier = %oldest.root,
                slot = oldest.slot(),
                "Gap exceeds live walk depth, handing over to backfill"
            );
            self.tracker.start_or_resume(&self.lease, oldest.clone()).await?;
        }

        for header in pending.iter().rev() {
            self.persist_header(header, false).await?;
        }
        info!(target: "archiver::walker", root = %head.root, slot = head.slot(), blocks = pending.len(), "Archived new head");
        Ok(())
    }

    /// Moves `process` one block closer to its terminal ancestor.
    ///
    /// The frontier block itself is archived first, since a walk is registered and advanced
    /// before its frontier is written. Then the frontier moves to the parent, unless the walk
    /// completes: at the origin block, or when the parent is already archived or unknown to the
    /// beacon node. Returns the updated walk, or `None` once it completed.
    pub async fn backfill_step(
        &self,
        process: &BackfillProcess,
    ) -> Result<Option<BackfillProcess>, ArchiverError> {
        let start = process.start_hash();
        let current = &process.current_block;
        self.persist_header(current, false).await?;

        if current.root == self.config.origin_block {
            info!(target: "archiver::backfill", %start, "Backfill reached origin block");
            self.tracker.complete(&self.lease, start).await?;
            return Ok(None)
        }

        let parent_id = BlockId::Root(current.parent_root());
        let parent = match self.beacon.beacon_block_header(parent_id).await {
            Ok(parent) => parent,
            Err(err) if err.is_not_found() => {
                info!(
                    target: "archiver::backfill",
                    %start,
                    frontier = %current.root,
                    "Parent unknown to the beacon node, completing backfill"
                );
                self.tracker.complete(&self.lease, start).await?;
                return Ok(None)
            }
            Err(err) => return Err(err.into()),
        };

        if self.store.exists(parent.root).await? {
            self.tracker.complete(&self.lease, start).await?;
            return Ok(None)
        }
        self.tracker.advance(&self.lease, start, parent.clone()).await?;
        Ok(Some(BackfillProcess { start_block: process.start_block.clone(), current_block: parent }))
    }

    /// Steps `process` until it completes.
    ///
    /// Failed steps are retried after `backfill_error_retry_interval`. Every step re-checks what
    /// is archived, so retrying after a failed write is idempotent.
    pub async fn run_backfill(
        &self,
        process: BackfillProcess,
        cancel: &CancellationToken,
    ) -> Result<(), ArchiverError> {
        let start = process.start_hash();
        let mut process = process;
        loop {
            match or_cancelled(cancel, self.backfill_step(&process)).await? {
                Ok(Some(next)) => process = next,
                Ok(None) => return Ok(()),
                Err(ArchiverError::UnknownBackfill(_)) => {
                    debug!(target: "archiver::backfill", %start, "Backfill no longer tracked");
                    return Ok(())
                }
                Err(ArchiverError::LeaseLost) => {
                    trace!(target: "archiver::backfill", %start, "Lease not held, pausing backfill");
                }
                Err(err) => {
                    warn!(
                        target: "archiver::backfill",
                        %start,
                        frontier = %process.current_block.root,
                        %err,
                        "Backfill step failed"
                    );
                }
            }
            or_cancelled(cancel, tokio::time::sleep(self.config.backfill_error_retry_interval))
                .await?;
        }
    }

    /// Runs all tracked backfills concurrently, picking up newly registered ones, until `cancel`
    /// fires.
    pub async fn run_backfills(&self, cancel: &CancellationToken) {
        loop {
            let processes = match or_cancelled(cancel, self.tracker.processes(&self.lease)).await {
                Ok(Ok(processes)) => processes,
                Ok(Err(err)) => {
                    warn!(target: "archiver::backfill", %err, "Failed to read backfill processes");
                    if self.sleep(cancel, self.config.backfill_error_retry_interval).await.is_err() {
                        return
                    }
                    continue
                }
                Err(_) => return,
            };

            if processes.is_empty() {
                if or_cancelled(cancel, self.tracker.added()).await.is_err() {
                    return
                }
                continue
            }

            debug!(target: "archiver::backfill", count = processes.len(), "Running backfills");
            let walks = processes.into_values().map(|process| self.run_backfill(process, cancel));
            for res in join_all(walks).await {
                if let Err(ArchiverError::Cancelled) = res {
                    return
                }
            }
        }
    }

    /// Follows the head every `poll_interval` until `cancel` fires.
    pub async fn track_live_blocks(&self, cancel: &CancellationToken) {
        let mut interval = tokio::time::interval(self.config.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            if or_cancelled(cancel, interval.tick()).await.is_err() {
                return
            }
            if !self.lease.is_held() {
                trace!(target: "archiver::walker", "Lease not held, skipping head");
                continue
            }
            match or_cancelled(cancel, self.process_blocks_until_known_block()).await {
                Ok(Ok(())) => {}
                Ok(Err(ArchiverError::LeaseLost)) => {
                    debug!(target: "archiver::walker", "Lease lost while archiving head");
                }
                Ok(Err(err)) => warn!(target: "archiver::walker", %err, "Failed to archive head"),
                Err(_) => return,
            }
        }
    }

    /// Runs the archiver until `cancel` fires.
    ///
    /// Waits for the lease, registers a backfill from the head if it was not archived yet,
    /// archives the head, and then follows the chain while backfills run in the background.
    pub async fn start(self: Arc<Self>, cancel: CancellationToken) -> Result<(), ArchiverError> {
        info!(target: "archiver::walker", archiver_id = %self.archiver_id, "Starting archiver");
        let heartbeat = self.acquire_lease(&cancel).await?;

        let retry = self.config.backfill_error_retry_interval;
        self.retry(&cancel, retry, "archive head", || self.archive_head()).await?;

        let backfills = tokio::spawn({
            let this = Arc::clone(&self);
            let cancel = cancel.clone();
            async move { this.run_backfills(&cancel).await }
        });

        self.track_live_blocks(&cancel).await;

        for (task, handle) in [("backfill", backfills), ("heartbeat", heartbeat)] {
            if let Err(err) = handle.await {
                warn!(target: "archiver::walker", task, %err, "Archiver task failed");
            }
        }
        info!(target: "archiver::walker", "Archiver stopped");
        Ok(())
    }

    /// Fetches and overwrites the blobs of every slot in `from..=to`.
    ///
    /// Slots without a block are skipped. Requires the lease. Returns the last slot of the range.
    pub async fn rearchive_range(&self, from: u64, to: u64) -> Result<u64, RearchiveError> {
        if from > to {
            return Err(RearchiveError {
                slot: from,
                source: ArchiverError::InvalidRange { from, to },
            })
        }

        for slot in from..=to {
            match self.persist_block(BlockId::Slot(slot), true).await {
                Ok(_) => {}
                Err(err) if err.is_block_not_found() => {
                    debug!(target: "archiver::walker", slot, "No block at slot");
                }
                Err(source) => return Err(RearchiveError { slot, source }),
            }
        }
        info!(target: "archiver::walker", from, to, "Rearchived slot range");
        Ok(to)
    }

    /// Archives the head, registering a backfill from it first if it is new.
    ///
    /// The backfill is registered before the head is written, so stopping in between loses
    /// nothing: the backfill archives its start block on its first step.
    async fn archive_head(&self) -> Result<(), ArchiverError> {
        let head = self.beacon.beacon_block_header(BlockId::Head).await?;
        if self.store.exists(head.root).await? {
            info!(target: "archiver::walker", root = %head.root, slot = head.slot(), "Head already archived");
            return Ok(())
        }
        self.tracker.start_or_resume(&self.lease, head.clone()).await?;
        self.persist_header(&head, false).await?;
        Ok(())
    }

    async fn sleep(&self, cancel: &CancellationToken, duration: Duration) -> Result<(), ArchiverError> {
        or_cancelled(cancel, tokio::time::sleep(duration)).await
    }

    /// Runs `op` until it succeeds, pausing `interval` after each failure.
    async fn retry<T, F, Fut>(
        &self,
        cancel: &CancellationToken,
        interval: Duration,
        what: &'static str,
        mut op: F,
    ) -> Result<T, ArchiverError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ArchiverError>>,
    {
        loop {
            match or_cancelled(cancel, op()).await? {
                Ok(value) => return Ok(value),
                Err(err) => warn!(target: "archiver::walker", what, %err, "Retrying"),
            }
            self.sleep(cancel, interval).await?;
        }
    }
}
