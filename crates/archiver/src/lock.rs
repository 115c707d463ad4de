//! Single writer coordination through a lease recorded in storage.
//!
//! Every archiver instance pointed at the same archive competes for one lease, persisted as the
//! [`Lockfile`]. The holder renews it periodically; a lockfile that was not renewed for the lease
//! timeout may be taken over by any instance. The protocol does not rely on conditional writes:
//! after writing, an instance reads the lockfile back and only considers itself the holder if its
//! own id is there.
//!
//! The read-back does not close every window. If two instances both read an empty or stale
//! lockfile, and the first one writes and reads back before the second one writes, both end up
//! holding the lease. The lockfile then names the second instance, so the first one drops the
//! lease on its next heartbeat, at most one update interval later. Until then both may write.
//! Blob writes are idempotent and the backfill index is reloaded on every acquisition, so the
//! damage is limited to one of them overwriting the other's index update.

use crate::{or_cancelled, ArchiverError, LockConfig};
use blob_archiver_storage::{DataStore, Lockfile, StorageError};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Returns the current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

/// Lease state of this instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// Not yet determined.
    #[default]
    Unheld,
    /// This instance holds the lease and may write.
    HeldBySelf,
    /// Another instance holds the lease; this one must not write.
    HeldByOther,
}

/// Shared view of whether this instance holds the lease.
///
/// Cloned into every component that writes to the archive. Each acquisition starts a new
/// generation, which lets holders of cached archive state notice that the lease was lost and
/// retaken in between.
#[derive(Debug, Clone, Default)]
pub struct Lease {
    inner: Arc<LeaseInner>,
}

#[derive(Debug, Default)]
struct LeaseInner {
    held: AtomicBool,
    generation: AtomicU64,
}

impl Lease {
    /// Returns `true` while this instance holds the lease.
    pub fn is_held(&self) -> bool {
        self.inner.held.load(Ordering::Acquire)
    }

    /// Fails with [`ArchiverError::LeaseLost`] unless the lease is held.
    pub fn ensure_held(&self) -> Result<(), ArchiverError> {
        if self.is_held() {
            Ok(())
        } else {
            Err(ArchiverError::LeaseLost)
        }
    }

    /// Number of times the lease was acquired.
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    fn set(&self, held: bool) {
        let was_held = self.inner.held.swap(held, Ordering::AcqRel);
        if held && !was_held {
            self.inner.generation.fetch_add(1, Ordering::AcqRel);
        }
    }
}

/// Acquires and renews the lease of one archiver instance.
#[derive(Debug)]
pub struct LockCoordinator<S> {
    store: S,
    archiver_id: String,
    config: LockConfig,
    lease: Lease,
    state: LockState,
    /// Time of the last successful write of our own lockfile.
    renewed_at: Option<u64>,
}

impl<S: DataStore> LockCoordinator<S> {
    /// Creates a coordinator publishing its state through `lease`.
    pub fn new(store: S, archiver_id: impl Into<String>, config: LockConfig, lease: Lease) -> Self {
        Self {
            store,
            archiver_id: archiver_id.into(),
            config,
            lease,
            state: LockState::Unheld,
            renewed_at: None,
        }
    }

    /// The id this instance writes into the lockfile.
    pub fn archiver_id(&self) -> &str {
        &self.archiver_id
    }

    /// The current state.
    pub const fn state(&self) -> LockState {
        self.state
    }

    /// The lease handle shared with writers.
    pub const fn lease(&self) -> &Lease {
        &self.lease
    }

    fn timeout_secs(&self) -> u64 {
        self.config.timeout.as_secs()
    }

    /// Returns `true` if `lockfile` grants the lease to another instance at `now`.
    fn held_by_other(&self, lockfile: &Lockfile, now: u64) -> bool {
        !lockfile.is_empty() &&
            lockfile.archiver_id != self.archiver_id &&
            !lockfile.is_stale(now, self.timeout_secs())
    }

    fn transition(&mut self, state: LockState) -> LockState {
        if self.state != state {
            debug!(target: "archiver::lock", from = ?self.state, to = ?state, "Lease state changed");
        }
        self.state = state;
        self.lease.set(state == LockState::HeldBySelf);
        state
    }

    /// Tries to take the lease at unix time `now`.
    ///
    /// The lease is taken if the lockfile is empty, stale or already ours. Taking it means writing
    /// our id and `now`, then reading the lockfile back to see whether a concurrent writer won.
    pub async fn try_acquire_at(&mut self, now: u64) -> Result<LockState, StorageError> {
        let current = self.store.read_lockfile().await?;
        if self.held_by_other(&current, now) {
            trace!(target: "archiver::lock", holder = %current.archiver_id, "Lease held by another archiver");
            return Ok(self.transition(LockState::HeldByOther))
        }

        self.store.write_lockfile(&Lockfile::new(self.archiver_id.clone(), now)).await?;
        let written = self.store.read_lockfile().await?;
        if written.archiver_id != self.archiver_id {
            debug!(target: "archiver::lock", holder = %written.archiver_id, "Lost race for the lease");
            return Ok(self.transition(LockState::HeldByOther))
        }

        self.renewed_at = Some(now);
        Ok(self.transition(LockState::HeldBySelf))
    }

    /// Renews the lease at unix time `now`, or tries to take it if it is not held.
    ///
    /// Observing another instance's fresh lockfile drops the lease without writing. If renewing
    /// fails for longer than the timeout the lease is dropped as well, since other instances may
    /// legitimately take it over by then.
    pub async fn heartbeat_at(&mut self, now: u64) -> Result<LockState, StorageError> {
        if self.state != LockState::HeldBySelf {
            return self.try_acquire_at(now).await
        }

        match self.renew(now).await {
            Ok(state) => Ok(state),
            Err(err) => {
                let timeout = self.timeout_secs();
                let expired =
                    self.renewed_at.is_none_or(|at| now.saturating_sub(at) >= timeout);
                if expired {
                    warn!(target: "archiver::lock", %err, "Lease expired while renewing failed");
                    self.transition(LockState::Unheld);
                }
                Err(err)
            }
        }
    }

    async fn renew(&mut self, now: u64) -> Result<LockState, StorageError> {
        let current = self.store.read_lockfile().await?;
        if self.held_by_other(&current, now) {
            warn!(target: "archiver::lock", holder = %current.archiver_id, "Lease taken over by another archiver");
            return Ok(self.transition(LockState::HeldByOther))
        }

        self.store.write_lockfile(&Lockfile::new(self.archiver_id.clone(), now)).await?;
        self.renewed_at = Some(now);
        trace!(target: "archiver::lock", now, "Renewed lease");
        Ok(self.transition(LockState::HeldBySelf))
    }

    /// Retries [`Self::try_acquire_at`] every retry interval until the lease is held.
    pub async fn wait_for_lease(&mut self, cancel: &CancellationToken) -> Result<(), ArchiverError> {
        loop {
            match or_cancelled(cancel, self.try_acquire_at(unix_now())).await? {
                Ok(LockState::HeldBySelf) => {
                    info!(target: "archiver::lock", archiver_id = %self.archiver_id, "Acquired lease");
                    return Ok(())
                }
                Ok(_) => {
                    debug!(target: "archiver::lock", retry_in = ?self.config.retry_interval, "Waiting for lease")
                }
                Err(err) => warn!(target: "archiver::lock", %err, "Failed to acquire lease"),
            }
            or_cancelled(cancel, tokio::time::sleep(self.config.retry_interval)).await?;
        }
    }

    /// Runs [`Self::heartbeat_at`] every update interval until `cancel` fires.
    pub async fn run_heartbeat(mut self, cancel: CancellationToken) {
        let mut interval = tokio::time::interval(self.config.update_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick completes immediately
        interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => {
                    if let Err(err) = self.heartbeat_at(unix_now()).await {
                        warn!(target: "archiver::lock", %err, "Failed to renew lease");
                    }
                }
            }
        }
        debug!(target: "archiver::lock", "Lease heartbeat stopped");
    }
}
