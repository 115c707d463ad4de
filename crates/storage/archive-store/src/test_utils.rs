//! Test helpers: a [`DataStore`](crate::DataStore) wrapper with injectable faults and pauses.

use crate::{BackfillProcesses, BlobData, DataStoreReader, DataStoreWriter, Lockfile, StorageError};
use alloy_primitives::B256;
use parking_lot::Mutex;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::Notify;

/// The kind of object a write replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Blob data of one block.
    Blob,
    /// The backfill index.
    BackfillProcesses,
    /// The lockfile.
    Lockfile,
}

/// Where a held write stops.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldPoint {
    /// Before the object reaches the inner store.
    BeforeWrite,
    /// After the object reached the inner store, before the caller sees the result.
    AfterWrite,
}

/// A write paused by [`TestStore::hold_next_write`].
#[derive(Debug, Default)]
pub struct WriteGate {
    reached: Notify,
    release: Notify,
}

impl WriteGate {
    /// Resolves once the held write arrived at the gate.
    pub async fn reached(&self) {
        self.reached.notified().await
    }

    /// Lets the held write continue.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Debug)]
struct HeldWrite {
    kind: ObjectKind,
    point: HoldPoint,
    gate: Arc<WriteGate>,
}

#[derive(Debug, Default)]
struct Hooks {
    interleave: AtomicBool,
    failing_blobs: Mutex<HashSet<B256>>,
    held: Mutex<Option<HeldWrite>>,
}

/// Wraps a store to make tests of concurrent archivers deterministic.
///
/// Clones share their hooks. With [`Self::interleave`] every operation first yields to the
/// scheduler, so operations of tasks joined on one thread alternate. Blob writes can be made to
/// fail, and the next write of a kind can be held at a [`WriteGate`].
#[derive(Debug, Clone)]
pub struct TestStore<S> {
    inner: S,
    hooks: Arc<Hooks>,
}

impl<S> TestStore<S> {
    /// Wraps `inner` without any hooks set.
    pub fn new(inner: S) -> Self {
        Self { inner, hooks: Arc::default() }
    }

    /// The wrapped store.
    pub const fn inner(&self) -> &S {
        &self.inner
    }

    /// Yields to the scheduler before every operation.
    pub fn interleave(self) -> Self {
        self.hooks.interleave.store(true, Ordering::Release);
        self
    }

    /// Makes writes of the blob data of `hash` fail until [`Self::recover_blob`].
    pub fn fail_blob(&self, hash: B256) {
        self.hooks.failing_blobs.lock().insert(hash);
    }

    /// Undoes [`Self::fail_blob`].
    pub fn recover_blob(&self, hash: B256) {
        self.hooks.failing_blobs.lock().remove(&hash);
    }

    /// Holds the next write of `kind` at `point` until the returned gate is released.
    pub fn hold_next_write(&self, kind: ObjectKind, point: HoldPoint) -> Arc<WriteGate> {
        let gate = Arc::new(WriteGate::default());
        *self.hooks.held.lock() = Some(HeldWrite { kind, point, gate: Arc::clone(&gate) });
        gate
    }

    async fn before_op(&self) {
        if self.hooks.interleave.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }
    }

    /// Takes the held write if it matches `kind`.
    fn take_held(&self, kind: ObjectKind) -> Option<HeldWrite> {
        let mut held = self.hooks.held.lock();
        if held.as_ref().is_some_and(|h| h.kind == kind) {
            held.take()
        } else {
            None
        }
    }

    async fn write<F>(&self, kind: ObjectKind, write: F) -> Result<(), StorageError>
    where
        F: std::future::Future<Output = Result<(), StorageError>>,
    {
        self.before_op().await;
        let held = self.take_held(kind);
        let pause = |point| {
            let gate = held.as_ref().filter(|h| h.point == point).map(|h| Arc::clone(&h.gate));
            async move {
                if let Some(gate) = gate {
                    gate.reached.notify_one();
                    gate.release.notified().await;
                }
            }
        };

        pause(HoldPoint::BeforeWrite).await;
        write.await?;
        pause(HoldPoint::AfterWrite).await;
        Ok(())
    }
}

impl<S: DataStoreReader> DataStoreReader for TestStore<S> {
    async fn exists(&self, hash: B256) -> Result<bool, StorageError> {
        self.before_op().await;
        self.inner.exists(hash).await
    }

    async fn read_blob(&self, hash: B256) -> Result<BlobData, StorageError> {
        self.before_op().await;
        self.inner.read_blob(hash).await
    }

    async fn read_backfill_processes(&self) -> Result<BackfillProcesses, StorageError> {
        self.before_op().await;
        self.inner.read_backfill_processes().await
    }

    async fn read_lockfile(&self) -> Result<Lockfile, StorageError> {
        self.before_op().await;
        self.inner.read_lockfile().await
    }
}

impl<S: DataStoreWriter> DataStoreWriter for TestStore<S> {
    async fn write_blob(&self, data: &BlobData) -> Result<(), StorageError> {
        if self.hooks.failing_blobs.lock().contains(&data.hash()) {
            return Err(StorageError::storage(format!("test store: write of {} failed", data.hash())))
        }
        self.write(ObjectKind::Blob, self.inner.write_blob(data)).await
    }

    async fn write_backfill_processes(
        &self,
        processes: &BackfillProcesses,
    ) -> Result<(), StorageError> {
        self.write(ObjectKind::BackfillProcesses, self.inner.write_backfill_processes(processes))
            .await
    }

    async fn write_lockfile(&self, lockfile: &Lockfile) -> Result<(), StorageError> {
        self.write(ObjectKind::Lockfile, self.inner.write_lockfile(lockfile)).await
    }
}
