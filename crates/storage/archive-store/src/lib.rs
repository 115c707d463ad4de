//! Storage of the blob archive.
//!
//! The archive holds three kinds of objects:
//!
//! - one [`BlobData`] per archived beacon block, keyed by the block root,
//! - the [`BackfillProcesses`] index of in-progress historical walks,
//! - the [`Lockfile`] recording which archiver instance currently holds the write lease.
//!
//! [`DataStoreReader`] and [`DataStoreWriter`] describe the operations on them. Two backends
//! implement both: [`FileStorage`] keeps objects in a local directory, [`ObjectStorage`] in S3 or
//! any other [`object_store::ObjectStore`]. Writes replace whole objects and the last writer wins;
//! exclusivity between archivers is the lease's job, not the store's.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use alloy_primitives::B256;
use std::future::Future;

mod compression;
pub mod config;
mod error;
mod file;
mod object;
mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use config::{StorageConfig, StorageType};
pub use error::{BoxError, StorageError};
pub use file::{FileStorage, FileStorageError};
pub use object::ObjectStorage;
pub use types::{BackfillProcess, BackfillProcesses, BlobData, BlobSidecars, Header, Lockfile};

/// Key of the backfill index.
pub const BACKFILL_PROCESSES_KEY: &str = "backfill_processes";

/// Key of the lockfile.
pub const LOCKFILE_KEY: &str = "lockfile";

/// Read access to the archive.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait DataStoreReader: Send + Sync {
    /// Returns whether blob data for the block `hash` is stored.
    ///
    /// A failure to find out is a [`StorageError::Storage`], never `false`.
    fn exists(&self, hash: B256) -> impl Future<Output = Result<bool, StorageError>> + Send;

    /// Reads the blob data of the block `hash`.
    ///
    /// Returns [`StorageError::NotFound`] if there is none.
    fn read_blob(&self, hash: B256) -> impl Future<Output = Result<BlobData, StorageError>> + Send;

    /// Reads the backfill index. An archive without one yields an empty index.
    fn read_backfill_processes(
        &self,
    ) -> impl Future<Output = Result<BackfillProcesses, StorageError>> + Send;

    /// Reads the lockfile. An archive without one yields [`Lockfile::default`].
    fn read_lockfile(&self) -> impl Future<Output = Result<Lockfile, StorageError>> + Send;
}

/// Write access to the archive.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait DataStoreWriter: Send + Sync {
    /// Stores `data` under its block hash, replacing any previous version.
    fn write_blob(&self, data: &BlobData) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Replaces the backfill index.
    fn write_backfill_processes(
        &self,
        processes: &BackfillProcesses,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Replaces the lockfile.
    fn write_lockfile(
        &self,
        lockfile: &Lockfile,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Full access to the archive.
pub trait DataStore: DataStoreReader + DataStoreWriter {}

impl<T> DataStore for T where T: DataStoreReader + DataStoreWriter {}
