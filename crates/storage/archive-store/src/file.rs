//! A directory backed data store.

use crate::{
    BackfillProcesses, BlobData, DataStoreReader, DataStoreWriter, Lockfile, StorageError,
    BACKFILL_PROCESSES_KEY, LOCKFILE_KEY,
};
use alloy_primitives::B256;
use parking_lot::RwLock;
use std::{
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, trace};

/// A data store keeping one file per object in a single directory.
///
/// Blob data lives in `<dir>/0x<hash>`, the backfill index in `<dir>/backfill_processes` and the
/// lease in `<dir>/lockfile`. Files are written to a temporary sibling and renamed into place, so
/// readers never see a partially written object.
#[derive(Clone, Debug)]
pub struct FileStorage {
    inner: Arc<FileStorageInner>,
}

impl FileStorage {
    /// Opens the store at `dir`, creating the directory if it does not exist.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, FileStorageError> {
        let inner = FileStorageInner::new(dir.into());
        inner.create_dir()?;
        Ok(Self { inner: Arc::new(inner) })
    }

    /// The directory holding the objects.
    pub fn directory(&self) -> &Path {
        &self.inner.dir
    }

    /// Runs a filesystem operation on the blocking pool.
    async fn blocking<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(&FileStorageInner) -> Result<T, FileStorageError> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(StorageError::storage)?
            .map_err(Into::into)
    }

    async fn read_key(&self, key: &'static str) -> Result<Option<Vec<u8>>, StorageError> {
        self.blocking(move |inner| inner.read_one(&inner.dir.join(key))).await
    }

    async fn write_key(&self, key: &'static str, data: Vec<u8>) -> Result<(), StorageError> {
        self.blocking(move |inner| inner.write_one(&inner.dir.join(key), &data)).await
    }
}

impl DataStoreReader for FileStorage {
    async fn exists(&self, hash: B256) -> Result<bool, StorageError> {
        self.blocking(move |inner| inner.contains(hash)).await
    }

    async fn read_blob(&self, hash: B256) -> Result<BlobData, StorageError> {
        let data = self
            .blocking(move |inner| inner.read_one(&inner.blob_file(hash)))
            .await?
            .ok_or(StorageError::NotFound(hash))?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn read_backfill_processes(&self) -> Result<BackfillProcesses, StorageError> {
        match self.read_key(BACKFILL_PROCESSES_KEY).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(BackfillProcesses::default()),
        }
    }

    async fn read_lockfile(&self) -> Result<Lockfile, StorageError> {
        match self.read_key(LOCKFILE_KEY).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(Lockfile::default()),
        }
    }
}

impl DataStoreWriter for FileStorage {
    async fn write_blob(&self, data: &BlobData) -> Result<(), StorageError> {
        let hash = data.hash();
        let encoded = serde_json::to_vec(data)?;
        self.blocking(move |inner| inner.write_one(&inner.blob_file(hash), &encoded)).await?;
        trace!(target: "storage::file", %hash, sidecars = data.blob_sidecars.data.len(), "Wrote blob file");
        Ok(())
    }

    async fn write_backfill_processes(
        &self,
        processes: &BackfillProcesses,
    ) -> Result<(), StorageError> {
        self.write_key(BACKFILL_PROCESSES_KEY, serde_json::to_vec(processes)?).await
    }

    async fn write_lockfile(&self, lockfile: &Lockfile) -> Result<(), StorageError> {
        self.write_key(LOCKFILE_KEY, serde_json::to_vec(lockfile)?).await
    }
}

struct FileStorageInner {
    dir: PathBuf,
    /// Serializes writers against readers so a rename never races a read of the same key.
    file_lock: RwLock<()>,
}

impl FileStorageInner {
    fn new(dir: PathBuf) -> Self {
        Self { dir, file_lock: Default::default() }
    }

    fn create_dir(&self) -> Result<(), FileStorageError> {
        debug!(target: "storage::file", dir = ?self.dir, "Opening file storage");
        fs::create_dir_all(&self.dir).map_err(|e| FileStorageError::Open(self.dir.clone(), e))
    }

    /// Returns the path of the blob file of the given block.
    #[inline]
    fn blob_file(&self, hash: B256) -> PathBuf {
        self.dir.join(format!("{hash:#x}"))
    }

    fn contains(&self, hash: B256) -> Result<bool, FileStorageError> {
        let path = self.blob_file(hash);
        let _lock = self.file_lock.read();
        match fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FileStorageError::Read(path, e)),
        }
    }

    /// Reads the file at `path`, `None` if it does not exist.
    fn read_one(&self, path: &Path) -> Result<Option<Vec<u8>>, FileStorageError> {
        let _lock = self.file_lock.read();
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(FileStorageError::Read(path.to_path_buf(), e)),
        }
    }

    /// Replaces the file at `path` with `data`.
    fn write_one(&self, path: &Path, data: &[u8]) -> Result<(), FileStorageError> {
        let tmp = path.with_extension("tmp");
        let _lock = self.file_lock.write();
        fs::write(&tmp, data).map_err(|e| FileStorageError::Write(tmp.clone(), e))?;
        fs::rename(&tmp, path).map_err(|e| FileStorageError::Write(path.to_path_buf(), e))
    }
}

impl fmt::Debug for FileStorageInner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorageInner").field("dir", &self.dir).finish_non_exhaustive()
    }
}

/// Errors that can occur when interacting with a [`FileStorage`].
#[derive(Debug, thiserror::Error)]
pub enum FileStorageError {
    /// Thrown during [`FileStorage::open`] if the directory cannot be created.
    #[error("failed to open file storage at {0}: {1}")]
    Open(PathBuf, io::Error),
    /// A file exists but cannot be read.
    #[error("failed to read {0}: {1}")]
    Read(PathBuf, io::Error),
    /// A file cannot be written or renamed into place.
    #[error("failed to write {0}: {1}")]
    Write(PathBuf, io::Error),
}

impl From<FileStorageError> for StorageError {
    fn from(value: FileStorageError) -> Self {
        Self::storage(value)
    }
}
