//! An object store backed data store.

use crate::{
    compression::{gzip, maybe_gunzip},
    config::S3Config,
    BackfillProcesses, BlobData, DataStoreReader, DataStoreWriter, Lockfile, StorageError,
    BACKFILL_PROCESSES_KEY, LOCKFILE_KEY,
};
use alloy_primitives::B256;
use object_store::{
    aws::AmazonS3Builder, memory::InMemory, path::Path as ObjectPath, Attribute, Attributes,
    ObjectStore, PutOptions, PutPayload,
};
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use tracing::{debug, trace};

/// A data store keeping one object per key below a common prefix.
///
/// Works against any [`ObjectStore`]; [`ObjectStorage::s3`] connects to S3 or an S3 compatible
/// service, [`ObjectStorage::in_memory`] is meant for tests. Blob objects are optionally gzip
/// compressed. Reads detect compression from the payload itself, so a bucket may hold a mix of
/// compressed and plain objects.
#[derive(Clone, Debug)]
pub struct ObjectStorage {
    store: Arc<dyn ObjectStore>,
    prefix: ObjectPath,
    compress: bool,
}

impl ObjectStorage {
    /// Wraps `store`, placing every object below `prefix`.
    pub fn new(store: Arc<dyn ObjectStore>, prefix: &str, compress: bool) -> Self {
        Self { store, prefix: ObjectPath::from(prefix), compress }
    }

    /// Connects to the bucket described by `config`.
    ///
    /// Static credentials are used when both keys are configured; otherwise credentials are
    /// resolved from the environment (`AWS_*` variables or instance metadata).
    pub fn s3(config: &S3Config) -> Result<Self, StorageError> {
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_allow_http(!config.use_https);
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = config.endpoint_url() {
            builder = builder.with_endpoint(endpoint);
        }
        if let (Some(access_key), Some(secret)) = (&config.access_key, &config.secret_access_key) {
            builder = builder.with_access_key_id(access_key).with_secret_access_key(secret);
        }
        let store = builder.build()?;

        debug!(
            target: "storage::object",
            bucket = %config.bucket,
            path = %config.path,
            compress = config.compress,
            "Opened S3 storage"
        );
        Ok(Self::new(Arc::new(store), &config.path, config.compress))
    }

    /// Creates an empty store held in memory.
    pub fn in_memory(compress: bool) -> Self {
        Self::new(Arc::new(InMemory::new()), "", compress)
    }

    /// Returns `true` if blob objects are written compressed.
    pub const fn compresses(&self) -> bool {
        self.compress
    }

    /// The path of the object stored under `key`.
    fn object_path(&self, key: &str) -> ObjectPath {
        if self.prefix.as_ref().is_empty() {
            ObjectPath::from(key)
        } else {
            ObjectPath::from(format!("{}/{key}", self.prefix))
        }
    }

    fn blob_path(&self, hash: B256) -> ObjectPath {
        self.object_path(&format!("{hash:#x}"))
    }

    /// Fetches the payload at `path`, `None` if there is no such object.
    async fn get(&self, path: &ObjectPath) -> Result<Option<Vec<u8>>, StorageError> {
        let result = match self.store.get(path).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let bytes = result.bytes().await?;
        maybe_gunzip(bytes.to_vec()).map(Some)
    }

    async fn get_json<T: DeserializeOwned + Default>(
        &self,
        key: &str,
    ) -> Result<T, StorageError> {
        match self.get(&self.object_path(key)).await? {
            Some(data) => Ok(serde_json::from_slice(&data)?),
            None => Ok(T::default()),
        }
    }

    async fn put(
        &self,
        path: &ObjectPath,
        data: Vec<u8>,
        compressed: bool,
    ) -> Result<(), StorageError> {
        let mut attributes = Attributes::new();
        attributes.insert(Attribute::ContentType, "application/json".into());
        if compressed {
            attributes.insert(Attribute::ContentEncoding, "gzip".into());
        }
        let opts = PutOptions { attributes, ..Default::default() };
        self.store.put_opts(path, PutPayload::from(data), opts).await?;
        Ok(())
    }

    async fn put_json<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        self.put(&self.object_path(key), serde_json::to_vec(value)?, false).await
    }
}

impl DataStoreReader for ObjectStorage {
    async fn exists(&self, hash: B256) -> Result<bool, StorageError> {
        match self.store.head(&self.blob_path(hash)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn read_blob(&self, hash: B256) -> Result<BlobData, StorageError> {
        let data = self.get(&self.blob_path(hash)).await?.ok_or(StorageError::NotFound(hash))?;
        Ok(serde_json::from_slice(&data)?)
    }

    async fn read_backfill_processes(&self) -> Result<BackfillProcesses, StorageError> {
        self.get_json(BACKFILL_PROCESSES_KEY).await
    }

    async fn read_lockfile(&self) -> Result<Lockfile, StorageError> {
        self.get_json(LOCKFILE_KEY).await
    }
}

impl DataStoreWriter for ObjectStorage {
    async fn write_blob(&self, data: &BlobData) -> Result<(), StorageError> {
        let hash = data.hash();
        let mut encoded = serde_json::to_vec(data)?;
        if self.compress {
            encoded = gzip(&encoded)?;
        }
        let size = encoded.len();
        self.put(&self.blob_path(hash), encoded, self.compress).await?;
        trace!(target: "storage::object", %hash, size, "Wrote blob object");
        Ok(())
    }

    async fn write_backfill_processes(
        &self,
        processes: &BackfillProcesses,
    ) -> Result<(), StorageError> {
        self.put_json(BACKFILL_PROCESSES_KEY, processes).await
    }

    async fn write_lockfile(&self, lockfile: &Lockfile) -> Result<(), StorageError> {
        self.put_json(LOCKFILE_KEY, lockfile).await
    }
}
