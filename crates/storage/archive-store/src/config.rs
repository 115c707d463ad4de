//! Storage backend configuration.

use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf, str::FromStr};

/// Which backend persists the archive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageType {
    /// A local directory, see [`FileStorage`](crate::FileStorage).
    #[default]
    File,
    /// An S3 bucket, see [`ObjectStorage`](crate::ObjectStorage).
    S3,
}

impl fmt::Display for StorageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::File => f.write_str("file"),
            Self::S3 => f.write_str("s3"),
        }
    }
}

impl FromStr for StorageType {
    type Err = StorageConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "s3" => Ok(Self::S3),
            _ => Err(StorageConfigError::UnknownType(s.to_string())),
        }
    }
}

/// Configuration of the archive storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Selected backend.
    #[serde(rename = "type")]
    pub kind: StorageType,
    /// Settings of the file backend.
    pub file: FileStorageConfig,
    /// Settings of the S3 backend.
    pub s3: S3Config,
}

impl StorageConfig {
    /// Checks that the selected backend has everything it needs.
    pub fn validate(&self) -> Result<(), StorageConfigError> {
        match self.kind {
            StorageType::File if self.file.directory.as_os_str().is_empty() => {
                Err(StorageConfigError::MissingDirectory)
            }
            StorageType::S3 if self.s3.bucket.is_empty() => Err(StorageConfigError::MissingBucket),
            StorageType::S3
                if self.s3.access_key.is_some() != self.s3.secret_access_key.is_some() =>
            {
                Err(StorageConfigError::PartialCredentials)
            }
            _ => Ok(()),
        }
    }
}

/// Settings of the file backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileStorageConfig {
    /// Directory holding the archive.
    pub directory: PathBuf,
}

impl Default for FileStorageConfig {
    fn default() -> Self {
        Self { directory: PathBuf::from("blob-archive") }
    }
}

/// Settings of the S3 backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct S3Config {
    /// Endpoint of an S3 compatible service, with or without scheme. AWS when unset.
    pub endpoint: Option<String>,
    /// Bucket name.
    pub bucket: String,
    /// Key prefix of every object.
    pub path: String,
    /// Region of the bucket.
    pub region: Option<String>,
    /// Static access key id.
    pub access_key: Option<String>,
    /// Static secret access key.
    pub secret_access_key: Option<String>,
    /// Talk https to the endpoint.
    pub use_https: bool,
    /// Gzip blob objects before upload.
    pub compress: bool,
}

impl S3Config {
    /// The endpoint as a URL, adding the scheme implied by [`Self::use_https`] if missing.
    pub fn endpoint_url(&self) -> Option<String> {
        let endpoint = self.endpoint.as_deref().filter(|e| !e.is_empty())?;
        if endpoint.contains("://") {
            return Some(endpoint.to_string())
        }
        let scheme = if self.use_https { "https" } else { "http" };
        Some(format!("{scheme}://{endpoint}"))
    }
}

impl Default for S3Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            bucket: String::new(),
            path: String::new(),
            region: None,
            access_key: None,
            secret_access_key: None,
            use_https: true,
            compress: false,
        }
    }
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint", &self.endpoint)
            .field("bucket", &self.bucket)
            .field("path", &self.path)
            .field("region", &self.region)
            .field("access_key", &self.access_key)
            .field("secret_access_key", &self.secret_access_key.as_ref().map(|_| "<redacted>"))
            .field("use_https", &self.use_https)
            .field("compress", &self.compress)
            .finish()
    }
}

/// Invalid storage configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageConfigError {
    /// Not one of `file` or `s3`.
    #[error("unknown storage type {0:?}, expected file or s3")]
    UnknownType(String),
    /// File storage without a directory.
    #[error("file storage requires a directory")]
    MissingDirectory,
    /// S3 storage without a bucket.
    #[error("s3 storage requires a bucket")]
    MissingBucket,
    /// Only one of access key and secret configured.
    #[error("s3 access key and secret access key must be set together")]
    PartialCredentials,
}
