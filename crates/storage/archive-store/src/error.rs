use alloy_primitives::B256;

/// Boxed error of an underlying backend or codec.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Errors returned by a [`DataStore`](crate::DataStore).
///
/// Callers branch on the variant: [`StorageError::NotFound`] is an expected outcome, while
/// [`StorageError::Storage`] is transient and worth retrying. Marshaling and compression errors
/// indicate corrupt or incompatible data and are not fixed by retrying.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No blob data is stored under the hash.
    #[error("blob {0} not found")]
    NotFound(B256),
    /// The backend could not be reached or failed the operation.
    #[error("error accessing storage: {0}")]
    Storage(#[source] BoxError),
    /// The data could not be encoded or decoded.
    #[error("error encoding/decoding blob: {0}")]
    Marshaling(#[source] BoxError),
    /// The payload could not be compressed or decompressed.
    #[error("error compressing blob: {0}")]
    Compression(#[source] std::io::Error),
}

impl StorageError {
    /// Wraps a backend error.
    pub fn storage(err: impl Into<BoxError>) -> Self {
        Self::Storage(err.into())
    }

    /// Wraps a codec error.
    pub fn marshaling(err: impl Into<BoxError>) -> Self {
        Self::Marshaling(err.into())
    }

    /// Returns `true` if the requested blob does not exist.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns `true` if the error is a transient backend failure.
    pub const fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::marshaling(err)
    }
}

impl From<blob_archiver_beacon_types::SszError> for StorageError {
    fn from(err: blob_archiver_beacon_types::SszError) -> Self {
        Self::marshaling(err)
    }
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        Self::storage(err)
    }
}
