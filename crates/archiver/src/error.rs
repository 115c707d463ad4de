use alloy_primitives::B256;
use blob_archiver_beacon_client::BeaconClientError;
use blob_archiver_storage::StorageError;

/// Errors of the archiver's operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiverError {
    /// Fetching from the beacon node failed.
    #[error(transparent)]
    Beacon(#[from] BeaconClientError),
    /// Reading or writing the archive failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A write was attempted without holding the lease.
    #[error("write lease not held")]
    LeaseLost,
    /// The operation was interrupted by shutdown.
    #[error("cancelled")]
    Cancelled,
    /// No backfill process starts at the given block.
    #[error("no backfill process starts at {0}")]
    UnknownBackfill(B256),
    /// The slot range is empty.
    #[error("invalid slot range {from}..={to}")]
    InvalidRange {
        /// First slot.
        from: u64,
        /// Last slot.
        to: u64,
    },
}

impl ArchiverError {
    /// Returns `true` if the beacon node does not know the requested block.
    pub fn is_block_not_found(&self) -> bool {
        matches!(self, Self::Beacon(err) if err.is_not_found())
    }
}
