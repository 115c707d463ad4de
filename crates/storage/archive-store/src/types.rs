//! Persisted objects and their encodings.

use crate::StorageError;
use alloy_primitives::B256;
use blob_archiver_beacon_types::{BlobSidecar, BlockHeader, SszError, BLOB_SIDECAR_SIZE};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Identity of a stored blob set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Header {
    /// Root of the beacon block the sidecars belong to.
    pub beacon_block_hash: B256,
}

/// The blob sidecars of one block, in index order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobSidecars {
    /// The sidecars. A block without blobs has an empty list.
    #[serde(default, deserialize_with = "null_as_default")]
    pub data: Vec<BlobSidecar>,
}

impl BlobSidecars {
    /// Creates the list from sidecars in index order.
    pub const fn new(data: Vec<BlobSidecar>) -> Self {
        Self { data }
    }

    /// Size of the SSZ encoding: the number of sidecars times [`BLOB_SIDECAR_SIZE`].
    pub fn size_ssz(&self) -> usize {
        self.data.len() * BLOB_SIDECAR_SIZE
    }

    /// Encodes the list as the concatenation of the fixed-size sidecar encodings.
    ///
    /// Fails with [`StorageError::Marshaling`] if a sidecar carries a blob of the wrong length.
    pub fn encode_ssz(&self) -> Result<Vec<u8>, StorageError> {
        let mut out = Vec::with_capacity(self.size_ssz());
        for sidecar in &self.data {
            sidecar.encode_ssz(&mut out)?;
        }
        Ok(out)
    }

    /// Decodes a buffer produced by [`Self::encode_ssz`].
    ///
    /// Fails with [`StorageError::Marshaling`] if the length of `buf` is not a multiple of
    /// [`BLOB_SIDECAR_SIZE`].
    pub fn decode_ssz(buf: &[u8]) -> Result<Self, StorageError> {
        if buf.len() % BLOB_SIDECAR_SIZE != 0 {
            return Err(SszError::InvalidLength {
                expected: buf.len().next_multiple_of(BLOB_SIDECAR_SIZE),
                got: buf.len(),
            }
            .into())
        }
        let data = buf
            .chunks_exact(BLOB_SIDECAR_SIZE)
            .map(BlobSidecar::decode_ssz)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { data })
    }
}

/// One storage unit: the sidecars of a block keyed by the block root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobData {
    /// The key.
    pub header: Header,
    /// The payload.
    pub blob_sidecars: BlobSidecars,
}

impl BlobData {
    /// Creates the storage unit of the block `hash`.
    pub const fn new(hash: B256, sidecars: Vec<BlobSidecar>) -> Self {
        Self { header: Header { beacon_block_hash: hash }, blob_sidecars: BlobSidecars::new(sidecars) }
    }

    /// Root of the block the data belongs to.
    pub const fn hash(&self) -> B256 {
        self.header.beacon_block_hash
    }
}

/// Progress of one backward walk over the chain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackfillProcess {
    /// The block the walk started from.
    pub start_block: BlockHeader,
    /// The oldest block archived by the walk so far.
    pub current_block: BlockHeader,
}

impl BackfillProcess {
    /// A walk that has not made any progress yet.
    pub fn new(start: BlockHeader) -> Self {
        Self { current_block: start.clone(), start_block: start }
    }

    /// Root of the block the walk started from, its key in [`BackfillProcesses`].
    pub const fn start_hash(&self) -> B256 {
        self.start_block.root
    }
}

/// All known walks, keyed by the root of their start block.
pub type BackfillProcesses = BTreeMap<B256, BackfillProcess>;

/// The lease record of the single writer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lockfile {
    /// Identifier of the archiver holding the lease. Empty when nobody ever held it.
    pub archiver_id: String,
    /// Unix time in seconds of the last renewal.
    pub timestamp: u64,
}

impl Lockfile {
    /// Creates a lockfile held by `archiver_id` as of `timestamp`.
    pub fn new(archiver_id: impl Into<String>, timestamp: u64) -> Self {
        Self { archiver_id: archiver_id.into(), timestamp }
    }

    /// Returns `true` if the lease was never taken.
    pub fn is_empty(&self) -> bool {
        self.archiver_id.is_empty()
    }

    /// Returns `true` if the lease is older than `timeout` seconds at `now`.
    pub const fn is_stale(&self, now: u64, timeout: u64) -> bool {
        now.saturating_sub(self.timestamp) >= timeout
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
