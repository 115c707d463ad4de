//! Test helpers: a programmable in-memory beacon node and blob fixtures.

use crate::{BeaconClient, BeaconClientError};
use alloy_primitives::{Bytes, B256};
use blob_archiver_beacon_types::{
    BeaconBlockHeader, BlobSidecar, BlockHeader, BlockId, KzgCommitment,
    SignedBeaconBlockHeader, BYTES_PER_BLOB,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};

/// Slot of [`ORIGIN_BLOCK`] in the default test chain.
pub const START_SLOT: u64 = 10;

/// Parent of the origin block. Unknown to the stub.
pub const ORIGIN_PARENT: B256 = B256::repeat_byte(0x99);
/// Oldest block of the default test chain.
pub const ORIGIN_BLOCK: B256 = B256::repeat_byte(0x09);
/// Block at `START_SLOT + 1`.
pub const ONE: B256 = B256::repeat_byte(0x01);
/// Block at `START_SLOT + 2`, without blobs.
pub const TWO: B256 = B256::repeat_byte(0x02);
/// Block at `START_SLOT + 3`.
pub const THREE: B256 = B256::repeat_byte(0x03);
/// Block at `START_SLOT + 4`.
pub const FOUR: B256 = B256::repeat_byte(0x04);
/// Block at `START_SLOT + 5`, the head of the default test chain.
pub const FIVE: B256 = B256::repeat_byte(0x05);

/// Number of sidecars of each block of the default chain, origin first.
pub const DEFAULT_CHAIN_BLOBS: [(B256, usize); 6] =
    [(ORIGIN_BLOCK, 1), (ONE, 2), (TWO, 0), (THREE, 4), (FOUR, 5), (FIVE, 6)];

/// Builds a header envelope for `root` at `slot` with the given parent.
pub fn make_header(slot: u64, root: B256, parent_root: B256) -> BlockHeader {
    BlockHeader {
        root,
        canonical: true,
        header: SignedBeaconBlockHeader {
            message: BeaconBlockHeader { slot, parent_root, ..Default::default() },
            signature: Default::default(),
        },
    }
}

/// Returns `count` well-formed sidecars for a block at `slot`.
///
/// The content is deterministic: the same arguments always produce the same sidecars.
pub fn blob_sidecars(slot: u64, count: usize) -> Vec<BlobSidecar> {
    (0..count as u64)
        .map(|index| {
            let mut blob = vec![0u8; BYTES_PER_BLOB];
            for (i, byte) in blob.iter_mut().enumerate().step_by(4096) {
                *byte = (slot as u8).wrapping_add(index as u8).wrapping_add(i as u8);
            }
            BlobSidecar {
                index,
                blob: Bytes::from(blob),
                kzg_commitment: KzgCommitment::repeat_byte(index as u8),
                signed_block_header: SignedBeaconBlockHeader {
                    message: BeaconBlockHeader { slot, ..Default::default() },
                    signature: Default::default(),
                },
                ..Default::default()
            }
        })
        .collect()
}

#[derive(Debug, Default)]
struct StubState {
    headers: HashMap<String, BlockHeader>,
    blobs: HashMap<String, Vec<BlobSidecar>>,
    failing: HashSet<String>,
    header_requests: Vec<String>,
    sidecar_requests: Vec<String>,
}

/// A [`BeaconClient`] answering from in-memory maps.
///
/// Blocks are addressable by root, slot and by the `head` and `finalized` aliases, like on a real
/// beacon node. Unknown ids yield [`BeaconClientError::NotFound`]; ids marked with
/// [`StubBeaconClient::fail`] yield a transient error instead.
#[derive(Debug, Default)]
pub struct StubBeaconClient {
    state: RwLock<StubState>,
}

impl StubBeaconClient {
    /// Creates a stub that knows no blocks.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a stub serving the default chain: origin, one, ..., five, with `head` at five and
    /// `finalized` at three.
    pub fn with_default_chain() -> Self {
        let stub = Self::empty();
        let mut parent = ORIGIN_PARENT;
        for (offset, (root, blobs)) in DEFAULT_CHAIN_BLOBS.into_iter().enumerate() {
            let slot = START_SLOT + offset as u64;
            stub.insert_block(make_header(slot, root, parent), blob_sidecars(slot, blobs));
            parent = root;
        }
        stub.set_alias(BlockId::Head, FIVE);
        stub.set_alias(BlockId::Finalized, THREE);
        stub
    }

    /// Registers a block under its root and its slot.
    pub fn insert_block(&self, header: BlockHeader, sidecars: Vec<BlobSidecar>) {
        let mut state = self.state.write();
        for id in [BlockId::Root(header.root), BlockId::Slot(header.slot())] {
            state.headers.insert(id.to_string(), header.clone());
            state.blobs.insert(id.to_string(), sidecars.clone());
        }
    }

    /// Points `alias` (usually `head` or `finalized`) at the already registered block `root`.
    pub fn set_alias(&self, alias: BlockId, root: B256) {
        let mut state = self.state.write();
        let key = BlockId::Root(root).to_string();
        if let Some(header) = state.headers.get(&key).cloned() {
            state.headers.insert(alias.to_string(), header);
        }
        if let Some(blobs) = state.blobs.get(&key).cloned() {
            state.blobs.insert(alias.to_string(), blobs);
        }
    }

    /// Makes every request for `id` fail with a transient error until [`Self::recover`].
    pub fn fail(&self, id: BlockId) {
        self.state.write().failing.insert(id.to_string());
    }

    /// Undoes [`Self::fail`].
    pub fn recover(&self, id: BlockId) {
        self.state.write().failing.remove(&id.to_string());
    }

    /// Ids of all header requests served so far, in order.
    pub fn header_requests(&self) -> Vec<String> {
        self.state.read().header_requests.clone()
    }

    /// Ids of all sidecar requests served so far, in order.
    pub fn sidecar_requests(&self) -> Vec<String> {
        self.state.read().sidecar_requests.clone()
    }
}

impl BeaconClient for StubBeaconClient {
    async fn beacon_block_header(&self, id: BlockId) -> Result<BlockHeader, BeaconClientError> {
        let mut state = self.state.write();
        let key = id.to_string();
        state.header_requests.push(key.clone());
        if state.failing.contains(&key) {
            return Err(BeaconClientError::Other(format!("stub: block {key} unavailable")))
        }
        state.headers.get(&key).cloned().ok_or(BeaconClientError::NotFound(id))
    }

    async fn blob_sidecars(&self, id: BlockId) -> Result<Vec<BlobSidecar>, BeaconClientError> {
        let mut state = self.state.write();
        let key = id.to_string();
        state.sidecar_requests.push(key.clone());
        if state.failing.contains(&key) {
            return Err(BeaconClientError::Other(format!("stub: block {key} unavailable")))
        }
        state.blobs.get(&key).cloned().ok_or(BeaconClientError::NotFound(id))
    }
}
