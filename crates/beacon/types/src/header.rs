//! Beacon block headers as served by the beacon node REST API.

use crate::{
    serde_helpers::quoted_u64,
    ssz::{SszError, SszReader},
    BlsSignature,
};
use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// SSZ size of a [`BeaconBlockHeader`].
pub const BEACON_BLOCK_HEADER_SIZE: usize = 8 + 8 + 32 + 32 + 32;

/// SSZ size of a [`SignedBeaconBlockHeader`].
pub const SIGNED_BEACON_BLOCK_HEADER_SIZE: usize = BEACON_BLOCK_HEADER_SIZE + 96;

/// The phase0 beacon block header message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BeaconBlockHeader {
    /// Slot the block was proposed in.
    #[serde(with = "quoted_u64")]
    pub slot: u64,
    /// Validator index of the proposer.
    #[serde(with = "quoted_u64")]
    pub proposer_index: u64,
    /// Root of the parent block.
    pub parent_root: B256,
    /// Post state root.
    pub state_root: B256,
    /// Root of the block body.
    pub body_root: B256,
}

impl BeaconBlockHeader {
    pub(crate) fn encode_ssz(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.slot.to_le_bytes());
        out.extend_from_slice(&self.proposer_index.to_le_bytes());
        out.extend_from_slice(self.parent_root.as_slice());
        out.extend_from_slice(self.state_root.as_slice());
        out.extend_from_slice(self.body_root.as_slice());
    }

    pub(crate) fn decode_ssz(reader: &mut SszReader<'_>) -> Result<Self, SszError> {
        Ok(Self {
            slot: reader.read_u64()?,
            proposer_index: reader.read_u64()?,
            parent_root: reader.read_fixed()?,
            state_root: reader.read_fixed()?,
            body_root: reader.read_fixed()?,
        })
    }
}

/// A [`BeaconBlockHeader`] together with the proposer signature.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignedBeaconBlockHeader {
    /// The signed header.
    pub message: BeaconBlockHeader,
    /// BLS signature over the message.
    pub signature: BlsSignature,
}

impl SignedBeaconBlockHeader {
    pub(crate) fn encode_ssz(&self, out: &mut Vec<u8>) {
        self.message.encode_ssz(out);
        out.extend_from_slice(self.signature.as_slice());
    }

    pub(crate) fn decode_ssz(reader: &mut SszReader<'_>) -> Result<Self, SszError> {
        Ok(Self { message: BeaconBlockHeader::decode_ssz(reader)?, signature: reader.read_fixed()? })
    }
}

/// Response item of `GET /eth/v1/beacon/headers/{block_id}`.
///
/// This is also the form in which backfill progress is persisted, so the parent link of a walk's
/// frontier survives restarts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hash tree root of the block.
    pub root: B256,
    /// Whether the block is part of the canonical chain.
    #[serde(default)]
    pub canonical: bool,
    /// The signed header.
    pub header: SignedBeaconBlockHeader,
}

impl BlockHeader {
    /// Slot of the block.
    pub const fn slot(&self) -> u64 {
        self.header.message.slot
    }

    /// Root of the parent block.
    pub const fn parent_root(&self) -> B256 {
        self.header.message.parent_root
    }
}
