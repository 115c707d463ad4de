//! Beacon chain types consumed by the blob archiver.
//!
//! Only the subset of the consensus types needed to archive blob sidecars lives here: block
//! headers as returned by the beacon node REST API, Deneb blob sidecars with their fixed-size SSZ
//! encoding, and block identifiers.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

mod block_id;
mod header;
pub mod serde_helpers;
mod sidecar;
mod ssz;

pub use block_id::{BlockId, ParseBlockIdError};
pub use header::{
    BeaconBlockHeader, BlockHeader, SignedBeaconBlockHeader, BEACON_BLOCK_HEADER_SIZE,
    SIGNED_BEACON_BLOCK_HEADER_SIZE,
};
pub use sidecar::{
    BlobSidecar, BLOB_SIDECAR_SIZE, BYTES_PER_BLOB, KZG_COMMITMENT_INCLUSION_PROOF_DEPTH,
};
pub use ssz::SszError;

use alloy_primitives::FixedBytes;

/// A BLS12-381 signature.
pub type BlsSignature = FixedBytes<96>;

/// A KZG commitment to a blob.
pub type KzgCommitment = FixedBytes<48>;

/// A KZG proof.
pub type KzgProof = FixedBytes<48>;
