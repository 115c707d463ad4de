//! Deneb blob sidecars.

use crate::{
    header::{SignedBeaconBlockHeader, SIGNED_BEACON_BLOCK_HEADER_SIZE},
    serde_helpers::quoted_u64,
    ssz::{SszError, SszReader},
    KzgCommitment, KzgProof,
};
use alloy_primitives::{Bytes, B256};
use serde::{Deserialize, Serialize};

/// Size of a blob in bytes.
pub const BYTES_PER_BLOB: usize = 131_072;

/// Depth of the merkle proof of a KZG commitment against the block body root.
pub const KZG_COMMITMENT_INCLUSION_PROOF_DEPTH: usize = 17;

/// SSZ size of a [`BlobSidecar`].
///
/// All fields of the container are fixed-size, so every sidecar encodes to exactly this many
/// bytes.
pub const BLOB_SIDECAR_SIZE: usize = 8 +
    BYTES_PER_BLOB +
    48 +
    48 +
    SIGNED_BEACON_BLOCK_HEADER_SIZE +
    KZG_COMMITMENT_INCLUSION_PROOF_DEPTH * 32;

/// A blob together with its commitment, proof and the header of the block it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlobSidecar {
    /// Index of the blob within the block.
    #[serde(with = "quoted_u64")]
    pub index: u64,
    /// The blob, [`BYTES_PER_BLOB`] bytes.
    pub blob: Bytes,
    /// KZG commitment to the blob.
    pub kzg_commitment: KzgCommitment,
    /// KZG proof of the blob against the commitment.
    pub kzg_proof: KzgProof,
    /// Header of the block carrying the blob.
    pub signed_block_header: SignedBeaconBlockHeader,
    /// Proof that the commitment is part of the block body.
    pub kzg_commitment_inclusion_proof: [B256; KZG_COMMITMENT_INCLUSION_PROOF_DEPTH],
}

impl Default for BlobSidecar {
    fn default() -> Self {
        Self {
            index: 0,
            blob: Bytes::from(vec![0u8; BYTES_PER_BLOB]),
            kzg_commitment: Default::default(),
            kzg_proof: Default::default(),
            signed_block_header: Default::default(),
            kzg_commitment_inclusion_proof: Default::default(),
        }
    }
}

impl BlobSidecar {
    /// Appends the SSZ encoding of the sidecar to `out`.
    ///
    /// Exactly [`BLOB_SIDECAR_SIZE`] bytes are written on success. A blob of any other length
    /// than [`BYTES_PER_BLOB`] is rejected and nothing is written.
    pub fn encode_ssz(&self, out: &mut Vec<u8>) -> Result<(), SszError> {
        if self.blob.len() != BYTES_PER_BLOB {
            return Err(SszError::InvalidBlobLength { expected: BYTES_PER_BLOB, got: self.blob.len() })
        }

        out.reserve(BLOB_SIDECAR_SIZE);
        out.extend_from_slice(&self.index.to_le_bytes());
        out.extend_from_slice(&self.blob);
        out.extend_from_slice(self.kzg_commitment.as_slice());
        out.extend_from_slice(self.kzg_proof.as_slice());
        self.signed_block_header.encode_ssz(out);
        for node in &self.kzg_commitment_inclusion_proof {
            out.extend_from_slice(node.as_slice());
        }
        Ok(())
    }

    /// Decodes a sidecar from exactly [`BLOB_SIDECAR_SIZE`] bytes.
    pub fn decode_ssz(buf: &[u8]) -> Result<Self, SszError> {
        if buf.len() != BLOB_SIDECAR_SIZE {
            return Err(SszError::InvalidLength { expected: BLOB_SIDECAR_SIZE, got: buf.len() })
        }

        let mut reader = SszReader::new(buf);
        let index = reader.read_u64()?;
        let blob = Bytes::copy_from_slice(reader.read_bytes(BYTES_PER_BLOB)?);
        let kzg_commitment = reader.read_fixed()?;
        let kzg_proof = reader.read_fixed()?;
        let signed_block_header = SignedBeaconBlockHeader::decode_ssz(&mut reader)?;
        let mut kzg_commitment_inclusion_proof = [B256::ZERO; KZG_COMMITMENT_INCLUSION_PROOF_DEPTH];
        for node in &mut kzg_commitment_inclusion_proof {
            *node = reader.read_fixed()?;
        }

        Ok(Self {
            index,
            blob,
            kzg_commitment,
            kzg_proof,
            signed_block_header,
            kzg_commitment_inclusion_proof,
        })
    }
}
