//! Access to a beacon node for the blob archiver.
//!
//! The archiver consumes two read-only endpoints of a beacon node: block headers and blob
//! sidecars, both addressed by [`BlockId`]. [`BeaconClient`] abstracts over them so the archiver
//! can be driven by the [`HttpBeaconClient`] in production and by a stub in tests.
//!
//! ## Feature Flags
//!
//! - `test-utils`: Export [`test_utils::StubBeaconClient`] and blob fixtures.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use blob_archiver_beacon_types::{BlobSidecar, BlockHeader, BlockId};
use std::future::Future;

mod http;
pub use http::HttpBeaconClient;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

/// Errors returned by a [`BeaconClient`].
#[derive(Debug, thiserror::Error)]
pub enum BeaconClientError {
    /// The beacon node does not know the requested block.
    #[error("block {0} not found")]
    NotFound(BlockId),
    /// The request could not be sent or the response body could not be read.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// The beacon node answered with an unexpected status.
    #[error("beacon node responded with status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The response body is not the expected JSON.
    #[error("failed to decode beacon node response: {0}")]
    Decode(#[from] serde_json::Error),
    /// The configured endpoint is not a valid URL.
    #[error("invalid beacon node url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    /// Any other failure.
    #[error("{0}")]
    Other(String),
}

impl BeaconClientError {
    /// Returns `true` if the block is unknown to the beacon node.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Read access to the blocks and blob sidecars of a beacon node.
///
/// Both calls are idempotent and have no side effects.
#[auto_impl::auto_impl(&, Arc, Box)]
pub trait BeaconClient: Send + Sync {
    /// Returns the header of the identified block.
    fn beacon_block_header(
        &self,
        id: BlockId,
    ) -> impl Future<Output = Result<BlockHeader, BeaconClientError>> + Send;

    /// Returns the blob sidecars of the identified block, in index order.
    fn blob_sidecars(
        &self,
        id: BlockId,
    ) -> impl Future<Output = Result<Vec<BlobSidecar>, BeaconClientError>> + Send;
}
