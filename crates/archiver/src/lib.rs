//! Chain-aware archiving of beacon chain blob sidecars.
//!
//! The [`Archiver`] follows the chain head reported by a beacon node, walks parent links back to
//! the newest archived block, and writes the blob sidecars of every block it passes to a
//! [`DataStore`](blob_archiver_storage::DataStore). Historical gaps are closed by resumable
//! backfills tracked in [`BackfillTracker`]. Only the instance holding the [`Lease`] managed by
//! [`LockCoordinator`] writes; any number of instances may run against the same archive.

#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::future::Future;
use tokio_util::sync::CancellationToken;

mod archiver;
pub use archiver::{Archiver, RearchiveError};

mod backfill;
pub use backfill::BackfillTracker;

pub mod config;
pub use config::{ArchiverConfig, BeaconConfig, Config, ConfigError, LockConfig};

mod error;
pub use error::ArchiverError;

mod lock;
pub use lock::{unix_now, Lease, LockCoordinator, LockState};

/// Drives `fut` to completion unless `cancel` fires first.
pub(crate) async fn or_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, ArchiverError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(ArchiverError::Cancelled),
        out = fut => Ok(out),
    }
}
