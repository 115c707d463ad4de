//! Configuration files.

use alloy_primitives::B256;
use blob_archiver_storage::{config::StorageConfigError, StorageConfig};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of the blob archiver.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct Config {
    /// Behaviour of the chain walker and the lease.
    pub archiver: ArchiverConfig,
    /// Connection to the beacon node.
    pub beacon: BeaconConfig,
    /// Where the archive is kept.
    pub storage: StorageConfig,
}

impl Config {
    /// Checks the values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.archiver.validate()?;
        if self.beacon.url.is_empty() {
            return Err(ConfigError::MissingBeaconUrl)
        }
        self.storage.validate()?;
        Ok(())
    }
}

/// Configuration of the chain walker.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct ArchiverConfig {
    /// How often the beacon node is polled for a new head.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Oldest block to archive. Walks stop here. When zero, walks stop at the first block whose
    /// parent the beacon node does not know.
    pub origin_block: B256,
    /// Number of blocks the live walk archives inline before handing the rest of a gap to a
    /// backfill.
    pub max_live_walk_depth: u64,
    /// Pause before retrying a failed backfill step.
    #[serde(with = "humantime_serde")]
    pub backfill_error_retry_interval: Duration,
    /// Identity of this instance in the lockfile. A random id is used when unset.
    pub archiver_id: Option<String>,
    /// Lease settings.
    pub lock: LockConfig,
}

impl ArchiverConfig {
    /// Checks the values that cannot be expressed in the types.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::ZeroPollInterval)
        }
        if self.max_live_walk_depth == 0 {
            return Err(ConfigError::ZeroWalkDepth)
        }
        self.lock.validate()
    }
}

impl Default for ArchiverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(6),
            origin_block: B256::ZERO,
            max_live_walk_depth: 1024,
            backfill_error_retry_interval: Duration::from_secs(1),
            archiver_id: None,
            lock: LockConfig::default(),
        }
    }
}

/// Timing of the write lease.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct LockConfig {
    /// Age after which a lockfile no longer grants the lease. Lockfile timestamps have a
    /// resolution of one second.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// How often the holder renews the lease. Must be below `timeout`.
    #[serde(with = "humantime_serde")]
    pub update_interval: Duration,
    /// How often a waiting instance tries to take the lease.
    #[serde(with = "humantime_serde")]
    pub retry_interval: Duration,
}

impl LockConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.update_interval >= self.timeout {
            return Err(ConfigError::UpdateIntervalTooLong {
                update_interval: self.update_interval,
                timeout: self.timeout,
            })
        }
        if self.timeout.as_secs() == 0 {
            return Err(ConfigError::TimeoutTooShort(self.timeout))
        }
        Ok(())
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(20),
            update_interval: Duration::from_secs(10),
            retry_interval: Duration::from_secs(10),
        }
    }
}

/// Connection to the beacon node.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq, Serialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Base URL of the beacon node REST API.
    pub url: String,
    /// Timeout of a single request.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self { url: "http://localhost:5052".to_string(), timeout: Duration::from_secs(10) }
    }
}

/// Invalid configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The lease would expire between two renewals.
    #[error("lock update interval {update_interval:?} must be below the lock timeout {timeout:?}")]
    UpdateIntervalTooLong {
        /// Configured renewal interval.
        update_interval: Duration,
        /// Configured lease timeout.
        timeout: Duration,
    },
    /// The lease timeout is below the lockfile resolution.
    #[error("lock timeout {0:?} must be at least one second")]
    TimeoutTooShort(Duration),
    /// The poll interval is zero.
    #[error("poll interval must not be zero")]
    ZeroPollInterval,
    /// The live walk depth is zero.
    #[error("max live walk depth must not be zero")]
    ZeroWalkDepth,
    /// No beacon node configured.
    #[error("beacon node url is required")]
    MissingBeaconUrl,
    /// The storage section is invalid.
    #[error(transparent)]
    Storage(#[from] StorageConfigError),
}
