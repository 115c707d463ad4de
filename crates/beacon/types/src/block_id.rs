use alloy_primitives::B256;
use std::{fmt, str::FromStr};

/// Identifies a block in requests to the beacon node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockId {
    /// The canonical head as seen by the beacon node.
    Head,
    /// The latest finalized block.
    Finalized,
    /// The canonical block at the given slot.
    Slot(u64),
    /// The block with the given root.
    Root(B256),
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Head => f.write_str("head"),
            Self::Finalized => f.write_str("finalized"),
            Self::Slot(slot) => write!(f, "{slot}"),
            Self::Root(root) => write!(f, "{root:#x}"),
        }
    }
}

impl From<B256> for BlockId {
    fn from(root: B256) -> Self {
        Self::Root(root)
    }
}

impl From<u64> for BlockId {
    fn from(slot: u64) -> Self {
        Self::Slot(slot)
    }
}

/// Error returned when a string is not a valid [`BlockId`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid block id {0:?}: expected head, finalized, a slot or a 0x-prefixed root")]
pub struct ParseBlockIdError(String);

impl FromStr for BlockId {
    type Err = ParseBlockIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "head" => Ok(Self::Head),
            "finalized" => Ok(Self::Finalized),
            s if s.starts_with("0x") => {
                B256::from_str(s).map(Self::Root).map_err(|_| ParseBlockIdError(s.to_string()))
            }
            s => s.parse().map(Self::Slot).map_err(|_| ParseBlockIdError(s.to_string())),
        }
    }
}
