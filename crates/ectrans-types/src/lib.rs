//! Identifiers and value types shared by every transition crate.
//!
//! A stripe has `k` data blocks at indices `[0, k)` and `m` parity blocks at
//! `[k, k+m)`. Stripe ids are unique within one epoch (pre or post).

pub mod code;
pub mod config;
pub mod method;

use std::fmt;
use std::path::{Path, PathBuf};

pub use code::{ClusterSettings, CodingParams};
pub use config::{CommonConfig, PathsConfig, SolverConfig, TransitionConfig};
pub use method::{EncodeMethod, TransitionApproach};

/// Stripe identifier within one epoch.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct StripeId(u32);

impl StripeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Index form for slice lookups.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for StripeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Storage node identifier in `[0, num_nodes)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct NodeId(u16);

impl NodeId {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Directory name holding this node's blocks under the data root.
    #[must_use]
    pub fn dir_name(self) -> String {
        format!("node_{}", self.0)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Block position within a stripe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[repr(transparent)]
pub struct BlockIndex(u16);

impl BlockIndex {
    #[inline]
    pub const fn new(raw: u16) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BlockIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `(stripe, block)` key. Ordering is stripe-major, block-minor.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct BlockKey {
    pub stripe: StripeId,
    pub block: BlockIndex,
}

impl BlockKey {
    #[inline]
    pub const fn new(stripe: u32, block: u16) -> Self {
        Self {
            stripe: StripeId::new(stripe),
            block: BlockIndex::new(block),
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.stripe, self.block)
    }
}

/// Physical location recorded for one block.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockLocation {
    /// Locally addressable file.
    Local(PathBuf),
    /// Resolution deferred to an external storage catalog. `source` names
    /// the pre-transition block a data block was carried over from; it is
    /// `None` for a newly computed parity block.
    Pending { source: Option<BlockKey> },
}

impl BlockLocation {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local(path.into())
    }

    pub const fn is_pending(&self) -> bool {
        matches!(self, Self::Pending { .. })
    }

    pub fn as_path(&self) -> Option<&Path> {
        match self {
            Self::Local(path) => Some(path),
            Self::Pending { .. } => None,
        }
    }
}

/// One row of a block provenance table.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProvenanceEntry {
    pub key: BlockKey,
    pub node: NodeId,
    pub location: BlockLocation,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_key_orders_stripe_major() {
        let mut keys = vec![
            BlockKey::new(1, 0),
            BlockKey::new(0, 5),
            BlockKey::new(0, 1),
            BlockKey::new(2, 0),
            BlockKey::new(1, 3),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                BlockKey::new(0, 1),
                BlockKey::new(0, 5),
                BlockKey::new(1, 0),
                BlockKey::new(1, 3),
                BlockKey::new(2, 0),
            ]
        );
    }

    #[test]
    fn node_dir_name() {
        assert_eq!(NodeId::new(17).dir_name(), "node_17");
    }

    #[test]
    fn pending_location_has_no_path() {
        let pending = BlockLocation::Pending {
            source: Some(BlockKey::new(3, 1)),
        };
        assert!(pending.is_pending());
        assert!(pending.as_path().is_none());
        let local = BlockLocation::local("/data/node_1/block_0_0");
        assert_eq!(local.as_path(), Some(Path::new("/data/node_1/block_0_0")));
    }

    #[test]
    fn location_serde_shape() {
        let pending = BlockLocation::Pending { source: None };
        let json = serde_json::to_string(&pending).expect("serialize");
        assert_eq!(json, r#"{"pending":{"source":null}}"#);
    }
}
