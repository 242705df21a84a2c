//! Encode methods recorded per stripe group, and the solver approaches that
//! choose them.

use std::fmt;
use std::str::FromStr;

use ectrans_error::TransitionError;
use serde::{Deserialize, Serialize};

/// How a post-transition stripe's parity was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodeMethod {
    /// Parity recomputed from all `k_post` data blocks.
    ReEncode,
    /// Parity merged from the contributing stripes' parity blocks.
    ParityMerge,
}

impl EncodeMethod {
    /// Method id as written in stripe-group metadata.
    pub const fn id(self) -> u8 {
        match self {
            Self::ReEncode => 0,
            Self::ParityMerge => 1,
        }
    }

    pub const fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::ReEncode),
            1 => Some(Self::ParityMerge),
            _ => None,
        }
    }
}

impl fmt::Display for EncodeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReEncode => f.write_str("re_encode"),
            Self::ParityMerge => f.write_str("parity_merge"),
        }
    }
}

/// Transition approach handed to the placement solver.
///
/// `RD*` are random baselines, `BW*` bandwidth-optimized, `BT*` balanced;
/// the `RE`/`PM` suffix pins the encode method, plain `BT` lets the solver
/// pick per stripe group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransitionApproach {
    #[serde(rename = "RDRE")]
    RandomReEncode,
    #[serde(rename = "RDPM")]
    RandomParityMerge,
    #[serde(rename = "BWRE")]
    BandwidthReEncode,
    #[serde(rename = "BWPM")]
    BandwidthParityMerge,
    #[serde(rename = "BTRE")]
    BalancedReEncode,
    #[serde(rename = "BTPM")]
    BalancedParityMerge,
    #[serde(rename = "BT")]
    Balanced,
}

impl TransitionApproach {
    pub const ALL: [Self; 7] = [
        Self::RandomReEncode,
        Self::RandomParityMerge,
        Self::BandwidthReEncode,
        Self::BandwidthParityMerge,
        Self::BalancedReEncode,
        Self::BalancedParityMerge,
        Self::Balanced,
    ];

    /// Name passed verbatim to the solver.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RandomReEncode => "RDRE",
            Self::RandomParityMerge => "RDPM",
            Self::BandwidthReEncode => "BWRE",
            Self::BandwidthParityMerge => "BWPM",
            Self::BalancedReEncode => "BTRE",
            Self::BalancedParityMerge => "BTPM",
            Self::Balanced => "BT",
        }
    }

    /// Encode method forced by the approach, if any.
    pub const fn fixed_method(self) -> Option<EncodeMethod> {
        match self {
            Self::RandomReEncode | Self::BandwidthReEncode | Self::BalancedReEncode => {
                Some(EncodeMethod::ReEncode)
            }
            Self::RandomParityMerge | Self::BandwidthParityMerge | Self::BalancedParityMerge => {
                Some(EncodeMethod::ParityMerge)
            }
            Self::Balanced => None,
        }
    }
}

impl fmt::Display for TransitionApproach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransitionApproach {
    type Err = TransitionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|approach| approach.as_str() == s)
            .ok_or_else(|| {
                TransitionError::config(format!(
                    "unknown transition approach '{s}' (expected one of RDRE/RDPM/BWRE/BWPM/BTRE/BTPM/BT)"
                ))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_method_ids() {
        assert_eq!(EncodeMethod::from_id(0), Some(EncodeMethod::ReEncode));
        assert_eq!(EncodeMethod::from_id(1), Some(EncodeMethod::ParityMerge));
        assert_eq!(EncodeMethod::from_id(2), None);
        assert_eq!(EncodeMethod::ParityMerge.id(), 1);
    }

    #[test]
    fn approach_names_parse_back() {
        for approach in TransitionApproach::ALL {
            let parsed: TransitionApproach = approach.as_str().parse().expect("known name");
            assert_eq!(parsed, approach);
        }
    }

    #[test]
    fn unknown_approach_is_config_error() {
        let err = "BTXX".parse::<TransitionApproach>().expect_err("unknown");
        assert!(err.is_config());
    }

    #[test]
    fn fixed_method_follows_suffix() {
        assert_eq!(
            TransitionApproach::BandwidthParityMerge.fixed_method(),
            Some(EncodeMethod::ParityMerge)
        );
        assert_eq!(
            TransitionApproach::RandomReEncode.fixed_method(),
            Some(EncodeMethod::ReEncode)
        );
        assert_eq!(TransitionApproach::Balanced.fixed_method(), None);
    }
}
