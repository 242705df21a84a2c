//! Immutable per-run record of a transition.

use std::path::{Path, PathBuf};

use ectrans_error::{Result, TransitionError};
use ectrans_meta::write_atomic;
use ectrans_types::{ClusterSettings, CodingParams, TransitionApproach};
use serde::{Deserialize, Serialize};

use crate::reconcile::ReconcileStats;

/// Files read and written by one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactPaths {
    pub pre_placement: PathBuf,
    /// Absent in managed-filesystem mode.
    pub pre_block_mapping: Option<PathBuf>,
    pub post_placement: PathBuf,
    pub stripe_group_meta: PathBuf,
    pub post_block_mapping: PathBuf,
    pub solver_log: Option<PathBuf>,
}

/// Outcome of one transition run. Aggregation across runs is left to
/// whoever collects these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionReport {
    pub code: CodingParams,
    pub settings: ClusterSettings,
    pub lambda: u16,
    pub approach: TransitionApproach,
    /// Solver name, or `None` when existing artifacts were reconciled.
    pub solver: Option<String>,
    pub managed_fs: bool,
    /// Bytes per block, as configured.
    pub block_size: u64,
    pub post_stripes: u64,
    pub blocks: ReconcileStats,
    pub solver_elapsed_ms: u64,
    pub elapsed_ms: u64,
    pub artifacts: ArtifactPaths,
}

impl TransitionReport {
    /// Data blocks carried over, wherever they ended up.
    pub const fn data_blocks(&self) -> u64 {
        self.blocks.retained + self.blocks.relocated
    }

    /// Bytes that moved between nodes for relocated data blocks.
    pub const fn relocated_bytes(&self) -> u64 {
        self.blocks.relocated.saturating_mul(self.block_size)
    }

    /// Serialize the report in a deterministic pretty JSON format.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Write report JSON to `path` in a single replace.
pub fn write_report_json(path: &Path, report: &TransitionReport) -> Result<()> {
    let mut payload = report
        .to_json()
        .map_err(|err| TransitionError::internal(format!("report serialization failed: {err}")))?;
    payload.push('\n');
    write_atomic(path, payload.as_bytes())
}
