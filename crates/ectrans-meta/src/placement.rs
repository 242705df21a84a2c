//! Placement Record Store: one row per stripe, one node id per block index.

use std::path::Path;

use ectrans_error::{Result, TransitionError};
use ectrans_types::{BlockIndex, NodeId, StripeId};
use tracing::info;

use crate::text::{self, field};

/// Expected row shape of a placement file for one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementShape {
    /// `k + m` of the epoch's code.
    pub width: u16,
    pub num_nodes: u16,
}

/// Node assignment of one stripe, indexed by block index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlacementRecord {
    nodes: Vec<NodeId>,
}

impl PlacementRecord {
    pub fn new(nodes: Vec<NodeId>) -> Self {
        Self { nodes }
    }

    pub fn from_raw(nodes: &[u16]) -> Self {
        Self::new(nodes.iter().copied().map(NodeId::new).collect())
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn width(&self) -> usize {
        self.nodes.len()
    }

    pub fn node(&self, block: BlockIndex) -> Option<NodeId> {
        self.nodes.get(block.index()).copied()
    }

    /// Whether every block sits on a distinct node.
    pub fn is_spread(&self) -> bool {
        let mut seen = self.nodes.clone();
        seen.sort_unstable();
        seen.windows(2).all(|pair| pair[0] != pair[1])
    }
}

/// Load placement records; row `i` describes stripe `i`.
pub fn load_placement(path: &Path, shape: PlacementShape) -> Result<Vec<PlacementRecord>> {
    let text = text::read_text(path)?;
    let rows = text::rows(path, &text)?;
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.tokens.len() != usize::from(shape.width) {
            return Err(TransitionError::parse(
                path,
                row.line,
                format!(
                    "expected {} node ids, got {}",
                    shape.width,
                    row.tokens.len()
                ),
            ));
        }
        let mut nodes = Vec::with_capacity(row.tokens.len());
        for column in 0..row.tokens.len() {
            nodes.push(node_field(path, row, column, shape.num_nodes)?);
        }
        records.push(PlacementRecord::new(nodes));
    }
    info!(
        path = %path.display(),
        stripes = records.len(),
        width = shape.width,
        "placement loaded"
    );
    Ok(records)
}

/// Render records in canonical form.
#[must_use]
pub fn render_placement(records: &[PlacementRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let row: Vec<String> = record.nodes().iter().map(ToString::to_string).collect();
        out.push_str(&row.join(" "));
        out.push('\n');
    }
    out
}

/// Save records, replacing `path` in one write.
pub fn save_placement(records: &[PlacementRecord], path: &Path) -> Result<()> {
    text::write_atomic(path, render_placement(records).as_bytes())
}

/// Stripe id of the `index`-th record.
pub fn stripe_of(index: usize) -> Result<StripeId> {
    u32::try_from(index)
        .map(StripeId::new)
        .map_err(|_| TransitionError::internal(format!("stripe index {index} exceeds u32")))
}

pub(crate) fn node_field(
    path: &Path,
    row: &text::Row<'_>,
    column: usize,
    num_nodes: u16,
) -> Result<NodeId> {
    let raw: u16 = field(path, row, column, "node id")?;
    if raw >= num_nodes {
        return Err(TransitionError::parse(
            path,
            row.line,
            format!("node id {raw} at column {column} is outside [0, {num_nodes})"),
        ));
    }
    Ok(NodeId::new(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHAPE: PlacementShape = PlacementShape {
        width: 3,
        num_nodes: 5,
    };

    fn write(dir: &tempfile::TempDir, contents: &str) -> std::path::PathBuf {
        let path = dir.path().join("placement");
        std::fs::write(&path, contents).expect("write fixture");
        path
    }

    #[test]
    fn load_then_save_is_byte_exact() {
        let dir = tempfile::tempdir().expect("tempdir");
        let contents = "0 1 2\n4 3 0\n2 1 4\n";
        let path = write(&dir, contents);
        let records = load_placement(&path, SHAPE).expect("load");
        assert_eq!(records.len(), 3);
        assert_eq!(records[1].node(BlockIndex::new(0)), Some(NodeId::new(4)));

        let out = dir.path().join("copy");
        save_placement(&records, &out).expect("save");
        assert_eq!(std::fs::read_to_string(out).expect("read"), contents);
    }

    #[test]
    fn solver_trailing_space_is_normalized() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(&dir, "0 1 2 \n4 3 0 \n");
        let records = load_placement(&path, SHAPE).expect("load");
        assert_eq!(render_placement(&records), "0 1 2\n4 3 0\n");
    }

    #[test]
    fn wrong_width_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(&dir, "0 1 2\n0 1\n");
        let err = load_placement(&path, SHAPE).expect_err("short row");
        assert!(err.is_input_error());
        assert!(err.to_string().contains("line 2: expected 3 node ids, got 2"));
    }

    #[test]
    fn out_of_range_node_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(&dir, "0 1 5\n");
        let err = load_placement(&path, SHAPE).expect_err("node 5 of 5");
        assert!(err.to_string().contains("outside [0, 5)"));
    }

    #[test]
    fn non_numeric_node_is_parse_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = write(&dir, "0 a 2\n");
        assert!(load_placement(&path, SHAPE).is_err());
    }

    #[test]
    fn spread_detects_collisions() {
        assert!(PlacementRecord::from_raw(&[0, 1, 2]).is_spread());
        assert!(!PlacementRecord::from_raw(&[0, 1, 0]).is_spread());
    }
}
