//! Block Provenance Table: `(stripe, block) -> (node, location)`.
//!
//! File rows are `stripe_id block_index node_id location`. A location is a
//! filesystem path, or a placeholder for a block that an external storage
//! catalog still has to resolve:
//! - `pending:<pre_stripe>:<pre_block>` for a carried-over data block
//! - `pending:new` for a newly computed parity block

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use ectrans_error::{Result, TransitionError};
use ectrans_types::{BlockKey, BlockLocation, NodeId, ProvenanceEntry};
use tracing::info;

use crate::text::{self, field};

const PENDING_PREFIX: &str = "pending:";
const PENDING_NEW: &str = "pending:new";
const ROW_FIELDS: usize = 4;

/// Ordered provenance table for one epoch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProvenanceTable {
    entries: BTreeMap<BlockKey, (NodeId, BlockLocation)>,
}

impl ProvenanceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry; a key may be recorded only once per epoch.
    pub fn insert(&mut self, entry: ProvenanceEntry) -> Result<()> {
        match self.entries.entry(entry.key) {
            Entry::Occupied(_) => Err(TransitionError::internal(format!(
                "duplicate provenance entry for {}",
                entry.key
            ))),
            Entry::Vacant(slot) => {
                slot.insert((entry.node, entry.location));
                Ok(())
            }
        }
    }

    pub fn get(&self, key: &BlockKey) -> Option<(NodeId, &BlockLocation)> {
        self.entries
            .get(key)
            .map(|(node, location)| (*node, location))
    }

    pub fn contains(&self, key: &BlockKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in stripe-major, block-minor order.
    pub fn iter(&self) -> impl Iterator<Item = (&BlockKey, NodeId, &BlockLocation)> {
        self.entries
            .iter()
            .map(|(key, (node, location))| (key, *node, location))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = text::read_text(path)?;
        let rows = text::rows(path, &text)?;
        let mut table = Self::new();
        for row in &rows {
            if row.tokens.len() != ROW_FIELDS {
                return Err(TransitionError::parse(
                    path,
                    row.line,
                    format!("expected {ROW_FIELDS} fields, got {}", row.tokens.len()),
                ));
            }
            let key = BlockKey::new(
                field(path, row, 0, "stripe id")?,
                field(path, row, 1, "block index")?,
            );
            let node = NodeId::new(field(path, row, 2, "node id")?);
            let location = decode_location(row.tokens[3]).ok_or_else(|| {
                TransitionError::parse(
                    path,
                    row.line,
                    format!("invalid pending location '{}'", row.tokens[3]),
                )
            })?;
            if table.contains(&key) {
                return Err(TransitionError::parse(
                    path,
                    row.line,
                    format!("duplicate entry for stripe {} block {}", key.stripe, key.block),
                ));
            }
            table.entries.insert(key, (node, location));
        }
        info!(path = %path.display(), entries = table.len(), "provenance table loaded");
        Ok(table)
    }

    /// Render in canonical stripe-major order.
    pub fn render(&self) -> Result<String> {
        let mut out = String::new();
        for (key, node, location) in self.iter() {
            let token = encode_location(location).ok_or_else(|| {
                TransitionError::internal(format!(
                    "location for {key} cannot be written as a single token: {location:?}"
                ))
            })?;
            out.push_str(&format!("{} {} {node} {token}\n", key.stripe, key.block));
        }
        Ok(out)
    }

    /// Save the whole table in one write. Nothing is written if any entry
    /// cannot be rendered.
    pub fn save(&self, path: &Path) -> Result<()> {
        let rendered = self.render()?;
        text::write_atomic(path, rendered.as_bytes())?;
        info!(path = %path.display(), entries = self.len(), "provenance table saved");
        Ok(())
    }
}

impl FromIterator<ProvenanceEntry> for ProvenanceTable {
    /// Later duplicates overwrite earlier ones; use [`ProvenanceTable::insert`]
    /// when duplicates must be rejected.
    fn from_iter<I: IntoIterator<Item = ProvenanceEntry>>(iter: I) -> Self {
        let entries = iter
            .into_iter()
            .map(|entry| (entry.key, (entry.node, entry.location)))
            .collect();
        Self { entries }
    }
}

fn encode_location(location: &BlockLocation) -> Option<String> {
    match location {
        BlockLocation::Local(path) => {
            let text = path.to_str()?;
            if text.is_empty()
                || text.starts_with(PENDING_PREFIX)
                || text.chars().any(char::is_whitespace)
            {
                return None;
            }
            Some(text.to_owned())
        }
        BlockLocation::Pending { source: None } => Some(PENDING_NEW.to_owned()),
        BlockLocation::Pending {
            source: Some(source),
        } => Some(format!("{PENDING_PREFIX}{}:{}", source.stripe, source.block)),
    }
}

fn decode_location(token: &str) -> Option<BlockLocation> {
    let Some(rest) = token.strip_prefix(PENDING_PREFIX) else {
        return Some(BlockLocation::Local(PathBuf::from(token)));
    };
    if rest == "new" {
        return Some(BlockLocation::Pending { source: None });
    }
    let (stripe, block) = rest.split_once(':')?;
    Some(BlockLocation::Pending {
        source: Some(BlockKey::new(stripe.parse().ok()?, block.parse().ok()?)),
    })
}
