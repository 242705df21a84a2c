//! Stripe-Group Metadata Resolver.
//!
//! Row `s` describes post-transition stripe `s`:
//! `lambda` contributing pre-stripe ids, one encode-method id, then
//! `k_post + m_post` node ids.

use std::path::Path;

use ectrans_error::{Result, TransitionError};
use ectrans_types::{BlockIndex, CodingParams, EncodeMethod, NodeId, StripeId};
use tracing::info;

use crate::placement::node_field;
use crate::text::{self, field};

/// Expected row shape of a stripe-group metadata file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StripeGroupShape {
    pub lambda: u16,
    /// `k_post + m_post`.
    pub width: u16,
    pub num_nodes: u16,
}

impl StripeGroupShape {
    /// Shape for a validated code; fails when `lambda` is not integral.
    pub fn for_code(code: &CodingParams, num_nodes: u16) -> Result<Self> {
        Ok(Self {
            lambda: code.lambda()?,
            width: code.n_post(),
            num_nodes,
        })
    }

    pub fn fields_per_row(&self) -> usize {
        usize::from(self.lambda) + 1 + usize::from(self.width)
    }
}

/// Solver output for one post-transition stripe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StripeGroupRecord {
    pub contributing: Vec<StripeId>,
    pub method: EncodeMethod,
    pub nodes: Vec<NodeId>,
}

impl StripeGroupRecord {
    pub fn node(&self, block: BlockIndex) -> Option<NodeId> {
        self.nodes.get(block.index()).copied()
    }
}

/// Parse every row before returning; a single bad row fails the whole file.
pub fn parse_stripe_groups(path: &Path, shape: StripeGroupShape) -> Result<Vec<StripeGroupRecord>> {
    let text = text::read_text(path)?;
    let rows = text::rows(path, &text)?;
    let lambda = usize::from(shape.lambda);
    let expected = shape.fields_per_row();
    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        if row.tokens.len() != expected {
            return Err(TransitionError::parse(
                path,
                row.line,
                format!(
                    "expected {expected} fields (lambda {} + method + width {}), got {}",
                    shape.lambda,
                    shape.width,
                    row.tokens.len()
                ),
            ));
        }
        let mut contributing = Vec::with_capacity(lambda);
        for column in 0..lambda {
            contributing.push(StripeId::new(field(path, row, column, "pre-stripe id")?));
        }
        let method_id: u8 = field(path, row, lambda, "encode method")?;
        let method = EncodeMethod::from_id(method_id).ok_or_else(|| {
            TransitionError::parse(path, row.line, format!("unknown encode method {method_id}"))
        })?;
        let mut nodes = Vec::with_capacity(usize::from(shape.width));
        for column in lambda + 1..expected {
            nodes.push(node_field(path, row, column, shape.num_nodes)?);
        }
        records.push(StripeGroupRecord {
            contributing,
            method,
            nodes,
        });
    }
    info!(
        path = %path.display(),
        groups = records.len(),
        lambda = shape.lambda,
        "stripe-group metadata parsed"
    );
    Ok(records)
}

#[must_use]
pub fn render_stripe_groups(records: &[StripeGroupRecord]) -> String {
    let mut out = String::new();
    for record in records {
        let mut tokens: Vec<String> = record
            .contributing
            .iter()
            .map(ToString::to_string)
            .collect();
        tokens.push(record.method.id().to_string());
        tokens.extend(record.nodes.iter().map(ToString::to_string));
        out.push_str(&tokens.join(" "));
        out.push('\n');
    }
    out
}

pub fn save_stripe_groups(records: &[StripeGroupRecord], path: &Path) -> Result<()> {
    text::write_atomic(path, render_stripe_groups(records).as_bytes())
}
