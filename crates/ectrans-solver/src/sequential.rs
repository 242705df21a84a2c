//! In-process solver that merges consecutive pre-transition stripes.
//!
//! Post-stripe `s` draws from pre-stripes `s*lambda .. (s+1)*lambda`. Data
//! blocks stay on their pre-transition node unless that node already holds a
//! block of the same post-stripe; displaced blocks and all parity blocks take
//! the lowest-numbered free nodes. No load balancing is attempted.

use std::fs;
use std::time::Instant;

use ectrans_error::{Result, TransitionError};
use ectrans_meta::{
    PlacementRecord, PlacementShape, StripeGroupRecord, load_placement, save_placement,
    save_stripe_groups,
};
use ectrans_types::{CodingParams, EncodeMethod, NodeId, StripeId, TransitionApproach};
use tracing::{debug, info};

use crate::{SolveOutcome, SolveRequest, TransitionSolver};

#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialSolver;

impl SequentialSolver {
    pub const fn new() -> Self {
        Self
    }

    /// Compute post placement and stripe groups without touching disk.
    pub fn plan(
        code: &CodingParams,
        num_nodes: u16,
        approach: TransitionApproach,
        pre: &[PlacementRecord],
    ) -> Result<(Vec<PlacementRecord>, Vec<StripeGroupRecord>)> {
        let lambda = usize::from(code.lambda()?);
        let n_post = usize::from(code.n_post());
        if usize::from(num_nodes) < n_post {
            return Err(TransitionError::solver(format!(
                "{num_nodes} nodes cannot hold a post-transition stripe of width {n_post}"
            )));
        }
        if pre.len() % lambda != 0 {
            return Err(TransitionError::solver(format!(
                "{} pre-transition stripes do not form whole groups of {lambda}",
                pre.len()
            )));
        }
        let method = approach.fixed_method().unwrap_or(if code.m_post <= code.m_pre {
            EncodeMethod::ParityMerge
        } else {
            EncodeMethod::ReEncode
        });

        let mut placements = Vec::with_capacity(pre.len() / lambda);
        let mut groups = Vec::with_capacity(pre.len() / lambda);
        for (post_index, chunk) in pre.chunks(lambda).enumerate() {
            let first = post_index * lambda;
            let contributing = (first..first + lambda)
                .map(|index| {
                    u32::try_from(index).map(StripeId::new).map_err(|_| {
                        TransitionError::internal(format!("stripe index {index} exceeds u32"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            let nodes = assign_nodes(code, num_nodes, chunk)?;
            placements.push(PlacementRecord::new(nodes.clone()));
            groups.push(StripeGroupRecord {
                contributing,
                method,
                nodes,
            });
        }
        Ok((placements, groups))
    }
}

fn assign_nodes(
    code: &CodingParams,
    num_nodes: u16,
    chunk: &[PlacementRecord],
) -> Result<Vec<NodeId>> {
    let mut used = vec![false; usize::from(num_nodes)];
    let mut slots: Vec<Option<NodeId>> = vec![None; usize::from(code.n_post())];

    for block in 0..code.k_post {
        let (position, pre_block) = code.source_of(block);
        let original = chunk
            .get(usize::from(position))
            .and_then(|record| record.nodes().get(usize::from(pre_block)))
            .copied()
            .ok_or_else(|| {
                TransitionError::solver(format!(
                    "pre-transition stripe at group position {position} lacks block {pre_block}"
                ))
            })?;
        let taken = used.get_mut(original.index()).ok_or_else(|| {
            TransitionError::solver(format!("pre-transition node {original} outside cluster"))
        })?;
        if !*taken {
            *taken = true;
            slots[usize::from(block)] = Some(original);
        }
    }

    let mut free = (0..num_nodes).map(NodeId::new);
    let mut nodes = Vec::with_capacity(slots.len());
    for slot in slots {
        let node = match slot {
            Some(node) => node,
            None => loop {
                let candidate = free.next().ok_or_else(|| {
                    TransitionError::internal("ran out of free nodes during assignment")
                })?;
                if !used[candidate.index()] {
                    used[candidate.index()] = true;
                    break candidate;
                }
            },
        };
        nodes.push(node);
    }
    Ok(nodes)
}

impl TransitionSolver for SequentialSolver {
    fn name(&self) -> &str {
        "sequential"
    }

    fn solve(&self, request: &SolveRequest) -> Result<SolveOutcome> {
        let start = Instant::now();
        let pre = load_placement(
            &request.pre_placement,
            PlacementShape {
                width: request.code.n_pre(),
                num_nodes: request.settings.num_nodes,
            },
        )?;
        let (placements, groups) = Self::plan(
            &request.code,
            request.settings.num_nodes,
            request.approach,
            &pre,
        )?;
        save_placement(&placements, &request.post_placement)?;
        save_stripe_groups(&groups, &request.stripe_groups)?;
        let elapsed = start.elapsed();

        let retained = count_retained(&request.code, &pre, &placements);
        if let Some(log) = &request.log {
            let mut text = format!(
                "sequential solver: ({}, {}) -> ({}, {}), nodes {}, pre stripes {}, approach {}\n",
                request.code.k_pre,
                request.code.m_pre,
                request.code.k_post,
                request.code.m_post,
                request.settings.num_nodes,
                pre.len(),
                request.approach
            );
            text.push_str(&format!(
                "post stripes {}, data blocks kept in place {retained}, elapsed {} us\n",
                placements.len(),
                elapsed.as_micros()
            ));
            if let Some(parent) = log.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(log, text)?;
        }
        debug!(retained, "sequential plan kept data blocks in place");
        info!(
            post_stripes = placements.len(),
            elapsed_us = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX),
            "sequential solver finished"
        );
        Ok(SolveOutcome {
            elapsed,
            log: request.log.clone(),
        })
    }
}

fn count_retained(code: &CodingParams, pre: &[PlacementRecord], post: &[PlacementRecord]) -> usize {
    let lambda = usize::from(code.k_post / code.k_pre.max(1));
    post.iter()
        .enumerate()
        .map(|(post_index, record)| {
            (0..code.k_post)
                .filter(|&block| {
                    let (position, pre_block) = code.source_of(block);
                    let pre_record = &pre[post_index * lambda + usize::from(position)];
                    pre_record.nodes().get(usize::from(pre_block))
                        == record.nodes().get(usize::from(block))
                })
                .count()
        })
        .sum()
}
