//! Transition Reconciler.
//!
//! Combines the pre-transition provenance table with the solver's post
//! placement and stripe-group metadata into the post-transition provenance
//! table. A carried-over data block is relocated, not recomputed: its file
//! keeps its name and moves under the directory of the node that now owns
//! it. A parity block gets a fresh `post_block_<stripe>_<block>` name.
//!
//! Every cross-artifact check runs before any stripe is reconciled. Stripes
//! are independent of each other and are processed on scoped worker
//! threads; the merged table does not depend on scheduling.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::thread;

use ectrans_error::{Result, TransitionError};
use ectrans_meta::{PlacementRecord, ProvenanceTable, StripeGroupRecord, stripe_of};
use ectrans_types::{
    BlockIndex, BlockKey, BlockLocation, ClusterSettings, CodingParams, EncodeMethod, NodeId,
    ProvenanceEntry, StripeId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything one reconciliation reads. Nothing here is mutated.
#[derive(Debug, Clone, Copy)]
pub struct ReconcileInput<'a> {
    pub code: CodingParams,
    pub settings: ClusterSettings,
    /// Pre-transition provenance. Ignored in managed-filesystem mode.
    pub pre: &'a ProvenanceTable,
    pub post_placement: &'a [PlacementRecord],
    pub stripe_groups: &'a [StripeGroupRecord],
    pub data_dir: &'a Path,
    /// Emit pending locations instead of paths.
    pub managed_fs: bool,
    /// Worker threads; 0 uses the available parallelism.
    pub workers: usize,
}

/// Block and stripe counters of one reconciliation.
///
/// `retained` and `relocated` only count data blocks whose pre-transition
/// node is known, so both stay zero in managed-filesystem mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileStats {
    /// Data blocks whose owning node did not change.
    pub retained: u64,
    /// Data blocks catalogued under a different node.
    pub relocated: u64,
    /// Parity blocks that still have to be computed.
    pub minted: u64,
    /// Entries left for an external catalog to resolve.
    pub deferred: u64,
    pub re_encode_stripes: u64,
    pub parity_merge_stripes: u64,
}

impl ReconcileStats {
    fn absorb(&mut self, other: &Self) {
        self.retained += other.retained;
        self.relocated += other.relocated;
        self.minted += other.minted;
        self.deferred += other.deferred;
        self.re_encode_stripes += other.re_encode_stripes;
        self.parity_merge_stripes += other.parity_merge_stripes;
    }
}

/// Output of a successful reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub table: ProvenanceTable,
    pub stats: ReconcileStats,
}

#[derive(Debug)]
struct StripeOutcome {
    entries: Vec<ProvenanceEntry>,
    stats: ReconcileStats,
}

pub fn available_parallelism_or_one() -> usize {
    thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Build the post-transition provenance table.
///
/// Fails with a configuration error before touching any record when the
/// coding parameters or stripe count are inconsistent, and with an artifact
/// mismatch when the solver outputs disagree with each other or do not
/// consume every pre-transition stripe exactly once.
pub fn reconcile(input: &ReconcileInput<'_>) -> Result<Reconciliation> {
    let lambda = input.settings.validate(&input.code)?;
    check_artifacts(input, lambda)?;

    let groups = input.stripe_groups;
    let workers = effective_workers(input.workers, groups.len());
    let outcomes = if workers <= 1 {
        groups
            .iter()
            .enumerate()
            .map(|(index, group)| reconcile_stripe(input, index, group))
            .collect::<Result<Vec<_>>>()?
    } else {
        reconcile_parallel(input, workers)?
    };

    let mut table = ProvenanceTable::new();
    let mut stats = ReconcileStats::default();
    for outcome in outcomes {
        stats.absorb(&outcome.stats);
        for entry in outcome.entries {
            table.insert(entry)?;
        }
    }
    info!(
        post_stripes = groups.len(),
        entries = table.len(),
        workers,
        retained = stats.retained,
        relocated = stats.relocated,
        minted = stats.minted,
        deferred = stats.deferred,
        "reconciliation finished"
    );
    Ok(Reconciliation { table, stats })
}

fn effective_workers(requested: usize, stripes: usize) -> usize {
    let requested = if requested == 0 {
        available_parallelism_or_one()
    } else {
        requested
    };
    requested.min(stripes).max(1)
}

fn reconcile_parallel(input: &ReconcileInput<'_>, workers: usize) -> Result<Vec<StripeOutcome>> {
    let groups = input.stripe_groups;
    let chunk_len = groups.len().div_ceil(workers);
    thread::scope(|scope| {
        let handles: Vec<_> = groups
            .chunks(chunk_len)
            .enumerate()
            .map(|(chunk, part)| {
                let first = chunk * chunk_len;
                scope.spawn(move || {
                    part.iter()
                        .enumerate()
                        .map(|(offset, group)| reconcile_stripe(input, first + offset, group))
                        .collect::<Result<Vec<_>>>()
                })
            })
            .collect();

        // Joined in chunk order, so the first error seen belongs to the
        // lowest failing stripe.
        let mut outcomes = Vec::with_capacity(groups.len());
        for handle in handles {
            let part = handle
                .join()
                .map_err(|_| TransitionError::internal("reconciler worker panicked"))??;
            outcomes.extend(part);
        }
        Ok(outcomes)
    })
}

fn check_artifacts(input: &ReconcileInput<'_>, lambda: u16) -> Result<()> {
    let groups = input.stripe_groups;
    let expected = input.settings.num_post_stripes(lambda) as usize;
    if groups.len() != input.post_placement.len() {
        return Err(TransitionError::mismatch(format!(
            "{} stripe-group records but {} post placement rows",
            groups.len(),
            input.post_placement.len()
        )));
    }
    if groups.len() != expected {
        return Err(TransitionError::mismatch(format!(
            "{} stripe-group records, expected {expected} for {} pre-transition stripes",
            groups.len(),
            input.settings.num_stripes
        )));
    }

    let n_post = usize::from(input.code.n_post());
    let mut consumed = vec![false; input.settings.num_stripes as usize];
    for (index, (group, placement)) in groups.iter().zip(input.post_placement).enumerate() {
        if group.contributing.len() != usize::from(lambda) || group.nodes.len() != n_post {
            return Err(TransitionError::mismatch(format!(
                "stripe group {index} has {} contributing stripes and {} nodes, expected {lambda} and {n_post}",
                group.contributing.len(),
                group.nodes.len()
            )));
        }
        if group.nodes.as_slice() != placement.nodes() {
            return Err(TransitionError::mismatch(format!(
                "stripe group {index} assigns nodes that differ from post placement row {index}"
            )));
        }
        for pre_id in &group.contributing {
            match consumed.get_mut(pre_id.index()) {
                None => {
                    return Err(TransitionError::mismatch(format!(
                        "stripe group {index} names pre-transition stripe {pre_id}, only {} exist",
                        input.settings.num_stripes
                    )));
                }
                Some(seen) if *seen => {
                    return Err(TransitionError::mismatch(format!(
                        "pre-transition stripe {pre_id} is consumed more than once (again by group {index})"
                    )));
                }
                Some(seen) => *seen = true,
            }
        }
    }
    Ok(())
}

fn reconcile_stripe(
    input: &ReconcileInput<'_>,
    index: usize,
    group: &StripeGroupRecord,
) -> Result<StripeOutcome> {
    let stripe = stripe_of(index)?;
    let code = &input.code;
    let mut stats = ReconcileStats::default();
    match group.method {
        EncodeMethod::ReEncode => stats.re_encode_stripes += 1,
        EncodeMethod::ParityMerge => stats.parity_merge_stripes += 1,
    }

    let mut entries = Vec::with_capacity(group.nodes.len());
    for (block, &node) in (0..code.n_post()).zip(&group.nodes) {
        let location = if block < code.k_post {
            let (position, pre_block) = code.source_of(block);
            let pre_stripe = group.contributing[usize::from(position)];
            let source = BlockKey {
                stripe: pre_stripe,
                block: BlockIndex::new(pre_block),
            };
            if input.managed_fs {
                stats.deferred += 1;
                BlockLocation::Pending {
                    source: Some(source),
                }
            } else {
                let (pre_node, pre_location) =
                    input
                        .pre
                        .get(&source)
                        .ok_or(TransitionError::MissingProvenance {
                            stripe: pre_stripe.get(),
                            block: pre_block,
                        })?;
                if pre_node == node {
                    stats.retained += 1;
                } else {
                    stats.relocated += 1;
                }
                match pre_location {
                    BlockLocation::Local(path) => {
                        BlockLocation::Local(relocate(input.data_dir, node, path, source)?)
                    }
                    BlockLocation::Pending { .. } => {
                        stats.deferred += 1;
                        BlockLocation::Pending {
                            source: Some(source),
                        }
                    }
                }
            }
        } else {
            stats.minted += 1;
            if input.managed_fs {
                stats.deferred += 1;
                BlockLocation::Pending { source: None }
            } else {
                BlockLocation::Local(parity_path(input.data_dir, node, stripe, block))
            }
        };
        entries.push(ProvenanceEntry {
            key: BlockKey {
                stripe,
                block: BlockIndex::new(block),
            },
            node,
            location,
        });
    }
    debug!(stripe = %stripe, method = %group.method, blocks = entries.len(), "stripe reconciled");
    Ok(StripeOutcome { entries, stats })
}

fn relocate(
    data_dir: &Path,
    node: NodeId,
    pre_path: &Path,
    source: BlockKey,
) -> Result<PathBuf> {
    let file_name = pre_path.file_name().ok_or_else(|| {
        TransitionError::mismatch(format!(
            "pre-transition location '{}' of {source} names no file",
            pre_path.display()
        ))
    })?;
    Ok(data_dir.join(node.dir_name()).join(file_name))
}

/// Path of a newly minted parity block.
pub fn parity_path(
    data_dir: &Path,
    node: NodeId,
    stripe: StripeId,
    block: u16,
) -> PathBuf {
    data_dir
        .join(node.dir_name())
        .join(format!("post_block_{stripe}_{block}"))
}
