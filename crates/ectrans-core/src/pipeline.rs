//! End-to-end redundancy transition.
//!
//! Nothing is written to the post-transition block mapping until every input
//! and both solver artifacts have parsed and the reconciliation has
//! succeeded in memory.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use ectrans_error::{Result, TransitionError};
use ectrans_meta::{
    PlacementRecord, PlacementShape, ProvenanceTable, StripeGroupShape, load_placement,
    parse_stripe_groups,
};
use ectrans_solver::{SolveRequest, TransitionSolver};
use ectrans_types::TransitionConfig;
use tracing::info;

use crate::reconcile::{ReconcileInput, reconcile};
use crate::report::{ArtifactPaths, TransitionReport};

/// Run the solver on the configured pre-transition epoch and reconcile its
/// output into the post-transition block mapping.
pub fn run_transition(
    config: &TransitionConfig,
    solver: &dyn TransitionSolver,
) -> Result<TransitionReport> {
    let start = Instant::now();
    let lambda = config.validate()?;
    let paths = &config.paths;

    let pre_placement = load_rows(
        &paths.pre_placement_path(),
        config,
        config.code().n_pre(),
        config.common.num_stripes,
    )?;
    let pre = load_pre_provenance(config)?;

    let request = SolveRequest {
        code: config.code(),
        settings: config.settings(),
        approach: config.common.approach,
        pre_placement: paths.pre_placement_path(),
        post_placement: paths.post_placement_path(),
        stripe_groups: paths.stripe_group_meta_path(),
        log: Some(paths.solver_log_path()),
    };
    info!(
        solver = solver.name(),
        pre_stripes = pre_placement.len(),
        approach = %config.common.approach,
        lambda,
        "invoking transition solver"
    );
    let outcome = solver.solve(&request)?;

    finish(
        config,
        lambda,
        &pre,
        Some(solver.name().to_owned()),
        outcome.elapsed,
        outcome.log,
        start,
    )
}

/// Reconcile solver artifacts that already exist on disk, without invoking
/// any solver.
pub fn reconcile_artifacts(config: &TransitionConfig) -> Result<TransitionReport> {
    let start = Instant::now();
    let lambda = config.validate()?;
    let pre = load_pre_provenance(config)?;
    finish(config, lambda, &pre, None, Duration::ZERO, None, start)
}

fn load_pre_provenance(config: &TransitionConfig) -> Result<ProvenanceTable> {
    if config.common.managed_fs {
        info!("managed filesystem: pre-transition paths stay with the external catalog");
        return Ok(ProvenanceTable::new());
    }
    ProvenanceTable::load(&config.paths.pre_block_mapping_path())
}

/// Load a placement file whose row count is known in advance.
fn load_rows(
    path: &Path,
    config: &TransitionConfig,
    width: u16,
    expected: u32,
) -> Result<Vec<PlacementRecord>> {
    let records = load_placement(
        path,
        PlacementShape {
            width,
            num_nodes: config.common.num_nodes,
        },
    )?;
    let expected = expected as usize;
    if records.len() != expected {
        return Err(TransitionError::parse(
            path,
            records.len().min(expected) + 1,
            format!("expected {expected} stripes, found {}", records.len()),
        ));
    }
    Ok(records)
}

fn finish(
    config: &TransitionConfig,
    lambda: u16,
    pre: &ProvenanceTable,
    solver: Option<String>,
    solver_elapsed: Duration,
    solver_log: Option<PathBuf>,
    start: Instant,
) -> Result<TransitionReport> {
    let paths = &config.paths;
    let code = config.code();
    let settings = config.settings();

    let post_placement_path = paths.post_placement_path();
    let stripe_group_path = paths.stripe_group_meta_path();
    let post = load_rows(
        &post_placement_path,
        config,
        code.n_post(),
        settings.num_post_stripes(lambda),
    )?;
    let groups = parse_stripe_groups(
        &stripe_group_path,
        StripeGroupShape::for_code(&code, settings.num_nodes)?,
    )?;

    let reconciliation = reconcile(&ReconcileInput {
        code,
        settings,
        pre,
        post_placement: &post,
        stripe_groups: &groups,
        data_dir: &paths.data_dir,
        managed_fs: config.common.managed_fs,
        workers: config.solver.workers,
    })?;

    let post_block_mapping = paths.post_block_mapping_path();
    reconciliation.table.save(&post_block_mapping)?;

    let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
    info!(
        post_stripes = groups.len(),
        entries = reconciliation.table.len(),
        elapsed_ms,
        mapping = %post_block_mapping.display(),
        "transition complete"
    );
    Ok(TransitionReport {
        code,
        settings,
        lambda,
        approach: config.common.approach,
        solver,
        managed_fs: config.common.managed_fs,
        block_size: config.common.block_size,
        post_stripes: groups.len() as u64,
        blocks: reconciliation.stats,
        solver_elapsed_ms: u64::try_from(solver_elapsed.as_millis()).unwrap_or(u64::MAX),
        elapsed_ms,
        artifacts: ArtifactPaths {
            pre_placement: paths.pre_placement_path(),
            pre_block_mapping: (!config.common.managed_fs)
                .then(|| paths.pre_block_mapping_path()),
            post_placement: post_placement_path,
            stripe_group_meta: stripe_group_path,
            post_block_mapping,
            solver_log,
        },
    })
}
