//! Redundancy-transition metadata reconciliation.
//!
//! [`run_transition`] drives one transition: validate the configuration,
//! load the pre-transition epoch, invoke a [`TransitionSolver`], and
//! reconcile its artifacts into the post-transition block mapping.
//!
//! [`TransitionSolver`]: ectrans_solver::TransitionSolver

pub mod bootstrap;
pub mod pipeline;
pub mod reconcile;
pub mod report;

pub use bootstrap::{
    BootstrapSummary, bootstrap_epoch, derive_pre_provenance, generate_pre_placement,
};
pub use pipeline::{reconcile_artifacts, run_transition};
pub use reconcile::{
    ReconcileInput, ReconcileStats, Reconciliation, available_parallelism_or_one, parity_path,
    reconcile,
};
pub use report::{ArtifactPaths, TransitionReport, write_report_json};
