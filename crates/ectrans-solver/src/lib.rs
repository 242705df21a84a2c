//! Placement/transition solver adapters.
//!
//! A solver reads the pre-transition placement and writes two artifacts: the
//! post-transition placement and the stripe-group metadata. How it balances
//! load is its own business; callers only see [`TransitionSolver`].

pub mod external;
pub mod sequential;

use std::path::PathBuf;
use std::time::Duration;

use ectrans_error::{Result, TransitionError};
use ectrans_types::{ClusterSettings, CodingParams, TransitionApproach};

pub use external::ExternalSolver;
pub use sequential::SequentialSolver;

/// Inputs and output locations of one solver invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveRequest {
    pub code: CodingParams,
    pub settings: ClusterSettings,
    pub approach: TransitionApproach,
    pub pre_placement: PathBuf,
    pub post_placement: PathBuf,
    pub stripe_groups: PathBuf,
    /// Where to keep the execution log, if anywhere.
    pub log: Option<PathBuf>,
}

impl SolveRequest {
    /// Positional arguments in the solver process contract:
    /// `k_pre m_pre k_post m_post num_nodes num_stripes method pre post sg`.
    pub fn positional_args(&self) -> Vec<String> {
        vec![
            self.code.k_pre.to_string(),
            self.code.m_pre.to_string(),
            self.code.k_post.to_string(),
            self.code.m_post.to_string(),
            self.settings.num_nodes.to_string(),
            self.settings.num_stripes.to_string(),
            self.approach.as_str().to_owned(),
            self.pre_placement.display().to_string(),
            self.post_placement.display().to_string(),
            self.stripe_groups.display().to_string(),
        ]
    }

    /// Both output artifacts must exist once a solver reports success.
    pub fn check_outputs(&self) -> Result<()> {
        for (what, path) in [
            ("post placement", &self.post_placement),
            ("stripe-group metadata", &self.stripe_groups),
        ] {
            if !path.is_file() {
                return Err(TransitionError::solver(format!(
                    "solver exited successfully but did not write {what} at '{}'",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}

/// Result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolveOutcome {
    pub elapsed: Duration,
    pub log: Option<PathBuf>,
}

/// A pure function from epoch inputs to post placement + stripe groups.
pub trait TransitionSolver: Send + Sync {
    /// Short name for logs and reports.
    fn name(&self) -> &str;

    fn solve(&self, request: &SolveRequest) -> Result<SolveOutcome>;
}

impl<S: TransitionSolver + ?Sized> TransitionSolver for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn solve(&self, request: &SolveRequest) -> Result<SolveOutcome> {
        (**self).solve(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_args_follow_process_contract() {
        let request = SolveRequest {
            code: CodingParams::new(4, 2, 8, 2),
            settings: ClusterSettings::new(10, 4),
            approach: TransitionApproach::Balanced,
            pre_placement: PathBuf::from("/m/pre"),
            post_placement: PathBuf::from("/m/post"),
            stripe_groups: PathBuf::from("/m/sg"),
            log: None,
        };
        assert_eq!(
            request.positional_args(),
            vec!["4", "2", "8", "2", "10", "4", "BT", "/m/pre", "/m/post", "/m/sg"]
        );
    }

    #[test]
    fn missing_outputs_are_solver_failures() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = SolveRequest {
            code: CodingParams::new(4, 2, 8, 2),
            settings: ClusterSettings::new(10, 4),
            approach: TransitionApproach::Balanced,
            pre_placement: dir.path().join("pre"),
            post_placement: dir.path().join("post"),
            stripe_groups: dir.path().join("sg"),
            log: None,
        };
        std::fs::write(&request.post_placement, "").expect("write");
        let err = request.check_outputs().expect_err("sg missing");
        assert_eq!(err.error_code(), "solver_failure");
        assert!(err.to_string().contains("stripe-group metadata"));
    }
}
