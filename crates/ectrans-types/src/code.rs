//! Coding parameters of a `(k_pre, m_pre) -> (k_post, m_post)` transition and
//! the cluster it runs on.

use ectrans_error::{Result, TransitionError};
use serde::{Deserialize, Serialize};

/// Erasure-coding parameters before and after a redundancy transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodingParams {
    pub k_pre: u16,
    pub m_pre: u16,
    pub k_post: u16,
    pub m_post: u16,
}

impl CodingParams {
    pub const fn new(k_pre: u16, m_pre: u16, k_post: u16, m_post: u16) -> Self {
        Self {
            k_pre,
            m_pre,
            k_post,
            m_post,
        }
    }

    /// Stripe width before the transition. Saturates at `u16::MAX`; `lambda`
    /// rejects parameters whose width overflows.
    pub const fn n_pre(&self) -> u16 {
        self.k_pre.saturating_add(self.m_pre)
    }

    /// Stripe width after the transition. Saturates like `n_pre`.
    pub const fn n_post(&self) -> u16 {
        self.k_post.saturating_add(self.m_post)
    }

    /// Fan-in ratio `k_post / k_pre`.
    ///
    /// Fails when any parameter is zero or `k_post` is not a whole multiple
    /// of `k_pre`.
    pub fn lambda(&self) -> Result<u16> {
        if self.k_pre == 0 || self.m_pre == 0 || self.k_post == 0 || self.m_post == 0 {
            return Err(TransitionError::config(format!(
                "coding parameters must be non-zero: ({}, {}) -> ({}, {})",
                self.k_pre, self.m_pre, self.k_post, self.m_post
            )));
        }
        if self.k_post % self.k_pre != 0 {
            return Err(TransitionError::config(format!(
                "k_post {} is not a multiple of k_pre {}",
                self.k_post, self.k_pre
            )));
        }
        if self.k_pre.checked_add(self.m_pre).is_none()
            || self.k_post.checked_add(self.m_post).is_none()
        {
            return Err(TransitionError::config("stripe width overflows u16"));
        }
        Ok(self.k_post / self.k_pre)
    }

    /// Splits a post-transition data block index into
    /// `(contributing stripe position, block index within that pre-stripe)`.
    pub const fn source_of(&self, post_block: u16) -> (u16, u16) {
        (post_block / self.k_pre, post_block % self.k_pre)
    }
}

/// Cluster size and pre-transition stripe count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClusterSettings {
    pub num_nodes: u16,
    pub num_stripes: u32,
}

impl ClusterSettings {
    pub const fn new(num_nodes: u16, num_stripes: u32) -> Self {
        Self {
            num_nodes,
            num_stripes,
        }
    }

    /// Check every relationship the transition needs, returning `lambda`.
    pub fn validate(&self, code: &CodingParams) -> Result<u16> {
        let lambda = code.lambda()?;
        if self.num_nodes == 0 || self.num_stripes == 0 {
            return Err(TransitionError::config(format!(
                "num_nodes ({}) and num_stripes ({}) must be non-zero",
                self.num_nodes, self.num_stripes
            )));
        }
        let widest = code.n_pre().max(code.n_post());
        if self.num_nodes < widest {
            return Err(TransitionError::config(format!(
                "num_nodes {} cannot hold a stripe of width {widest} on distinct nodes",
                self.num_nodes
            )));
        }
        if self.num_stripes % u32::from(lambda) != 0 {
            return Err(TransitionError::config(format!(
                "num_stripes {} is not a multiple of lambda {lambda}",
                self.num_stripes
            )));
        }
        Ok(lambda)
    }

    /// Number of post-transition stripes, once `validate` has passed.
    pub const fn num_post_stripes(&self, lambda: u16) -> u32 {
        self.num_stripes / lambda as u32
    }

    /// Copy with `num_stripes` rounded up to the nearest multiple of `lambda`.
    #[must_use]
    pub fn round_up_stripes(&self, lambda: u16) -> Self {
        let lambda = u32::from(lambda.max(1));
        Self {
            num_nodes: self.num_nodes,
            num_stripes: self.num_stripes.div_ceil(lambda) * lambda,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn lambda_exact_multiple() {
        let code = CodingParams::new(4, 2, 8, 2);
        assert_eq!(code.lambda().expect("valid"), 2);
        assert_eq!(code.n_pre(), 6);
        assert_eq!(code.n_post(), 10);
    }

    #[test]
    fn lambda_rejects_non_multiple() {
        let err = CodingParams::new(4, 2, 6, 2).lambda().expect_err("4 does not divide 6");
        assert!(err.is_config());
    }

    #[test]
    fn lambda_rejects_zero_parameters() {
        assert!(CodingParams::new(0, 2, 8, 2).lambda().is_err());
        assert!(CodingParams::new(4, 2, 8, 0).lambda().is_err());
    }

    #[test]
    fn widths_saturate_and_lambda_rejects_overflow() {
        let code = CodingParams::new(u16::MAX, 1, u16::MAX, 1);
        assert_eq!(code.n_pre(), u16::MAX);
        assert_eq!(code.n_post(), u16::MAX);
        assert!(code.lambda().expect_err("width overflows").is_config());
    }

    #[test]
    fn source_of_splits_by_k_pre() {
        let code = CodingParams::new(4, 2, 8, 2);
        assert_eq!(code.source_of(0), (0, 0));
        assert_eq!(code.source_of(3), (0, 3));
        assert_eq!(code.source_of(4), (1, 0));
        assert_eq!(code.source_of(7), (1, 3));
    }

    #[test]
    fn settings_reject_partial_stripe_groups() {
        let code = CodingParams::new(2, 1, 6, 2);
        let err = ClusterSettings::new(20, 1000)
            .validate(&code)
            .expect_err("1000 % 3 != 0");
        assert!(err.is_config());
        assert!(err.to_string().contains("lambda 3"));
    }

    #[test]
    fn round_up_fixes_partial_groups() {
        let code = CodingParams::new(2, 1, 6, 2);
        let settings = ClusterSettings::new(20, 1000).round_up_stripes(3);
        assert_eq!(settings.num_stripes, 1002);
        assert_eq!(settings.validate(&code).expect("valid"), 3);
        assert_eq!(settings.num_post_stripes(3), 334);
    }

    #[test]
    fn settings_reject_too_few_nodes() {
        let code = CodingParams::new(4, 2, 8, 2);
        assert!(ClusterSettings::new(9, 4).validate(&code).is_err());
        assert!(ClusterSettings::new(10, 4).validate(&code).is_ok());
    }

    #[test]
    fn settings_reject_empty_cluster() {
        let code = CodingParams::new(4, 2, 8, 2);
        assert!(ClusterSettings::new(10, 0).validate(&code).is_err());
    }

    proptest! {
        #[test]
        fn source_of_covers_every_post_data_block(
            k_pre in 1u16..64,
            lambda in 1u16..16,
            m in 1u16..8,
            num_stripes in 1u32..10_000,
        ) {
            let code = CodingParams::new(k_pre, m, k_pre * lambda, m);
            prop_assert_eq!(code.lambda().expect("integral lambda"), lambda);
            for block in 0..code.k_post {
                let (position, inner) = code.source_of(block);
                prop_assert!(position < lambda);
                prop_assert!(inner < k_pre);
                prop_assert_eq!(position * k_pre + inner, block);
            }

            let settings = ClusterSettings::new(code.n_pre().max(code.n_post()), num_stripes)
                .round_up_stripes(lambda);
            prop_assert!(settings.num_stripes >= num_stripes);
            prop_assert!(settings.num_stripes - num_stripes < u32::from(lambda));
            prop_assert_eq!(settings.validate(&code).expect("rounded settings valid"), lambda);
        }
    }
}
