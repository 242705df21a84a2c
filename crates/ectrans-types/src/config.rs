//! TOML run configuration.
//!
//! ```toml
//! [common]
//! k_pre = 4
//! m_pre = 2
//! k_post = 8
//! m_post = 2
//! num_nodes = 10
//! num_stripes = 4
//! approach = "BT"
//!
//! [paths]
//! metadata_dir = "metadata"
//! data_dir = "data"
//!
//! [solver]
//! program = "build/BTSGenerator"
//! ```
//!
//! Artifact file names under `[paths]` resolve against `metadata_dir`
//! unless absolute. Relative directories resolve against the directory
//! holding the configuration file.

use std::path::{Path, PathBuf};

use ectrans_error::{Result, TransitionError};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::code::{ClusterSettings, CodingParams};
use crate::method::TransitionApproach;

pub const DEFAULT_BLOCK_SIZE: u64 = 1 << 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommonConfig {
    #[serde(alias = "k_i")]
    pub k_pre: u16,
    #[serde(alias = "m_i")]
    pub m_pre: u16,
    #[serde(alias = "k_f")]
    pub k_post: u16,
    #[serde(alias = "m_f")]
    pub m_post: u16,
    pub num_nodes: u16,
    pub num_stripes: u32,
    pub approach: TransitionApproach,
    /// Blocks live in a managed distributed filesystem whose own catalog
    /// resolves data-block paths.
    #[serde(default, alias = "enable_hdfs")]
    pub managed_fs: bool,
    #[serde(default = "default_block_size")]
    pub block_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    #[serde(default = "default_pre_placement")]
    pub pre_placement: PathBuf,
    #[serde(default = "default_pre_block_mapping")]
    pub pre_block_mapping: PathBuf,
    #[serde(default = "default_post_placement")]
    pub post_placement: PathBuf,
    #[serde(default = "default_post_block_mapping")]
    pub post_block_mapping: PathBuf,
    #[serde(default = "default_stripe_group_meta", alias = "sg_meta")]
    pub stripe_group_meta: PathBuf,
    #[serde(default = "default_solver_log")]
    pub solver_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
            data_dir: default_data_dir(),
            pre_placement: default_pre_placement(),
            pre_block_mapping: default_pre_block_mapping(),
            post_placement: default_post_placement(),
            post_block_mapping: default_post_block_mapping(),
            stripe_group_meta: default_stripe_group_meta(),
            solver_log: default_solver_log(),
        }
    }
}

impl PathsConfig {
    /// Resolve an artifact name against `metadata_dir`.
    #[must_use]
    pub fn artifact(&self, name: &Path) -> PathBuf {
        if name.is_absolute() {
            name.to_path_buf()
        } else {
            self.metadata_dir.join(name)
        }
    }

    pub fn pre_placement_path(&self) -> PathBuf {
        self.artifact(&self.pre_placement)
    }

    pub fn pre_block_mapping_path(&self) -> PathBuf {
        self.artifact(&self.pre_block_mapping)
    }

    pub fn post_placement_path(&self) -> PathBuf {
        self.artifact(&self.post_placement)
    }

    pub fn post_block_mapping_path(&self) -> PathBuf {
        self.artifact(&self.post_block_mapping)
    }

    pub fn stripe_group_meta_path(&self) -> PathBuf {
        self.artifact(&self.stripe_group_meta)
    }

    pub fn solver_log_path(&self) -> PathBuf {
        self.artifact(&self.solver_log)
    }

    fn rebase(&mut self, base: &Path) {
        if self.metadata_dir.is_relative() {
            self.metadata_dir = base.join(&self.metadata_dir);
        }
        if self.data_dir.is_relative() {
            self.data_dir = base.join(&self.data_dir);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// External solver executable. `None` selects the in-process solver.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<PathBuf>,
    /// Directory the external solver runs in. Defaults to the caller's.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    /// Reconciler worker threads; 0 means available parallelism.
    #[serde(default)]
    pub workers: usize,
    /// Seed for synthetic pre-transition placement.
    #[serde(default)]
    pub seed: u64,
}

/// Full configuration of one transition run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionConfig {
    pub common: CommonConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub solver: SolverConfig,
}

impl TransitionConfig {
    /// Load from a TOML file, resolving relative directories against the
    /// file's parent directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        if let Some(parent) = path.parent() {
            config.paths.rebase(parent);
            if let Some(program) = config.solver.program.as_mut() {
                if program.is_relative() && program.components().count() > 1 {
                    *program = parent.join(&*program);
                }
            }
            if let Some(dir) = config.solver.working_dir.as_mut() {
                if dir.is_relative() {
                    *dir = parent.join(&*dir);
                }
            }
        }
        debug!(
            config = %path.display(),
            metadata_dir = %config.paths.metadata_dir.display(),
            approach = %config.common.approach,
            "transition config loaded"
        );
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text)
            .map_err(|err| TransitionError::config(format!("invalid TOML config: {err}")))
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|err| TransitionError::internal(format!("config serialization failed: {err}")))
    }

    pub const fn code(&self) -> CodingParams {
        CodingParams::new(
            self.common.k_pre,
            self.common.m_pre,
            self.common.k_post,
            self.common.m_post,
        )
    }

    pub const fn settings(&self) -> ClusterSettings {
        ClusterSettings::new(self.common.num_nodes, self.common.num_stripes)
    }

    /// Check every parameter relationship. Performs no I/O; returns `lambda`.
    pub fn validate(&self) -> Result<u16> {
        let lambda = self.settings().validate(&self.code())?;
        if self.common.block_size == 0 {
            return Err(TransitionError::config("block_size must be non-zero"));
        }
        Ok(lambda)
    }
}

fn default_block_size() -> u64 {
    DEFAULT_BLOCK_SIZE
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from("metadata")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_pre_placement() -> PathBuf {
    PathBuf::from("pre_placement")
}

fn default_pre_block_mapping() -> PathBuf {
    PathBuf::from("pre_block_mapping")
}

fn default_post_placement() -> PathBuf {
    PathBuf::from("post_placement")
}

fn default_post_block_mapping() -> PathBuf {
    PathBuf::from("post_block_mapping")
}

fn default_stripe_group_meta() -> PathBuf {
    PathBuf::from("sg_meta")
}

fn default_solver_log() -> PathBuf {
    PathBuf::from("solver.log")
}
