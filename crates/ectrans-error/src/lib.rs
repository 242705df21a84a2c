use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for transition metadata operations.
///
/// Every failure is fatal to the operation that raised it: inputs are never
/// silently repaired and no partial output is committed. A block whose path
/// must be resolved by an external storage catalog is *not* an error; it is
/// carried as a pending location instead.
#[derive(Error, Debug)]
pub enum TransitionError {
    // === Input Errors ===
    /// Malformed or size-mismatched metadata file.
    #[error("parse error in '{path}' line {line}: {detail}")]
    Parse {
        path: PathBuf,
        line: usize,
        detail: String,
    },

    /// A data block's source is absent from the pre-transition table.
    #[error("no pre-transition provenance for stripe {stripe} block {block}")]
    MissingProvenance { stripe: u32, block: u16 },

    /// Two solver artifacts disagree with each other.
    #[error("solver artifacts disagree: {detail}")]
    ArtifactMismatch { detail: String },

    // === Configuration Errors ===
    /// Invalid relationship among coding parameters and cluster settings.
    #[error("invalid configuration: {detail}")]
    Config { detail: String },

    // === Solver Errors ===
    /// External solver exited non-zero or omitted an expected output.
    #[error("solver failure: {detail}")]
    SolverFailure { detail: String },

    // === I/O Errors ===
    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Internal Errors ===
    /// Internal logic error (should never happen).
    #[error("internal error: {0}")]
    Internal(String),
}

impl TransitionError {
    /// Stable short code for structured log fields and CLI output.
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Parse { .. } => "parse",
            Self::MissingProvenance { .. } => "missing_provenance",
            Self::ArtifactMismatch { .. } => "artifact_mismatch",
            Self::Config { .. } => "config",
            Self::SolverFailure { .. } => "solver_failure",
            Self::Io(_) => "io",
            Self::Internal(_) => "internal",
        }
    }

    /// Process exit code for CLI use.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => 2,
            Self::Parse { .. } | Self::MissingProvenance { .. } | Self::ArtifactMismatch { .. } => {
                3
            }
            Self::SolverFailure { .. } => 4,
            Self::Io(_) => 5,
            Self::Internal(_) => 70,
        }
    }

    /// Whether the failure stems from a malformed or inconsistent input file.
    pub const fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::MissingProvenance { .. } | Self::ArtifactMismatch { .. }
        )
    }

    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config { .. })
    }

    /// Human-friendly suggestion for fixing this error.
    pub const fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::Config { .. } => Some(
                "k_post must be a multiple of k_pre and num_stripes a multiple of k_post / k_pre",
            ),
            Self::MissingProvenance { .. } => {
                Some("Regenerate the pre-transition block mapping from the pre placement")
            }
            Self::SolverFailure { .. } => Some("Inspect the solver execution log"),
            _ => None,
        }
    }

    /// Create a parse error for `path` at 1-based `line`.
    pub fn parse(path: impl Into<PathBuf>, line: usize, detail: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            line,
            detail: detail.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(detail: impl Into<String>) -> Self {
        Self::Config {
            detail: detail.into(),
        }
    }

    /// Create a solver failure.
    pub fn solver(detail: impl Into<String>) -> Self {
        Self::SolverFailure {
            detail: detail.into(),
        }
    }

    /// Create an artifact mismatch error.
    pub fn mismatch(detail: impl Into<String>) -> Self {
        Self::ArtifactMismatch {
            detail: detail.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

/// Result type alias using `TransitionError`.
pub type Result<T> = std::result::Result<T, TransitionError>;
