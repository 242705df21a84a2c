//! Adapter for the black-box solver executable.
//!
//! One synchronous process per transition. Stdout and stderr are captured
//! verbatim into the execution log; they never drive control flow. The
//! solver is deterministic for identical inputs, so a failure is not retried.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::Instant;

use ectrans_error::{Result, TransitionError};
use tracing::{debug, error, info};

use crate::{SolveOutcome, SolveRequest, TransitionSolver};

const STDERR_TAIL_BYTES: usize = 512;

#[derive(Debug, Clone)]
pub struct ExternalSolver {
    program: PathBuf,
    /// Arguments placed before the positional contract, e.g. a script path
    /// when `program` is an interpreter.
    prefix_args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl ExternalSolver {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
            working_dir: None,
        }
    }

    #[must_use]
    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    fn command(&self, request: &SolveRequest) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.prefix_args);
        command.args(request.positional_args());
        if let Some(dir) = &self.working_dir {
            command.current_dir(dir);
        }
        command
    }
}

impl TransitionSolver for ExternalSolver {
    fn name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("external")
    }

    fn solve(&self, request: &SolveRequest) -> Result<SolveOutcome> {
        // Stale artifacts from an earlier run must not pass for fresh output.
        remove_if_present(&request.post_placement)?;
        remove_if_present(&request.stripe_groups)?;

        let args = request.positional_args();
        debug!(program = %self.program.display(), args = ?args, "spawning solver");
        let start = Instant::now();
        let output = self.command(request).output().map_err(|err| {
            error!(program = %self.program.display(), error = %err, "solver spawn failed");
            TransitionError::solver(format!(
                "failed to spawn '{}': {err}",
                self.program.display()
            ))
        })?;
        let elapsed = start.elapsed();

        if let Some(log) = &request.log {
            write_execution_log(log, &self.program, &args, &output)?;
        }

        if !output.status.success() {
            let tail = stderr_tail(&output.stderr);
            error!(
                program = %self.program.display(),
                status = %output.status,
                stderr_tail = %tail,
                "solver exited with failure"
            );
            return Err(TransitionError::solver(format!(
                "'{}' exited with {}: {tail}",
                self.program.display(),
                output.status
            )));
        }
        request.check_outputs()?;

        info!(
            program = %self.program.display(),
            elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            "solver finished"
        );
        Ok(SolveOutcome {
            elapsed,
            log: request.log.clone(),
        })
    }
}

fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

fn write_execution_log(log: &Path, program: &Path, args: &[String], output: &Output) -> Result<()> {
    let mut bytes = format!("$ {} {}\n", program.display(), args.join(" ")).into_bytes();
    bytes.extend_from_slice(b"--- stdout ---\n");
    bytes.extend_from_slice(&output.stdout);
    bytes.extend_from_slice(b"\n--- stderr ---\n");
    bytes.extend_from_slice(&output.stderr);
    bytes.extend_from_slice(format!("\n--- status: {} ---\n", output.status).as_bytes());
    if let Some(parent) = log.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(log, bytes)?;
    Ok(())
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_BYTES {
        return trimmed.to_owned();
    }
    let mut start = trimmed.len() - STDERR_TAIL_BYTES;
    while !trimmed.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &trimmed[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stderr_tail_keeps_short_output() {
        assert_eq!(stderr_tail(b"  invalid parameters\n"), "invalid parameters");
    }

    #[test]
    fn stderr_tail_truncates_long_output() {
        let long = "x".repeat(STDERR_TAIL_BYTES * 2);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert_eq!(tail.len(), STDERR_TAIL_BYTES + 3);
    }

    #[test]
    fn name_is_program_file_name() {
        let solver = ExternalSolver::new("/opt/build/BTSGenerator");
        assert_eq!(solver.name(), "BTSGenerator");
    }
}
