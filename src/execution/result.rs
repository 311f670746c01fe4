//! Execution result types.

use std::time::Duration;

use crate::error::{ExecError, FailureReason, Result};

use super::command::CommandSpec;

/// Outcome of a process that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessResult {
    /// Exit code. Signal-terminated processes report `128 + signal` on Unix.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// The composed, human-readable command line.
    pub command: String,
    /// Wall-clock time from spawn to exit.
    pub duration: Duration,
}

impl ProcessResult {
    /// Create a new process result.
    pub fn new(exit_code: i32, stdout: String, stderr: String, command: String) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            command,
            duration: Duration::ZERO,
        }
    }

    /// Set the execution duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Check if the process succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Check if the process exited with a non-zero code.
    pub fn failed(&self) -> bool {
        !self.success()
    }

    /// Get stdout, trimmed.
    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }

    /// Stdout split into lines. Empty output yields no lines.
    pub fn stdout_lines(&self) -> Vec<&str> {
        split_lines(&self.stdout)
    }

    /// Stderr split into lines. Empty output yields no lines.
    pub fn stderr_lines(&self) -> Vec<&str> {
        split_lines(&self.stderr)
    }

    /// Fail with [`ExecError::CommandFailed`] if the exit code is non-zero.
    pub fn check(&self) -> Result<()> {
        if self.failed() {
            return Err(ExecError::CommandFailed {
                reason: FailureReason::ExitCode,
                result: Box::new(self.clone()),
            });
        }
        Ok(())
    }

    /// Derive the next pipeline stage: `spec` with this result's stdout as its stdin.
    pub fn pipe_to(&self, spec: CommandSpec) -> CommandSpec {
        spec.with_stdin(self.stdout.as_bytes().to_vec())
    }
}

fn split_lines(text: &str) -> Vec<&str> {
    if text.is_empty() {
        return Vec::new();
    }
    text.strip_suffix('\n').unwrap_or(text).split('\n').collect()
}
