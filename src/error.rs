//! Error types for procexec.

use std::time::Duration;

use thiserror::Error;

use crate::execution::ProcessResult;

/// Why a process that ran to completion was still reported as a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Non-zero exit code and `ignore_exit_code` was not set.
    ExitCode,
    /// Output on stderr while `fail_on_stderr` was set.
    Stderr,
}

/// Main error type for process execution.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The command could not be constructed (empty program name).
    #[error("invalid command: {0}")]
    InvalidCommand(String),

    /// The program could not be located or launched.
    #[error("failed to spawn `{command}`: {source}")]
    SpawnFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The configured timeout elapsed. The child has been terminated.
    #[error("command timed out after {timeout:?}: {command}")]
    Timeout {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },

    /// The process ran but its outcome is a failure.
    #[error("{}", failure_message(.reason, .result))]
    CommandFailed {
        reason: FailureReason,
        result: Box<ProcessResult>,
    },

    /// I/O error on one of the child's standard streams.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn failure_message(reason: &FailureReason, result: &ProcessResult) -> String {
    match reason {
        FailureReason::ExitCode => format!(
            "command failed with exit code {}: {}",
            result.exit_code, result.command
        ),
        FailureReason::Stderr => format!("command produced stderr output: {}", result.command),
    }
}

impl ExecError {
    /// The composed command line, when the error is tied to one.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::SpawnFailed { command, .. } | Self::Timeout { command, .. } => Some(command),
            Self::CommandFailed { result, .. } => Some(&result.command),
            Self::InvalidCommand(_) | Self::Io(_) => None,
        }
    }

    /// Exit code of a process that ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::CommandFailed { result, .. } => Some(result.exit_code),
            _ => None,
        }
    }

    /// Captured (possibly partial) stdout.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Timeout { stdout, .. } => Some(stdout),
            Self::CommandFailed { result, .. } => Some(&result.stdout),
            _ => None,
        }
    }

    /// Captured (possibly partial) stderr.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::Timeout { stderr, .. } => Some(stderr),
            Self::CommandFailed { result, .. } => Some(&result.stderr),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Convenience Result type for procexec operations.
pub type Result<T> = std::result::Result<T, ExecError>;
