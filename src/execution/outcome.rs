//! Turning a finished process into success or failure.

use crate::error::{ExecError, FailureReason, Result};

use super::command::CommandSpec;
use super::result::ProcessResult;

/// The failure flags of a [`CommandSpec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct OutcomePolicy {
    pub ignore_exit_code: bool,
    pub fail_on_stderr: bool,
}

impl OutcomePolicy {
    pub fn of(spec: &CommandSpec) -> Self {
        Self {
            ignore_exit_code: spec.ignore_exit_code(),
            fail_on_stderr: spec.fail_on_stderr(),
        }
    }

    /// Apply the policy.
    ///
    /// The exit code is checked first. The stderr check is independent of
    /// `ignore_exit_code`: whitespace-only stderr does not count as output.
    pub fn evaluate(&self, result: ProcessResult) -> Result<ProcessResult> {
        if result.exit_code != 0 && !self.ignore_exit_code {
            return Err(ExecError::CommandFailed {
                reason: FailureReason::ExitCode,
                result: Box::new(result),
            });
        }
        if self.fail_on_stderr && !result.stderr.trim().is_empty() {
            return Err(ExecError::CommandFailed {
                reason: FailureReason::Stderr,
                result: Box::new(result),
            });
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(code: i32, stderr: &str) -> ProcessResult {
        ProcessResult::new(code, "out\n".into(), stderr.into(), "tool".into())
    }

    fn policy(ignore_exit_code: bool, fail_on_stderr: bool) -> OutcomePolicy {
        OutcomePolicy {
            ignore_exit_code,
            fail_on_stderr,
        }
    }

    #[test]
    fn test_clean_exit_always_succeeds() {
        for (ignore, stderr_fails) in [(false, false), (true, false), (false, true), (true, true)] {
            let ok = policy(ignore, stderr_fails).evaluate(result(0, "")).unwrap();
            assert!(ok.success());
        }
    }

    #[test]
    fn test_nonzero_exit_fails_with_code() {
        let err = policy(false, false).evaluate(result(7, "")).unwrap_err();
        assert!(matches!(
            err,
            ExecError::CommandFailed { reason: FailureReason::ExitCode, .. }
        ));
        assert_eq!(err.exit_code(), Some(7));
        assert_eq!(err.stdout(), Some("out\n"));
    }

    #[test]
    fn test_ignore_exit_code() {
        let ok = policy(true, false).evaluate(result(7, "")).unwrap();
        assert_eq!(ok.exit_code, 7);
        assert!(!ok.success());
    }

    #[test]
    fn test_stderr_fails_even_with_zero_exit() {
        let err = policy(false, true).evaluate(result(0, "warning\n")).unwrap_err();
        assert!(matches!(
            err,
            ExecError::CommandFailed { reason: FailureReason::Stderr, .. }
        ));
    }

    #[test]
    fn test_stderr_checked_when_exit_code_ignored() {
        let err = policy(true, true).evaluate(result(3, "boom")).unwrap_err();
        assert!(matches!(
            err,
            ExecError::CommandFailed { reason: FailureReason::Stderr, .. }
        ));
        assert_eq!(err.exit_code(), Some(3));
    }

    #[test]
    fn test_exit_code_reported_before_stderr() {
        let err = policy(false, true).evaluate(result(3, "boom")).unwrap_err();
        assert!(matches!(
            err,
            ExecError::CommandFailed { reason: FailureReason::ExitCode, .. }
        ));
    }

    #[test]
    fn test_whitespace_stderr_is_not_output() {
        assert!(policy(false, true).evaluate(result(0, " \n")).is_ok());
    }

    #[test]
    fn test_policy_of_spec() {
        let spec = CommandSpec::builder("tool")
            .fail_on_stderr(true)
            .build()
            .unwrap();
        assert_eq!(OutcomePolicy::of(&spec), policy(false, true));
    }
}
