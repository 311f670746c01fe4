//! Invocation state machine.

use tracing::{trace, warn};

/// Lifecycle state of a single process invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecState {
    /// Command accepted, nothing launched yet.
    #[default]
    Created,
    /// Asking the OS to start the process.
    Spawning,
    /// Process running, output being read.
    Running,
    /// Both output streams closed, waiting for exit.
    Draining,
    /// Deadline passed, termination in progress.
    TimedOut,
    /// The OS refused to start the process.
    SpawnFailed,
    /// Process has exited or was killed and reaped.
    Terminated,
    /// Outcome handed to the caller.
    Resolved,
}

impl ExecState {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Created -> Spawning | Resolved (dry run)
    /// - Spawning -> Running | SpawnFailed
    /// - Running -> Draining | TimedOut | Terminated (stream error)
    /// - Draining -> Terminated | TimedOut
    /// - TimedOut -> Terminated
    /// - SpawnFailed | Terminated -> Resolved
    pub fn can_transition_to(&self, target: ExecState) -> bool {
        use ExecState::*;
        matches!(
            (*self, target),
            (Created, Spawning)
                | (Created, Resolved)
                | (Spawning, Running)
                | (Spawning, SpawnFailed)
                | (Running, Draining)
                | (Running, TimedOut)
                | (Running, Terminated)
                | (Draining, Terminated)
                | (Draining, TimedOut)
                | (TimedOut, Terminated)
                | (SpawnFailed, Resolved)
                | (Terminated, Resolved)
        )
    }

    /// Move to `target`, tracing the transition.
    ///
    /// Returns `false` and leaves the state unchanged if the transition is
    /// not allowed.
    pub fn advance(&mut self, target: ExecState, command: &str) -> bool {
        if *self == target {
            return true;
        }
        if !self.can_transition_to(target) {
            warn!(command, from = ?*self, to = ?target, "ignoring invalid state transition");
            return false;
        }
        trace!(command, from = ?*self, to = ?target, "state transition");
        *self = target;
        true
    }

    /// Whether the child may still be alive in this state.
    pub fn has_live_child(&self) -> bool {
        matches!(
            self,
            ExecState::Running | ExecState::Draining | ExecState::TimedOut
        )
    }
}
