//! Stream lifecycle state machine.

/// Represents the lifecycle state of a process stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Lifecycle {
    /// The process has not been created yet.
    #[default]
    Unstarted,
    /// The process is running (or has exited but not been reaped).
    Started,
    /// The process could not be created. Terminal.
    Failed,
    /// The process has been reaped and its status recorded. Terminal.
    Waited,
}

impl Lifecycle {
    /// Check if transition to target state is valid.
    ///
    /// Valid transitions:
    /// - Unstarted -> Started
    /// - Unstarted -> Failed
    /// - Started -> Waited
    pub fn can_transition_to(&self, target: Lifecycle) -> bool {
        use Lifecycle::*;
        matches!(
            (*self, target),
            (Unstarted, Started) | (Unstarted, Failed) | (Started, Waited)
        )
    }

    /// Attempt to transition to a new state.
    ///
    /// Returns `Ok(())` if the transition is valid, or an error otherwise.
    pub fn transition_to(&mut self, target: Lifecycle) -> crate::Result<()> {
        if self.can_transition_to(target) {
            *self = target;
            Ok(())
        } else {
            Err(crate::error::ErrorKind::InvalidTransition {
                from: *self,
                to: target,
            }
            .into())
        }
    }

    /// Check if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, Lifecycle::Failed | Lifecycle::Waited)
    }

    /// Whether start has been attempted.
    pub fn has_started(&self) -> bool {
        !matches!(self, Lifecycle::Unstarted)
    }
}
