//! Execution-mode state machine and the shared control context.

/// Shared context and its exclusion guard.
pub mod context;

pub use context::{ControlContext, CoreGuard};

/// Host-observable execution mode of the stepped core.
///
/// Exactly one authoritative copy exists, inside [`ControlContext`], and it
/// only changes through [`CoreGuard::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ExecutionMode {
    /// Stepping freely under the frame budget.
    #[default]
    Running,
    /// Paused by a trap or by the operator.
    Waiting,
    /// Execute one instruction, then pause.
    SingleStep,
    /// Execute one frame's budget, then pause.
    OneFrame,
    /// Shutting down; absorbing.
    Terminating,
}

impl ExecutionMode {
    /// Transition table.
    ///
    /// Besides Running→Waiting, Running→SingleStep, SingleStep→Waiting,
    /// Waiting→Running and any→Terminating, the operator's stepping controls
    /// add Waiting→SingleStep, Waiting→OneFrame and OneFrame→Waiting.
    ///
    /// Self-transitions are not listed; [`CoreGuard::transition`] treats them
    /// as no-ops.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        match (self, to) {
            (Self::Terminating, _) => false,
            (_, Self::Terminating)
            | (Self::Running, Self::Waiting | Self::SingleStep)
            | (Self::SingleStep | Self::OneFrame, Self::Waiting)
            | (Self::Waiting, Self::Running | Self::SingleStep | Self::OneFrame) => true,
            _ => false,
        }
    }

    /// Whether the scheduler may execute a step in this mode.
    #[must_use]
    pub const fn is_stepping(self) -> bool {
        matches!(self, Self::Running | Self::SingleStep | Self::OneFrame)
    }

    /// Short label for status lines.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Terminating => "Terminating",
            Self::Waiting | Self::SingleStep | Self::OneFrame => "Debugging",
        }
    }
}
