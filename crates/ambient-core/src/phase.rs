//! Session phase state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle phase of an `AgenticSession`.
///
/// ```text
/// Pending ─► Creating ─► Running ─► Completed | Failed | Stopped
///    │          ├─► Error
///    └──────────┴─► Stopped
/// Completed | Failed | Stopped | Error ─► Creating   (restart)
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Accepted, waiting for the controller.
    #[default]
    Pending,
    /// The controller is scheduling the execution unit.
    Creating,
    /// The execution unit is running.
    Running,
    /// The execution unit succeeded.
    Completed,
    /// The execution unit exhausted its retries.
    Failed,
    /// Stopped on request.
    Stopped,
    /// The execution unit could not be scheduled.
    Error,
}

impl SessionPhase {
    /// All phases, in lifecycle order.
    pub const ALL: [Self; 7] = [
        Self::Pending,
        Self::Creating,
        Self::Running,
        Self::Completed,
        Self::Failed,
        Self::Stopped,
        Self::Error,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::Creating => "Creating",
            Self::Running => "Running",
            Self::Completed => "Completed",
            Self::Failed => "Failed",
            Self::Stopped => "Stopped",
            Self::Error => "Error",
        }
    }

    /// Whether no further work happens without an explicit restart.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Stopped | Self::Error
        )
    }

    /// Whether `self → next` is a legal edge.
    pub fn can_transition_to(self, next: Self) -> bool {
        use SessionPhase::{Completed, Creating, Error, Failed, Pending, Running, Stopped};
        match (self, next) {
            (Pending, Creating | Stopped)
            | (Creating, Running | Error | Stopped)
            | (Running, Completed | Failed | Stopped) => true,
            (from, Creating) => from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
