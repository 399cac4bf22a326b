use serde::{Deserialize, Serialize};

use crate::ws::message_types::ControlCommand;

/// Exercise run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExerciseState {
    /// No control message seen yet and not assuming one
    Unknown,
    Running,
    Paused,
    /// Terminal for the session
    Stopped,
}

impl ExerciseState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, ExerciseState::Stopped)
    }
}

impl std::fmt::Display for ExerciseState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExerciseState::Unknown => write!(f, "UNKNOWN"),
            ExerciseState::Running => write!(f, "RUNNING"),
            ExerciseState::Paused => write!(f, "PAUSED"),
            ExerciseState::Stopped => write!(f, "STOPPED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// Start as `Running` before any control message arrives. When false the
    /// dashboard shows `Unknown` until told otherwise.
    pub assume_running: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            assume_running: true,
        }
    }
}

/// Exercise lifecycle driven by control messages.
///
/// ```text
/// RUNNING ──pause──► PAUSED ──resume──► RUNNING
///    └──────stop──────┴──────► STOPPED (terminal)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lifecycle {
    state: ExerciseState,
}

impl Lifecycle {
    pub fn new(config: &LifecycleConfig) -> Self {
        let state = if config.assume_running {
            ExerciseState::Running
        } else {
            ExerciseState::Unknown
        };
        Self { state }
    }

    pub fn state(&self) -> ExerciseState {
        self.state
    }

    /// Apply a control command. Returns whether the state changed.
    ///
    /// Unknown and redundant commands are ignored, and nothing leaves
    /// `Stopped`.
    pub fn apply(&mut self, command: &ControlCommand) -> bool {
        use ExerciseState::*;

        let next = match (self.state, command) {
            (Stopped, _) => Stopped,
            (_, ControlCommand::Stop) => Stopped,
            (Running | Unknown, ControlCommand::Pause) => Paused,
            (Paused | Unknown, ControlCommand::Resume) => Running,
            (state, _) => state,
        };
        let changed = next != self.state;
        self.state = next;
        changed
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new(&LifecycleConfig::default())
    }
}
