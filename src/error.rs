use crate::invoker::CancelReason;
use std::fmt;

/// Appended to execution failures whose cause mentions a permission problem.
pub const PERMISSION_GUIDANCE: &str = "\n\nPermission denied. Please ensure:
1. The application has accessibility permissions in System Preferences
2. You are running in a user session with audio output available
3. You are not running in an SSH session without audio forwarding";

const PERMISSION_MARKER: &str = "permission denied";

/// Which of the two invocation shapes failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Speak,
    ListVoices,
}

impl Action {
    /// Subject of a cancellation message.
    pub fn noun(&self) -> &'static str {
        match self {
            Action::Speak => "Speech synthesis",
            Action::ListVoices => "Voice listing",
        }
    }

    /// Completes "Failed to ..." in an execution failure.
    pub fn verb(&self) -> &'static str {
        match self {
            Action::Speak => "execute speech synthesis",
            Action::ListVoices => "retrieve voice list",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Speak => write!(f, "speak"),
            Action::ListVoices => write!(f, "list_voices"),
        }
    }
}

/// Every failure a tool call can report back to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SpeechError {
    #[error("{0}")]
    Validation(String),

    #[error("{} cancelled: {reason}", .action.noun())]
    Cancelled { action: Action, reason: CancelReason },

    #[error("{}", execution_message(.action, .cause, .output))]
    Execution {
        action: Action,
        cause: String,
        output: String,
    },

    #[error("Failed to format voice list: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SpeechError {
    pub fn is_validation(&self) -> bool {
        matches!(self, SpeechError::Validation(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpeechError::Cancelled { .. })
    }
}

fn execution_message(action: &Action, cause: &str, output: &str) -> String {
    let mut msg = format!("Failed to {}: {}", action.verb(), cause);
    if !output.is_empty() {
        msg.push_str("\nOutput: ");
        msg.push_str(output);
    }
    if cause.contains(PERMISSION_MARKER) {
        msg.push_str(PERMISSION_GUIDANCE);
    }
    msg
}
