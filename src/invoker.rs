//! Runs the speech executable under a cancellable, optionally deadline-bound
//! context and captures its combined output.

use crate::error::{Action, SpeechError};
use std::fmt;
use std::io::ErrorKind;
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Why a context stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Canceled,
    DeadlineExceeded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Canceled => write!(f, "context canceled"),
            CancelReason::DeadlineExceeded => write!(f, "context deadline exceeded"),
        }
    }
}

/// Cancellation token plus optional deadline for a single tool call.
#[derive(Debug, Clone)]
pub struct CallContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Never cancelled unless someone calls `cancel` on a clone.
    pub fn background() -> Self {
        Self::new(CancellationToken::new())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// `Some` once the context is cancelled or past its deadline.
    pub fn err(&self) -> Option<CancelReason> {
        if self.token.is_cancelled() {
            return Some(CancelReason::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(CancelReason::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when the context is done.
    pub async fn done(&self) -> CancelReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    _ = self.token.cancelled() => CancelReason::Canceled,
                    _ = tokio::time::sleep_until(deadline) => CancelReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                CancelReason::Canceled
            }
        }
    }
}

/// Executes `program` with discrete `args` (never through a shell) and returns
/// stdout followed by stderr. The child is killed if the context finishes first.
pub async fn run(
    ctx: &CallContext,
    program: &str,
    args: &[String],
    action: Action,
) -> Result<Vec<u8>, SpeechError> {
    if let Some(reason) = ctx.err() {
        return Err(SpeechError::Cancelled { action, reason });
    }

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!(program, argc = args.len(), %action, "Spawning speech command");

    // Dropping the output future drops the child, and kill_on_drop reaps it.
    let outcome = tokio::select! {
        biased;
        reason = ctx.done() => {
            warn!(program, %action, %reason, "Speech command cancelled");
            return Err(SpeechError::Cancelled { action, reason });
        }
        outcome = cmd.output() => outcome,
    };

    finish(ctx, program, action, outcome)
}

/// Classifies a completed (or failed to start) process. Cancellation is checked
/// before anything else so a kill racing the exit is never reported as a failure.
pub(crate) fn finish(
    ctx: &CallContext,
    program: &str,
    action: Action,
    outcome: std::io::Result<Output>,
) -> Result<Vec<u8>, SpeechError> {
    let failure = match outcome {
        Ok(output) => {
            let mut combined = output.stdout;
            combined.extend_from_slice(&output.stderr);
            if output.status.success() {
                return Ok(combined);
            }
            (
                output.status.to_string(),
                String::from_utf8_lossy(&combined).into_owned(),
            )
        }
        Err(e) => (describe_spawn_error(program, &e), String::new()),
    };

    if let Some(reason) = ctx.err() {
        warn!(program, %action, %reason, "Speech command cancelled");
        return Err(SpeechError::Cancelled { action, reason });
    }

    let (cause, output) = failure;
    warn!(program, %action, %cause, "Speech command failed");
    Err(SpeechError::Execution {
        action,
        cause,
        output,
    })
}

fn describe_spawn_error(program: &str, e: &std::io::Error) -> String {
    match e.kind() {
        ErrorKind::PermissionDenied => format!("{}: permission denied", program),
        _ => format!("{}: {}", program, e),
    }
}
