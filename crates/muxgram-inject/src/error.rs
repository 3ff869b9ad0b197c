//! Injection error types.

use thiserror::Error;

/// Errors from multiplexer invocations.
#[derive(Debug, Error)]
pub enum InjectError {
    /// The addressed pane no longer exists.
    #[error("pane not found: {target}")]
    PaneNotFound {
        /// The pane that failed validation.
        target: String,
    },

    /// The multiplexer binary could not be spawned.
    #[error("failed to spawn multiplexer: {0}")]
    Spawn(#[from] std::io::Error),

    /// A multiplexer command exited non-zero.
    #[error("multiplexer command failed ({command}): {stderr}")]
    CommandFailed {
        /// The invocation, quoted for display.
        command: String,
        /// Trimmed stderr.
        stderr: String,
    },
}

impl InjectError {
    /// The recovery advice shown to the user in the thread.
    #[must_use]
    pub fn user_hint(&self) -> &'static str {
        match self {
            Self::PaneNotFound { .. } => {
                "pane not found; send any command in the CLI to refresh the connection"
            }
            Self::Spawn(_) | Self::CommandFailed { .. } => "no multiplexer session found",
        }
    }
}

/// Result type for injection operations.
pub type InjectResult<T> = Result<T, InjectError>;
