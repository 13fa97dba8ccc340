//! Typed errors for tmux invocations.
//!
//! Every tmux call is fallible and time-bounded. Callers in the reconciler
//! treat all of these as "transient, assume absent" and retry on the next
//! pass, but they stay distinguishable for logging.

use std::time::Duration;
use thiserror::Error;

/// Failure of a single tmux invocation.
#[derive(Debug, Error)]
pub enum TmuxError {
    /// The tmux binary could not be started.
    #[error("failed to spawn tmux for '{command}': {source}")]
    Spawn {
        /// Subcommand being run.
        command: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// tmux did not answer within the configured timeout.
    #[error("tmux '{command}' timed out after {timeout:?}")]
    Timeout {
        /// Subcommand being run.
        command: String,
        /// The timeout that elapsed.
        timeout: Duration,
    },

    /// tmux exited with a non-zero status.
    #[error("tmux '{command}' exited with {status}: {stderr}")]
    Failed {
        /// Subcommand being run.
        command: String,
        /// Exit status as reported by the OS.
        status: String,
        /// Trimmed stderr output.
        stderr: String,
    },

    /// tmux succeeded but printed something we could not interpret.
    #[error("unexpected output from tmux '{command}': {output:?}")]
    UnexpectedOutput {
        /// Subcommand being run.
        command: String,
        /// The raw output.
        output: String,
    },
}

impl TmuxError {
    /// Whether the failure was a timeout rather than a tmux-side error.
    pub fn is_timeout(&self) -> bool {
        matches!(self, TmuxError::Timeout { .. })
    }
}

/// Result alias for tmux calls.
pub type TmuxResult<T> = Result<T, TmuxError>;
