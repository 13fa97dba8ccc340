//! Errors raised by the layout pipeline.

use panegrid_tmux::{TmuxError, TmuxPaneId};
use thiserror::Error;

/// Errors from computing, encoding or applying a grid layout.
///
/// An infeasible geometry is not an error: the calculator always falls back to
/// some layout. Only caller mistakes and live-state drift surface here.
#[derive(Debug, Error)]
pub enum LayoutError {
    /// Zero terminal width or height passed at the API boundary.
    #[error("invalid terminal dimensions {width}x{height}")]
    InvalidDimensions { width: usize, height: usize },

    /// The live window no longer matches the descriptor: panes it places
    /// have vanished, or live panes it leaves out have appeared. tmux rejects
    /// a layout whose cells do not match the window's panes one to one.
    ///
    /// Callers must re-run reconciliation rather than retry the same apply.
    #[error("stale layout: panes {missing:?} gone, panes {untracked:?} not placed")]
    Stale {
        missing: Vec<TmuxPaneId>,
        untracked: Vec<TmuxPaneId>,
    },

    /// The descriptor could not be parsed back into a layout tree.
    #[error("malformed layout descriptor: {0}")]
    Malformed(String),

    /// A tmux call failed while applying the layout.
    #[error(transparent)]
    Tmux(#[from] TmuxError),
}

impl LayoutError {
    /// Whether the caller should reconcile from scratch before trying again
    pub fn is_stale(&self) -> bool {
        matches!(self, LayoutError::Stale { .. })
    }
}
