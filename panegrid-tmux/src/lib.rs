//! tmux integration for panegrid
//!
//! This crate owns everything that speaks tmux's language:
//! - pane handles and `list-panes` rows
//! - command builders for every call panegrid issues
//! - the layout descriptor grammar (parse, serialize, checksum)
//! - the [`Multiplexer`] trait and its process-backed [`TmuxClient`]
//!
//! ## Architecture
//!
//! - `types.rs`: pane IDs, `TmuxPane`, `TmuxLayout`/`LayoutNode` and the checksum
//! - `commands.rs`: command builders
//! - `client.rs`: the `Multiplexer` seam and the tmux-binary implementation
//! - `error.rs`: typed invocation errors

mod client;
mod commands;
mod error;
mod types;

pub use client::{DEFAULT_COMMAND_TIMEOUT, Multiplexer, TmuxClient};
pub use commands::{SplitDirection, TmuxCommand};
pub use error::{TmuxError, TmuxResult};
pub use types::{
    LayoutNode, TmuxLayout, TmuxPane, TmuxPaneId, format_pane_id, layout_checksum, parse_pane_id,
};
