// Library exports for testing and potential library use
//
// # Mutex Usage Policy
//
// panegrid uses two mutex types. New code should follow these rules:
//
//   - `tokio::sync::Mutex`: state held across an `.await`, such as the
//     state-file write queue and the layout session's last-applied key.
//
//   - `parking_lot::Mutex`: sync-only bookkeeping that is never held across
//     an await (lifecycle locks, health counters, the debug log file).

/// Application version (root crate version, for use by sub-crates).
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod debug;

pub mod actions;
mod best_effort;
pub mod cli;
pub mod control;
pub mod controller;
pub mod events;
pub mod layout;
pub mod lifecycle;
pub mod reconcile;
pub mod shell_quote;
pub mod slug;
pub mod state;
pub mod worktree;

pub use best_effort::best_effort;
pub use panegrid_config as config;
pub use panegrid_tmux as tmux;
