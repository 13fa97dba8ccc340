//! Configuration system for panegrid.
//!
//! This crate provides configuration loading, saving, and default values:
//!
//! - Layout bounds for the pane grid
//! - tmux invocation settings
//! - Reconciliation and lifecycle-lock timing
//! - Per-project state paths

pub mod config;
pub mod defaults;
mod error;

pub use config::{
    CONFIG_PATH_ENV, CONTROL_SOCKET_NAME, Config, HOOK_TRIGGER_FILE_NAME, STATE_FILE_NAME,
};
pub use error::ConfigError;
