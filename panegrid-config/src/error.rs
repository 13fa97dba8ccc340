//! Typed error variants for the panegrid-config crate.
//!
//! `Config::load` and `Config::save` return `anyhow::Result`; these values
//! travel inside it and can be recovered with `downcast_ref::<ConfigError>()`
//! by callers that want to match on a specific failure.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur when loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read or written.
    #[error("I/O error on config file {path:?}: {source}")]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not YAML, or does not match the `Config` shape.
    #[error("YAML parse error in config: {0}")]
    Parse(#[from] serde_yaml_ng::Error),

    /// Values parsed but do not make sense together, such as
    /// `min_pane_width` above `max_pane_width`.
    #[error("invalid config: {0}")]
    Validation(String),
}
