//! The `Config` struct plus persistence and path resolution.
//!
//! Covers:
//! - `load` / `save` (YAML file I/O with atomic write)
//! - XDG-style path helpers (`config_path`, `config_dir`)
//! - Per-project paths (`state_file`, `hook_trigger_file`, `control_socket`,
//!   `worktrees_dir`)
//! - Duration accessors for the second/millisecond fields

use crate::ConfigError;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides the config file location
pub const CONFIG_PATH_ENV: &str = "PANEGRID_CONFIG";

/// File name of the pane state document inside the project state directory
pub const STATE_FILE_NAME: &str = "panes.json";

/// File touched by tmux hooks to signal "something changed"
pub const HOOK_TRIGGER_FILE_NAME: &str = "notify";

/// Socket a running `watch` accepts forwarded commands on
pub const CONTROL_SOCKET_NAME: &str = "control.sock";

/// panegrid configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    // ── Layout bounds ──────────────────────────────────────────────────────
    /// Width of the control pane at the left edge of the window
    #[serde(default = "crate::defaults::sidebar_width")]
    pub sidebar_width: usize,

    /// Narrowest comfortable content pane
    #[serde(default = "crate::defaults::min_pane_width")]
    pub min_pane_width: usize,

    /// Widest comfortable content pane; leftover width goes to a spacer
    #[serde(default = "crate::defaults::max_pane_width")]
    pub max_pane_width: usize,

    /// Shortest comfortable content pane
    #[serde(default = "crate::defaults::min_pane_height")]
    pub min_pane_height: usize,

    /// Title marking the spacer pane
    #[serde(default = "crate::defaults::spacer_title")]
    pub spacer_title: String,

    // ── tmux ───────────────────────────────────────────────────────────────
    /// tmux binary to invoke
    #[serde(default = "crate::defaults::tmux_path")]
    pub tmux_path: String,

    /// Bound on any single tmux invocation
    #[serde(default = "crate::defaults::command_timeout_secs")]
    pub command_timeout_secs: u64,

    // ── Reconciliation ─────────────────────────────────────────────────────
    /// Interval between background reconciliation passes
    #[serde(default = "crate::defaults::poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Window in which bursts of change events collapse into one pass
    #[serde(default = "crate::defaults::event_debounce_ms")]
    pub event_debounce_ms: u64,

    /// Consecutive failed passes before status reports degraded
    #[serde(default = "crate::defaults::failure_threshold")]
    pub failure_threshold: u32,

    // ── Lifecycle locks ────────────────────────────────────────────────────
    /// Age after which a lifecycle lock is force-released
    #[serde(default = "crate::defaults::lock_timeout_secs")]
    pub lock_timeout_secs: u64,

    /// Interval of the expired-lock sweep
    #[serde(default = "crate::defaults::lock_sweep_interval_secs")]
    pub lock_sweep_interval_secs: u64,

    // ── Project state ──────────────────────────────────────────────────────
    /// Per-project directory holding the state file and worktrees
    #[serde(default = "crate::defaults::state_dir_name")]
    pub state_dir_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sidebar_width: crate::defaults::sidebar_width(),
            min_pane_width: crate::defaults::min_pane_width(),
            max_pane_width: crate::defaults::max_pane_width(),
            min_pane_height: crate::defaults::min_pane_height(),
            spacer_title: crate::defaults::spacer_title(),
            tmux_path: crate::defaults::tmux_path(),
            command_timeout_secs: crate::defaults::command_timeout_secs(),
            poll_interval_secs: crate::defaults::poll_interval_secs(),
            event_debounce_ms: crate::defaults::event_debounce_ms(),
            failure_threshold: crate::defaults::failure_threshold(),
            lock_timeout_secs: crate::defaults::lock_timeout_secs(),
            lock_sweep_interval_secs: crate::defaults::lock_sweep_interval_secs(),
            state_dir_name: crate::defaults::state_dir_name(),
        }
    }
}

impl Config {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists. Unlike a GUI app we never write a
    /// default file on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();
        log::info!("Config path: {:?}", config_path);

        if !config_path.exists() {
            log::info!("Config file not found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&config_path)
    }

    /// Load and validate configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = if contents.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml_ng::from_str(&contents).map_err(ConfigError::from)?
        };
        config.validate()?;
        log::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    /// Save configuration to a specific file
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }

        let yaml = serde_yaml_ng::to_string(self).map_err(ConfigError::from)?;

        // Atomic save: write to temp file then rename to prevent corruption on crash
        let temp_path = path.with_extension("yaml.tmp");
        fs::write(&temp_path, &yaml).map_err(io_err)?;
        fs::rename(&temp_path, path).map_err(io_err)?;

        Ok(())
    }

    /// Reject settings the layout engine and timers cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_pane_width == 0 || self.min_pane_height == 0 {
            return Err(ConfigError::Validation(
                "min_pane_width and min_pane_height must be positive".to_string(),
            ));
        }
        if self.min_pane_width > self.max_pane_width {
            return Err(ConfigError::Validation(format!(
                "min_pane_width ({}) exceeds max_pane_width ({})",
                self.min_pane_width, self.max_pane_width
            )));
        }
        if self.command_timeout_secs == 0 || self.lock_timeout_secs == 0 {
            return Err(ConfigError::Validation(
                "command_timeout_secs and lock_timeout_secs must be positive".to_string(),
            ));
        }
        if self.spacer_title.trim().is_empty() {
            return Err(ConfigError::Validation(
                "spacer_title must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the configuration file path (using XDG convention)
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.yaml")
    }

    /// Get the configuration directory (`~/.config/panegrid`)
    pub fn config_dir() -> PathBuf {
        #[cfg(target_os = "windows")]
        {
            dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("panegrid")
        }
        #[cfg(not(target_os = "windows"))]
        {
            dirs::home_dir()
                .map(|home| home.join(".config"))
                .or_else(dirs::config_dir)
                .unwrap_or_else(|| PathBuf::from("."))
                .join("panegrid")
        }
    }

    // ── Per-project paths ──────────────────────────────────────────────────

    /// Directory holding a project's panegrid state
    pub fn state_dir(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.state_dir_name)
    }

    /// The project's pane state document
    pub fn state_file(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root).join(STATE_FILE_NAME)
    }

    /// File touched by tmux hooks for this project
    pub fn hook_trigger_file(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root).join(HOOK_TRIGGER_FILE_NAME)
    }

    /// Socket of the project's running `watch`
    pub fn control_socket(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root).join(CONTROL_SOCKET_NAME)
    }

    /// Directory under which worktrees are provisioned
    pub fn worktrees_dir(&self, project_root: &Path) -> PathBuf {
        self.state_dir(project_root).join("worktrees")
    }

    // ── Durations ──────────────────────────────────────────────────────────

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn event_debounce(&self) -> Duration {
        Duration::from_millis(self.event_debounce_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    pub fn lock_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.lock_sweep_interval_secs.max(1))
    }
}
