//! tmux command builders
//!
//! This module provides type-safe builders for the tmux commands panegrid
//! issues. Each command is an argument vector handed directly to the tmux
//! binary, so no shell quoting is involved.

use super::types::{TmuxPaneId, format_pane_id};
use std::fmt;
use std::path::Path;

/// Direction of a new split relative to its target pane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitDirection {
    /// New pane to the right of the target (`split-window -h`)
    Right,
    /// New pane below the target (`split-window -v`)
    Below,
}

/// A tmux command ready to be run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TmuxCommand {
    args: Vec<String>,
}

impl TmuxCommand {
    /// Field layout used for `list-panes` and parsed by
    /// [`crate::TmuxPane::parse_list_line`].
    pub const PANE_FORMAT: &'static str = "#{pane_id}\t#{pane_active}\t#{pane_width}\t#{pane_height}\t#{pane_left}\t#{pane_top}\t#{pane_current_path}\t#{pane_title}";

    fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append `-t %N` when a target pane is given
    fn target(self, pane: Option<TmuxPaneId>) -> Self {
        match pane {
            Some(pane) => self.arg("-t").arg(format_pane_id(pane)),
            None => self,
        }
    }

    /// Arguments to pass to the tmux binary
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// The tmux subcommand name (e.g. `split-window`)
    pub fn name(&self) -> &str {
        self.args.first().map(String::as_str).unwrap_or_default()
    }

    // =========================================================================
    // Pane Commands
    // =========================================================================

    /// List panes in the window holding `target` (the invoking window when
    /// `None`)
    pub fn list_panes(target: Option<TmuxPaneId>) -> Self {
        Self::new(["list-panes"])
            .target(target)
            .arg("-F")
            .arg(Self::PANE_FORMAT)
    }

    /// Split a pane, printing the new pane's handle
    pub fn split_window(
        target: TmuxPaneId,
        direction: SplitDirection,
        start_dir: Option<&Path>,
    ) -> Self {
        let flag = match direction {
            SplitDirection::Right => "-h",
            SplitDirection::Below => "-v",
        };
        let cmd = Self::new(["split-window", flag, "-d", "-P", "-F", "#{pane_id}", "-t"])
            .arg(format_pane_id(target));
        match start_dir {
            Some(dir) => cmd.arg("-c").arg(dir.to_string_lossy()),
            None => cmd,
        }
    }

    /// Kill a pane
    pub fn kill_pane(pane_id: TmuxPaneId) -> Self {
        Self::new(["kill-pane", "-t"]).arg(format_pane_id(pane_id))
    }

    /// Resize a pane
    pub fn resize_pane(pane_id: TmuxPaneId, width: Option<usize>, height: Option<usize>) -> Self {
        let mut cmd = Self::new(["resize-pane", "-t"]).arg(format_pane_id(pane_id));
        if let Some(w) = width {
            cmd = cmd.arg("-x").arg(w.to_string());
        }
        if let Some(h) = height {
            cmd = cmd.arg("-y").arg(h.to_string());
        }
        cmd
    }

    /// Set a pane's title
    pub fn set_pane_title(pane_id: TmuxPaneId, title: &str) -> Self {
        Self::new(["select-pane", "-t"])
            .arg(format_pane_id(pane_id))
            .arg("-T")
            .arg(title)
    }

    // =========================================================================
    // Window Commands
    // =========================================================================
    //
    // Each takes the pane whose window it acts on. `None` falls back to the
    // window of the invoking client.

    /// Resize a window
    pub fn resize_window(target: Option<TmuxPaneId>, width: usize, height: usize) -> Self {
        Self::new(["resize-window"])
            .target(target)
            .arg("-x")
            .arg(width.to_string())
            .arg("-y")
            .arg(height.to_string())
    }

    /// Apply a raw layout descriptor (checksum included) to a window
    pub fn select_layout(target: Option<TmuxPaneId>, descriptor: &str) -> Self {
        Self::new(["select-layout"]).target(target).arg(descriptor)
    }

    /// Print a window's dimensions
    pub fn window_size(target: Option<TmuxPaneId>) -> Self {
        Self::new(["display-message", "-p"])
            .target(target)
            .arg("#{window_width}\t#{window_height}")
    }

    /// Print the attached client's terminal dimensions. Both fields are empty
    /// when no client is attached.
    pub fn client_size(target: Option<TmuxPaneId>) -> Self {
        Self::new(["display-message", "-p"])
            .target(target)
            .arg("#{client_width}\t#{client_height}")
    }

    // =========================================================================
    // Input Commands
    // =========================================================================

    /// Send literal text to a pane
    pub fn send_literal(pane_id: TmuxPaneId, text: &str) -> Self {
        Self::new(["send-keys", "-t"])
            .arg(format_pane_id(pane_id))
            .arg("-l")
            .arg(text)
    }

    /// Send a named key (e.g. `Enter`) to a pane
    pub fn send_key(pane_id: TmuxPaneId, key: &str) -> Self {
        Self::new(["send-keys", "-t"]).arg(format_pane_id(pane_id)).arg(key)
    }

    // =========================================================================
    // Options and Hooks
    // =========================================================================

    /// Read a global option value (empty output when unset)
    pub fn show_option(name: &str) -> Self {
        Self::new(["show-options", "-gqv"]).arg(name)
    }

    /// Set a global option value
    pub fn set_option(name: &str, value: &str) -> Self {
        Self::new(["set-option", "-g"]).arg(name).arg(value)
    }

    /// Install a global hook that runs a shell command in the background
    pub fn set_hook(hook: &str, shell_command: &str) -> Self {
        Self::new(["set-hook", "-g"])
            .arg(hook)
            .arg(format!("run-shell -b '{}'", shell_command.replace('\'', "'\\''")))
    }
}

impl fmt::Display for TmuxCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.args.join(" "))
    }
}
