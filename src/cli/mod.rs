//! Command-line interface for panegrid.
//!
//! This module handles argument parsing. The subcommand implementations live
//! in the [`commands`] submodule.

pub mod commands;

use crate::events::{ChangeEvent, parse_size};
use clap::{Parser, Subcommand};
use panegrid_tmux::parse_pane_id;
use std::path::PathBuf;

/// panegrid - grid layout and pane tracking for agent worktrees in tmux
#[derive(Parser, Debug)]
#[command(name = "panegrid")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project root holding the .panegrid state directory (default: current directory)
    #[arg(long, value_name = "DIR", global = true)]
    pub project: Option<PathBuf>,

    /// Config file to use instead of ~/.config/panegrid/config.yaml
    #[arg(long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Sidebar pane handle (e.g. %0); `watch` defaults to $TMUX_PANE
    #[arg(long, value_name = "PANE", global = true)]
    pub control_pane: Option<String>,

    /// tmux server socket name (tmux -L)
    #[arg(short = 'L', long, value_name = "NAME", global = true)]
    pub socket_name: Option<String>,

    /// Set debug log level (overrides RUST_LOG and DEBUG_LEVEL)
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevelArg>,
}

/// Log level argument for CLI
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum LogLevelArg {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevelArg {
    /// Convert to `log::LevelFilter`
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            LogLevelArg::Off => log::LevelFilter::Off,
            LogLevelArg::Error => log::LevelFilter::Error,
            LogLevelArg::Warn => log::LevelFilter::Warn,
            LogLevelArg::Info => log::LevelFilter::Info,
            LogLevelArg::Debug => log::LevelFilter::Debug,
            LogLevelArg::Trace => log::LevelFilter::Trace,
        }
    }
}

/// What a tmux hook saw happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum HookEventArg {
    Split,
    Exited,
    Resized,
}

impl HookEventArg {
    /// The change a hook reports. Missing or unexpanded details make it a
    /// plain wake-up.
    pub fn to_change_event(self, pane: Option<&str>, size: Option<&str>) -> ChangeEvent {
        let pane = pane.and_then(parse_pane_id);
        let event = match self {
            HookEventArg::Split => pane.map(ChangeEvent::PaneSplit),
            HookEventArg::Exited => pane.map(ChangeEvent::PaneExited),
            HookEventArg::Resized => size
                .and_then(parse_size)
                .map(|(width, height)| ChangeEvent::Resized { width, height }),
        };
        event.unwrap_or(ChangeEvent::External)
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one reconciliation pass
    Reconcile,

    /// Recompute the grid layout
    Layout {
        /// Re-apply even if nothing changed
        #[arg(short, long)]
        force: bool,
    },

    /// Keep panes reconciled until interrupted
    Watch,

    /// Wake a running `watch` (used by the tmux hooks)
    Notify {
        /// What happened
        #[arg(long, value_enum)]
        event: Option<HookEventArg>,

        /// Pane the event is about (e.g. %3)
        #[arg(long, value_name = "PANE")]
        pane: Option<String>,

        /// New client size for `resized`
        #[arg(long, value_name = "WxH")]
        size: Option<String>,
    },

    /// Close a tracked pane
    Close {
        /// Logical ID, slug or %N handle
        pane: String,
    },

    /// Open another pane on the same worktree as PANE
    Attach {
        /// Logical ID, slug or %N handle
        pane: String,
    },

    /// Open a new tracked pane
    Create {
        slug: String,

        /// Plain shell instead of a worktree pane
        #[arg(long)]
        shell: bool,
    },

    /// Give a tracked pane a new slug
    Rename {
        /// Logical ID, slug or %N handle
        pane: String,
        slug: String,
    },

    /// Show tracked panes, locks and health
    Status {
        /// Print the raw state document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Install tmux hooks that run `panegrid notify` on pane changes
    InstallHooks,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "panegrid",
            "close",
            "shell-1",
            "--project",
            "/tmp/p",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Close { ref pane } if pane == "shell-1"));
        assert_eq!(cli.project, Some(PathBuf::from("/tmp/p")));
        assert_eq!(
            cli.log_level.map(LogLevelArg::to_level_filter),
            Some(log::LevelFilter::Debug)
        );
    }

    #[test]
    fn test_notify_event_from_hook_arguments() {
        let cli = Cli::try_parse_from(["panegrid", "notify", "--event", "split", "--pane", "%4"])
            .unwrap();
        let Commands::Notify { event, pane, size } = cli.command else {
            panic!("expected notify");
        };
        assert_eq!(event, Some(HookEventArg::Split));
        assert_eq!(
            HookEventArg::Split.to_change_event(pane.as_deref(), size.as_deref()),
            ChangeEvent::PaneSplit(4)
        );

        assert_eq!(
            HookEventArg::Resized.to_change_event(None, Some("300x50")),
            ChangeEvent::Resized {
                width: 300,
                height: 50
            }
        );
        // tmux left the format unexpanded
        assert_eq!(
            HookEventArg::Exited.to_change_event(Some("#{hook_pane}"), None),
            ChangeEvent::External
        );
    }

    #[test]
    fn test_create_shell_flag() {
        let cli = Cli::try_parse_from(["panegrid", "create", "scratch", "--shell"]).unwrap();
        assert!(matches!(cli.command, Commands::Create { shell: true, .. }));
    }
}
