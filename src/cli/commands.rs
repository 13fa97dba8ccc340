//! Subcommand implementations

use super::{Cli, Commands};
use crate::actions::{ActionOutcome, PaneAction};
use crate::control::{ControlReply, ControlRequest};
use crate::controller::{Controller, resolve_control_pane};
use crate::events::ChangeEvent;
use crate::reconcile::ReconcileOutcome;
use crate::state::{PaneKind, StateStore};
use anyhow::{Context, Result};
use panegrid_config::Config;
use panegrid_tmux::TmuxClient;
use std::path::PathBuf;

fn project_root(cli: &Cli) -> Result<PathBuf> {
    let root = match &cli.project {
        Some(dir) => dir.clone(),
        None => std::env::current_dir().context("Failed to read current directory")?,
    };
    root.canonicalize()
        .with_context(|| format!("Project directory {} not found", root.display()))
}

fn load_config(cli: &Cli) -> Result<Config> {
    match &cli.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
}

fn print_outcome(outcome: &ActionOutcome) -> i32 {
    match outcome {
        ActionOutcome::Closed { slug } => println!("Closed {}", slug),
        ActionOutcome::Attached { slug, pane } => println!("Attached {} (%{})", slug, pane),
        ActionOutcome::Created { slug, pane } => println!("Created {} (%{})", slug, pane),
        ActionOutcome::Renamed { from, to } => println!("Renamed {} -> {}", from, to),
        ActionOutcome::Refreshed { applied: true } => println!("Layout applied"),
        ActionOutcome::Refreshed { applied: false } => println!("Layout unchanged"),
        ActionOutcome::Skipped { reason } => {
            eprintln!("Skipped: {}", reason);
            return 2;
        }
    }
    0
}

fn print_reconcile(outcome: &ReconcileOutcome) -> i32 {
    match outcome {
        ReconcileOutcome::Completed(report) => {
            println!(
                "Reconciled: {} rebound, {} pruned, {} adopted, {} recreated, {} dropped{}",
                report.rebound,
                report.pruned,
                report.adopted,
                report.recreated,
                report.dropped,
                if report.layout_applied { ", layout applied" } else { "" }
            );
            if report.spacer_overflow {
                eprintln!("Warning: pane width bounds do not fit this terminal; spacer clamped");
            }
            0
        }
        ReconcileOutcome::Coalesced => 0,
        ReconcileOutcome::Failed(error) => {
            eprintln!("panegrid: reconcile failed: {}", error);
            1
        }
    }
}

fn print_reply(reply: &ControlReply) -> i32 {
    match reply {
        ControlReply::Action { outcome } => print_outcome(outcome),
        ControlReply::Reconciled { outcome } => print_reconcile(outcome),
        ControlReply::Error { message } => {
            eprintln!("panegrid: {}", message);
            1
        }
    }
}

/// Run the parsed command line. Returns the process exit code.
pub async fn run(cli: Cli) -> Result<i32> {
    let config = load_config(&cli)?;
    let root = project_root(&cli)?;
    let watching = matches!(cli.command, Commands::Watch);
    let mut control_pane = resolve_control_pane(cli.control_pane.as_deref(), watching)?;
    if control_pane.is_none() && !watching {
        // Target the sidebar's window even when run from elsewhere
        control_pane = StateStore::new(config.state_file(&root))
            .load_or_empty()
            .await
            .control_pane_id;
    }
    if watching && control_pane.is_none() && !TmuxClient::inside_tmux() {
        log::warn!("Not inside tmux and no --control-pane given; panes will not be adopted");
    }
    log::debug!(
        "Project {} (control pane {:?})",
        root.display(),
        control_pane
    );

    let controller = Controller::with_tmux(config, root, cli.socket_name.clone(), control_pane);

    let action = match cli.command {
        Commands::Reconcile | Commands::Layout { force: false } => {
            let reply = controller.submit(ControlRequest::Reconcile).await?;
            return Ok(print_reply(&reply));
        }
        Commands::Watch => {
            controller
                .watch(async {
                    if let Err(e) = tokio::signal::ctrl_c().await {
                        log::warn!("Failed to listen for Ctrl-C: {}", e);
                        std::future::pending::<()>().await;
                    }
                })
                .await?;
            return Ok(0);
        }
        Commands::Notify { event, pane, size } => {
            let event = match event {
                Some(kind) => kind.to_change_event(pane.as_deref(), size.as_deref()),
                None => ChangeEvent::External,
            };
            controller.notify(&event)?;
            return Ok(0);
        }
        Commands::Status { json } => {
            let status = controller.status().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&status.document)?);
            } else {
                print!("{}", status);
            }
            return Ok(0);
        }
        Commands::InstallHooks => {
            let exe = std::env::current_exe().context("Failed to locate panegrid binary")?;
            let count = controller.install_hooks(&exe).await?;
            println!("Installed {} tmux hooks", count);
            return Ok(0);
        }
        Commands::Layout { force: true } => PaneAction::Refresh,
        Commands::Close { pane } => PaneAction::Close { pane_id: pane },
        Commands::Attach { pane } => PaneAction::Attach { pane_id: pane },
        Commands::Create { slug, shell } => PaneAction::Create {
            slug,
            kind: if shell {
                PaneKind::Shell
            } else {
                PaneKind::Worktree
            },
        },
        Commands::Rename { pane, slug } => PaneAction::Rename {
            pane_id: pane,
            slug,
        },
    };

    let reply = controller.submit(ControlRequest::Action { action }).await?;
    Ok(print_reply(&reply))
}
