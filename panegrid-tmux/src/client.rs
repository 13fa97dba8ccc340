//! The multiplexer control surface
//!
//! [`Multiplexer`] is the narrow seam between panegrid's core and tmux. The
//! reconciler, layout applier and action dispatcher only ever talk to this
//! trait, which keeps them testable against an in-memory implementation.
//!
//! [`TmuxClient`] implements it by running the tmux binary once per call.
//! Every call is bounded by a timeout; the child is killed if it overruns.

use crate::commands::{SplitDirection, TmuxCommand};
use crate::error::{TmuxError, TmuxResult};
use crate::types::{TmuxPane, TmuxPaneId, parse_pane_id};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

/// Default bound on a single tmux invocation
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Operations panegrid needs from a terminal multiplexer.
///
/// All calls are fire-and-forget from tmux's point of view: there is no
/// transaction spanning two calls, so callers must re-validate live state
/// before acting on anything they read earlier.
#[async_trait]
pub trait Multiplexer: Send + Sync {
    /// List the live panes of the managed window.
    async fn list_panes(&self) -> TmuxResult<Vec<TmuxPane>>;

    /// Split `target`, returning the new pane's ID.
    async fn split_pane(
        &self,
        target: TmuxPaneId,
        direction: SplitDirection,
        start_dir: Option<&Path>,
    ) -> TmuxResult<TmuxPaneId>;

    /// Kill a pane.
    async fn kill_pane(&self, pane: TmuxPaneId) -> TmuxResult<()>;

    /// Resize a pane; `None` leaves that dimension alone.
    async fn resize_pane(
        &self,
        pane: TmuxPaneId,
        width: Option<usize>,
        height: Option<usize>,
    ) -> TmuxResult<()>;

    /// Resize the managed window.
    async fn resize_window(&self, width: usize, height: usize) -> TmuxResult<()>;

    /// Apply a raw layout descriptor to the managed window.
    async fn select_layout(&self, descriptor: &str) -> TmuxResult<()>;

    /// Set a pane's title.
    async fn set_pane_title(&self, pane: TmuxPaneId, title: &str) -> TmuxResult<()>;

    /// Type `text` into a pane, optionally followed by Enter.
    async fn send_keys(&self, pane: TmuxPaneId, text: &str, enter: bool) -> TmuxResult<()>;

    /// Read a global option; `None` when unset.
    async fn get_option(&self, name: &str) -> TmuxResult<Option<String>>;

    /// Set a global option.
    async fn set_option(&self, name: &str, value: &str) -> TmuxResult<()>;

    /// Managed window dimensions as `(width, height)`.
    async fn window_size(&self) -> TmuxResult<(usize, usize)>;

    /// Dimensions of the terminal showing the window.
    ///
    /// This is what a layout is computed against. The window itself is
    /// resized by every layout apply, so it is never a usable input.
    async fn terminal_size(&self) -> TmuxResult<(usize, usize)>;

    /// Install a global hook running `shell_command` in the background.
    async fn set_hook(&self, hook: &str, shell_command: &str) -> TmuxResult<()>;
}

/// [`Multiplexer`] backed by the tmux binary
#[derive(Debug, Clone)]
pub struct TmuxClient {
    binary: PathBuf,
    socket_name: Option<String>,
    /// Pane whose window the window-scoped commands act on
    target_pane: Option<TmuxPaneId>,
    timeout: Duration,
}

impl Default for TmuxClient {
    fn default() -> Self {
        Self::new("tmux")
    }
}

impl TmuxClient {
    /// Create a client for the given tmux binary
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            socket_name: None,
            target_pane: None,
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    /// Talk to the server on a named socket (`tmux -L`)
    pub fn with_socket_name(mut self, name: impl Into<String>) -> Self {
        self.socket_name = Some(name.into());
        self
    }

    /// Act on the window holding `pane` instead of the invoking client's
    pub fn with_target_pane(mut self, pane: TmuxPaneId) -> Self {
        self.target_pane = Some(pane);
        self
    }

    pub fn target_pane(&self) -> Option<TmuxPaneId> {
        self.target_pane
    }

    /// Bound each invocation by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether the current process runs inside a tmux client
    pub fn inside_tmux() -> bool {
        std::env::var_os("TMUX").is_some()
    }

    /// Run a command and return its stdout.
    pub async fn run(&self, cmd: &TmuxCommand) -> TmuxResult<String> {
        let mut process = Command::new(&self.binary);
        if let Some(socket) = &self.socket_name {
            process.arg("-L").arg(socket);
        }
        process
            .args(cmd.args())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        log::trace!("tmux {}", cmd);

        let output = match tokio::time::timeout(self.timeout, process.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(TmuxError::Spawn {
                    command: cmd.name().to_string(),
                    source,
                });
            }
            Err(_) => {
                return Err(TmuxError::Timeout {
                    command: cmd.name().to_string(),
                    timeout: self.timeout,
                });
            }
        };

        if !output.status.success() {
            return Err(TmuxError::Failed {
                command: cmd.name().to_string(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_unit(&self, cmd: TmuxCommand) -> TmuxResult<()> {
        self.run(&cmd).await.map(|_| ())
    }

    /// Run a `display-message` printing `<width>\t<height>`.
    ///
    /// `Ok(None)` when tmux printed empty fields.
    async fn run_size(&self, cmd: TmuxCommand) -> TmuxResult<Option<(usize, usize)>> {
        let output = self.run(&cmd).await?;
        let Some((w, h)) = output.trim_end_matches('\n').split_once('\t') else {
            return Err(unexpected(&cmd, &output));
        };
        if w.trim().is_empty() && h.trim().is_empty() {
            return Ok(None);
        }
        match (w.trim().parse(), h.trim().parse()) {
            (Ok(w), Ok(h)) => Ok(Some((w, h))),
            _ => Err(unexpected(&cmd, &output)),
        }
    }
}

fn unexpected(cmd: &TmuxCommand, output: &str) -> TmuxError {
    TmuxError::UnexpectedOutput {
        command: cmd.name().to_string(),
        output: output.to_string(),
    }
}

#[async_trait]
impl Multiplexer for TmuxClient {
    async fn list_panes(&self) -> TmuxResult<Vec<TmuxPane>> {
        let cmd = TmuxCommand::list_panes(self.target_pane);
        let output = self.run(&cmd).await?;
        let mut panes = Vec::new();
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            match TmuxPane::parse_list_line(line) {
                Some(pane) => panes.push(pane),
                None => log::warn!("Skipping unparsable list-panes line: {:?}", line),
            }
        }
        Ok(panes)
    }

    async fn split_pane(
        &self,
        target: TmuxPaneId,
        direction: SplitDirection,
        start_dir: Option<&Path>,
    ) -> TmuxResult<TmuxPaneId> {
        let cmd = TmuxCommand::split_window(target, direction, start_dir);
        let output = self.run(&cmd).await?;
        parse_pane_id(output.trim()).ok_or_else(|| unexpected(&cmd, &output))
    }

    async fn kill_pane(&self, pane: TmuxPaneId) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::kill_pane(pane)).await
    }

    async fn resize_pane(
        &self,
        pane: TmuxPaneId,
        width: Option<usize>,
        height: Option<usize>,
    ) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::resize_pane(pane, width, height))
            .await
    }

    async fn resize_window(&self, width: usize, height: usize) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::resize_window(self.target_pane, width, height))
            .await
    }

    async fn select_layout(&self, descriptor: &str) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::select_layout(self.target_pane, descriptor))
            .await
    }

    async fn set_pane_title(&self, pane: TmuxPaneId, title: &str) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::set_pane_title(pane, title)).await
    }

    async fn send_keys(&self, pane: TmuxPaneId, text: &str, enter: bool) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::send_literal(pane, text)).await?;
        if enter {
            self.run_unit(TmuxCommand::send_key(pane, "Enter")).await?;
        }
        Ok(())
    }

    async fn get_option(&self, name: &str) -> TmuxResult<Option<String>> {
        let output = self.run(&TmuxCommand::show_option(name)).await?;
        let value = output.trim();
        Ok((!value.is_empty()).then(|| value.to_string()))
    }

    async fn set_option(&self, name: &str, value: &str) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::set_option(name, value)).await
    }

    async fn window_size(&self) -> TmuxResult<(usize, usize)> {
        let cmd = TmuxCommand::window_size(self.target_pane);
        match self.run_size(cmd.clone()).await? {
            Some(size) => Ok(size),
            None => Err(unexpected(&cmd, "")),
        }
    }

    async fn terminal_size(&self) -> TmuxResult<(usize, usize)> {
        match self
            .run_size(TmuxCommand::client_size(self.target_pane))
            .await?
        {
            Some(size) => Ok(size),
            None => {
                // Detached session: the window is all there is to go by
                log::debug!("No client attached; using window size as terminal size");
                self.window_size().await
            }
        }
    }

    async fn set_hook(&self, hook: &str, shell_command: &str) -> TmuxResult<()> {
        self.run_unit(TmuxCommand::set_hook(hook, shell_command))
            .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_target_pane_builder() {
        let client = TmuxClient::default();
        assert_eq!(client.target_pane(), None);
        assert_eq!(client.with_target_pane(3).target_pane(), Some(3));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let client = TmuxClient::new("/nonexistent/panegrid-tmux-binary");
        let err = client.list_panes().await.unwrap_err();
        assert!(matches!(err, TmuxError::Spawn { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let client = TmuxClient::new("false");
        let err = client.kill_pane(3).await.unwrap_err();
        match err {
            TmuxError::Failed { command, .. } => assert_eq!(command, "kill-pane"),
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_output_handling() {
        // `true` ignores its arguments and prints nothing.
        let client = TmuxClient::new("true").with_timeout(Duration::from_secs(2));
        assert!(client.list_panes().await.unwrap().is_empty());
        assert_eq!(client.get_option("@panegrid").await.unwrap(), None);
        assert!(matches!(
            client.window_size().await,
            Err(TmuxError::UnexpectedOutput { .. })
        ));
        assert!(matches!(
            client.terminal_size().await,
            Err(TmuxError::UnexpectedOutput { .. })
        ));
        assert!(matches!(
            client.split_pane(1, SplitDirection::Right, None).await,
            Err(TmuxError::UnexpectedOutput { .. })
        ));
    }
}
