//! Wiring for one project: config, tmux, state, locks, layout, reconciler
//! and action dispatch, plus the long-running watch loop.
//!
//! While `watch` runs it owns the project: other invocations [`submit`]
//! their requests over the control socket instead of touching the state
//! file themselves.
//!
//! [`submit`]: Controller::submit

use crate::actions::{ActionDispatcher, ActionError, ActionOutcome, PaneAction};
use crate::best_effort;
use crate::control::{self, ControlError, ControlReply, ControlRequest, ControlServer};
use crate::events::{self, ChangeEvent, HookWatcher, run_event_loop, spawn_poller};
use crate::layout::{LayoutBounds, LayoutSession, SpacerManager};
use crate::lifecycle::{LifecycleManager, LockInfo};
use crate::reconcile::{
    HEALTH_OPTION, HealthSnapshot, PublishedHealth, ReconcileOutcome, Reconciler,
};
use crate::state::{StateDocument, StateStore};
use crate::worktree::DirectoryWorktrees;
use anyhow::{Context, Result};
use panegrid_config::Config;
use panegrid_tmux::{Multiplexer, TmuxClient, TmuxPane, TmuxPaneId, TmuxResult, parse_pane_id};
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Environment variable tmux sets to the pane a process runs in
pub const TMUX_PANE_ENV: &str = "TMUX_PANE";

/// Pick the sidebar pane: an explicit `%N` wins, then (when `from_env`) the
/// pane this process runs in.
pub fn resolve_control_pane(explicit: Option<&str>, from_env: bool) -> Result<Option<TmuxPaneId>> {
    if let Some(handle) = explicit {
        return parse_pane_id(handle)
            .map(Some)
            .with_context(|| format!("Invalid pane handle '{}', expected %N", handle));
    }
    if from_env {
        return Ok(std::env::var(TMUX_PANE_ENV)
            .ok()
            .and_then(|value| parse_pane_id(&value)));
    }
    Ok(None)
}

/// Everything `status` prints
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub state_file: PathBuf,
    pub document: StateDocument,
    pub live: Vec<TmuxPane>,
    pub locks: Vec<LockInfo>,
    pub health: HealthSnapshot,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "State file: {}", self.state_file.display())?;
        match self.document.control_pane_id {
            Some(pane) => writeln!(f, "Control pane: %{}", pane)?,
            None => writeln!(f, "Control pane: unknown")?,
        }
        writeln!(f, "Tracked panes: {}", self.document.panes.len())?;
        for record in &self.document.panes {
            let handle = record
                .external_pane_id
                .map(|pane| format!("%{}", pane))
                .unwrap_or_else(|| "-".to_string());
            let state = match record.external_pane_id {
                Some(pane) if self.live.iter().any(|p| p.id == pane) => "live",
                _ => "missing",
            };
            write!(f, "  {:<24} {:<9} {:<5} {}", record.slug, record.kind, handle, state)?;
            if let Some(path) = &record.worktree_path {
                write!(f, "  {}", path.display())?;
            }
            writeln!(f)?;
        }
        writeln!(f, "Live panes: {}", self.live.len())?;
        for lock in &self.locks {
            writeln!(
                f,
                "Lock: {} ({:?}, {}, {:.1}s)",
                lock.keys.join(", "),
                lock.intent,
                lock.reason,
                lock.age.as_secs_f64()
            )?;
        }
        if self.health.degraded {
            writeln!(
                f,
                "Health: degraded ({} consecutive failures)",
                self.health.consecutive_failures
            )?;
        }
        Ok(())
    }
}

/// One project's panegrid instance
pub struct Controller {
    config: Config,
    project_root: PathBuf,
    mux: Arc<dyn Multiplexer>,
    store: Arc<StateStore>,
    locks: Arc<LifecycleManager>,
    layout: Arc<LayoutSession>,
    reconciler: Arc<Reconciler>,
    dispatcher: ActionDispatcher,
}

impl Controller {
    /// Build against an existing multiplexer
    pub fn new(
        config: Config,
        project_root: impl Into<PathBuf>,
        mux: Arc<dyn Multiplexer>,
        control_pane: Option<TmuxPaneId>,
    ) -> Self {
        let project_root = project_root.into();
        let store = Arc::new(StateStore::new(config.state_file(&project_root)));
        let locks = Arc::new(LifecycleManager::new(config.lock_timeout()));
        let worktrees = Arc::new(DirectoryWorktrees::new(config.worktrees_dir(&project_root)));
        let layout = Arc::new(LayoutSession::new(
            Arc::clone(&mux),
            LayoutBounds::from_config(&config),
            SpacerManager::new(config.spacer_title.clone()),
        ));

        let reconciler = Arc::new(
            Reconciler::new(
                Arc::clone(&mux),
                Arc::clone(&store),
                Arc::clone(&locks),
                worktrees.clone(),
                config.spacer_title.clone(),
                config.failure_threshold,
            )
            .with_layout(Arc::clone(&layout))
            .with_control_pane(control_pane)
            .with_health_publishing(project_root.clone()),
        );
        let dispatcher = ActionDispatcher::new(
            Arc::clone(&mux),
            Arc::clone(&store),
            Arc::clone(&locks),
            worktrees,
            Arc::clone(&reconciler),
        )
        .with_layout(Arc::clone(&layout))
        .with_control_pane(control_pane);

        Self {
            config,
            project_root,
            mux,
            store,
            locks,
            layout,
            reconciler,
            dispatcher,
        }
    }

    /// Build against the tmux binary named in the config. Window commands
    /// target the control pane's window when one is known.
    pub fn with_tmux(
        config: Config,
        project_root: impl Into<PathBuf>,
        socket_name: Option<String>,
        control_pane: Option<TmuxPaneId>,
    ) -> Self {
        let mut client = TmuxClient::new(&config.tmux_path).with_timeout(config.command_timeout());
        if let Some(socket) = socket_name {
            client = client.with_socket_name(socket);
        }
        if let Some(pane) = control_pane {
            client = client.with_target_pane(pane);
        }
        Self::new(config, project_root, Arc::new(client), control_pane)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<LifecycleManager> {
        &self.locks
    }

    pub fn layout(&self) -> &Arc<LayoutSession> {
        &self.layout
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub async fn reconcile(&self) -> ReconcileOutcome {
        self.reconciler.reconcile().await
    }

    pub async fn dispatch(&self, action: PaneAction) -> Result<ActionOutcome, ActionError> {
        self.dispatcher.dispatch(action).await
    }

    /// Run `request` in this process
    pub async fn handle(&self, request: ControlRequest) -> ControlReply {
        match request {
            ControlRequest::Action { action } => match self.dispatch(action).await {
                Ok(outcome) => ControlReply::Action { outcome },
                Err(e) => ControlReply::Error {
                    message: e.to_string(),
                },
            },
            ControlRequest::Reconcile => ControlReply::Reconciled {
                outcome: self.reconcile().await,
            },
        }
    }

    /// Run `request` in the project's `watch` when one is listening, here
    /// otherwise
    pub async fn submit(&self, request: ControlRequest) -> Result<ControlReply> {
        let socket = self.config.control_socket(&self.project_root);
        if let Some(reply) = control::forward(&socket, &request)
            .await
            .context("Failed to reach the running watch")?
        {
            return Ok(reply);
        }
        Ok(self.handle(request).await)
    }

    /// Health as the project's `watch` last published it
    async fn published_health(&self) -> Option<HealthSnapshot> {
        let value = best_effort(
            "read published health",
            self.mux.get_option(HEALTH_OPTION).await,
        )??;
        PublishedHealth::parse_for(&value, &self.project_root)
    }

    pub async fn status(&self) -> Result<StatusReport> {
        let document = self
            .store
            .load()
            .await
            .context("Failed to read pane state")?;
        let live = self
            .mux
            .list_panes()
            .await
            .context("Failed to list tmux panes")?;
        Ok(StatusReport {
            state_file: self.store.path().to_path_buf(),
            document,
            live,
            locks: self.locks.held(),
            health: match self.published_health().await {
                Some(health) => health,
                None => self.reconciler.health().snapshot(),
            },
        })
    }

    /// Make tmux run `<exe> notify` for this project on pane changes
    pub async fn install_hooks(&self, exe: &Path) -> TmuxResult<usize> {
        events::install_hooks(self.mux.as_ref(), exe, &self.project_root).await
    }

    /// Wake a running `watch` for this project with `event`
    pub fn notify(&self, event: &ChangeEvent) -> Result<()> {
        events::touch_trigger(&self.config.hook_trigger_file(&self.project_root), event)
    }

    /// Reconcile on every hook, poll tick and user action until `shutdown`
    /// resolves, serving forwarded requests meanwhile.
    ///
    /// Fails straight away if another watch already serves this project.
    pub async fn watch<S>(&self, shutdown: S) -> Result<()>
    where
        S: Future<Output = ()>,
    {
        let server = match ControlServer::bind(&self.config.control_socket(&self.project_root))
            .await
        {
            Ok(server) => Some(server),
            Err(e @ ControlError::AlreadyServing(_)) => return Err(e.into()),
            Err(e) => {
                log::warn!("Control socket disabled: {}", e);
                None
            }
        };

        let sweeper = self.locks.spawn_sweeper(self.config.lock_sweep_interval());
        let (notifier, events) = events::channel();
        self.dispatcher.set_notifier(Some(notifier.clone()));

        let trigger = self.config.hook_trigger_file(&self.project_root);
        let _hooks = match HookWatcher::new(&trigger, notifier.clone(), self.config.poll_interval())
        {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                log::warn!("Hook trigger watching disabled: {:#}", e);
                None
            }
        };
        let poller = spawn_poller(notifier, self.config.poll_interval());

        log::info!(
            "Watching {} (poll every {:?})",
            self.project_root.display(),
            self.config.poll_interval()
        );
        let event_loop = run_event_loop(
            events,
            Arc::clone(&self.reconciler),
            self.config.event_debounce(),
        );
        let serving = async {
            match &server {
                Some(server) => server.serve(|request| self.handle(request)).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::select! {
            _ = event_loop => {}
            _ = serving => {}
            _ = shutdown => log::info!("Shutting down watch loop"),
        }

        self.dispatcher.set_notifier(None);
        poller.abort();
        sweeper.abort();
        Ok(())
    }
}
