//! Shared integration test helpers for panegrid.
//!
//! Provides [`FakeMultiplexer`], an in-memory stand-in for tmux, and a
//! [`TestProject`] that wires a reconciler and dispatcher around it inside a
//! temporary project directory.
//!
//! # Usage
//!
//! ```ignore
//! mod common;
//! use common::{FakeMultiplexer, TestProject};
//! ```
//!
//! The `#[allow(dead_code)]` attribute suppresses warnings when only a subset
//! of helpers is used per test file.

#![allow(dead_code)]

use async_trait::async_trait;
use panegrid::actions::ActionDispatcher;
use panegrid::layout::{LayoutBounds, LayoutSession, SpacerManager};
use panegrid::lifecycle::LifecycleManager;
use panegrid::reconcile::Reconciler;
use panegrid::state::{StateDocument, StateStore};
use panegrid::worktree::DirectoryWorktrees;
use panegrid_tmux::{
    Multiplexer, SplitDirection, TmuxError, TmuxLayout, TmuxPane, TmuxPaneId, TmuxResult,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const SPACER_TITLE: &str = "panegrid-spacer";

#[derive(Debug, Default)]
struct FakeState {
    panes: BTreeMap<TmuxPaneId, TmuxPane>,
    next_id: TmuxPaneId,
    /// The attached client; `resize-window` never changes it
    terminal: (usize, usize),
    window: (usize, usize),
    options: HashMap<String, String>,
    hooks: Vec<(String, String)>,
    calls: Vec<String>,
    fail_splits: bool,
    split_delay: Option<Duration>,
}

/// In-memory tmux: a pane map, titles, and a log of every mutating call.
///
/// `select-layout` is strict like tmux: the descriptor must name exactly the
/// live panes.
#[derive(Debug, Default)]
pub struct FakeMultiplexer {
    state: Mutex<FakeState>,
}

fn missing(command: &str, pane: TmuxPaneId) -> TmuxError {
    TmuxError::Failed {
        command: command.to_string(),
        status: "exit status: 1".to_string(),
        stderr: format!("can't find pane: %{}", pane),
    }
}

impl FakeMultiplexer {
    /// A `width` x `height` terminal holding panes `%0..%n` with the given titles
    pub fn with_panes(titles: &[&str], width: usize, height: usize) -> Arc<Self> {
        let fake = Self::default();
        {
            let mut state = fake.state.lock();
            state.terminal = (width, height);
            state.window = (width, height);
            for title in titles {
                let id = state.next_id;
                state.next_id += 1;
                let mut pane = TmuxPane::new(id);
                pane.title = title.to_string();
                state.panes.insert(id, pane);
            }
        }
        Arc::new(fake)
    }

    /// Simulate a pane dying outside panegrid's control
    pub fn remove_pane(&self, pane: TmuxPaneId) {
        self.state.lock().panes.remove(&pane);
    }

    /// Simulate a user splitting a pane by hand
    pub fn add_pane(&self, title: &str) -> TmuxPaneId {
        let mut state = self.state.lock();
        let id = state.next_id;
        state.next_id += 1;
        let mut pane = TmuxPane::new(id);
        pane.title = title.to_string();
        state.panes.insert(id, pane);
        id
    }

    pub fn set_fail_splits(&self, fail: bool) {
        self.state.lock().fail_splits = fail;
    }

    /// Make every split wait `delay` after tmux has created the pane,
    /// like a slow `split-window` round trip
    pub fn set_split_delay(&self, delay: Duration) {
        self.state.lock().split_delay = Some(delay);
    }

    /// Simulate the user resizing their terminal
    pub fn set_terminal_size(&self, width: usize, height: usize) {
        let mut state = self.state.lock();
        state.terminal = (width, height);
        state.window = (width, height);
    }

    pub fn window(&self) -> (usize, usize) {
        self.state.lock().window
    }

    pub fn option(&self, name: &str) -> Option<String> {
        self.state.lock().options.get(name).cloned()
    }

    pub fn pane_ids(&self) -> Vec<TmuxPaneId> {
        self.state.lock().panes.keys().copied().collect()
    }

    pub fn title(&self, pane: TmuxPaneId) -> Option<String> {
        self.state.lock().panes.get(&pane).map(|p| p.title.clone())
    }

    pub fn start_dir(&self, pane: TmuxPaneId) -> Option<String> {
        self.state.lock().panes.get(&pane).map(|p| p.current_path.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Calls whose log line starts with `prefix`
    pub fn calls_matching(&self, prefix: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| call.starts_with(prefix))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn hooks(&self) -> Vec<(String, String)> {
        self.state.lock().hooks.clone()
    }

    /// Create the pane; the caller then waits out any split delay unlocked
    fn split_now(
        &self,
        target: TmuxPaneId,
        direction: SplitDirection,
        start_dir: Option<&Path>,
    ) -> TmuxResult<(TmuxPaneId, Option<Duration>)> {
        let mut state = self.state.lock();
        if state.fail_splits {
            return Err(TmuxError::Failed {
                command: "split-window".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "no space for new pane".to_string(),
            });
        }
        if !state.panes.contains_key(&target) {
            return Err(missing("split-window", target));
        }
        let id = state.next_id;
        state.next_id += 1;
        let mut pane = TmuxPane::new(id);
        pane.current_path = start_dir
            .map(|dir| dir.display().to_string())
            .unwrap_or_default();
        state.panes.insert(id, pane);
        state
            .calls
            .push(format!("split %{} {:?} -> %{}", target, direction, id));
        Ok((id, state.split_delay))
    }
}

#[async_trait]
impl Multiplexer for FakeMultiplexer {
    async fn list_panes(&self) -> TmuxResult<Vec<TmuxPane>> {
        Ok(self.state.lock().panes.values().cloned().collect())
    }

    async fn split_pane(
        &self,
        target: TmuxPaneId,
        direction: SplitDirection,
        start_dir: Option<&Path>,
    ) -> TmuxResult<TmuxPaneId> {
        let (id, delay) = self.split_now(target, direction, start_dir)?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(id)
    }

    async fn kill_pane(&self, pane: TmuxPaneId) -> TmuxResult<()> {
        let mut state = self.state.lock();
        if state.panes.remove(&pane).is_none() {
            return Err(missing("kill-pane", pane));
        }
        state.calls.push(format!("kill %{}", pane));
        Ok(())
    }

    async fn resize_pane(
        &self,
        pane: TmuxPaneId,
        width: Option<usize>,
        height: Option<usize>,
    ) -> TmuxResult<()> {
        let mut state = self.state.lock();
        if !state.panes.contains_key(&pane) {
            return Err(missing("resize-pane", pane));
        }
        state
            .calls
            .push(format!("resize-pane %{} {:?} {:?}", pane, width, height));
        Ok(())
    }

    async fn resize_window(&self, width: usize, height: usize) -> TmuxResult<()> {
        let mut state = self.state.lock();
        state.window = (width, height);
        state.calls.push(format!("resize-window {}x{}", width, height));
        Ok(())
    }

    async fn select_layout(&self, descriptor: &str) -> TmuxResult<()> {
        let mut state = self.state.lock();
        let mut cells = TmuxLayout::parse(descriptor)
            .map(|layout| layout.pane_ids())
            .unwrap_or_default();
        cells.sort_unstable();
        let live: Vec<TmuxPaneId> = state.panes.keys().copied().collect();
        if cells != live {
            return Err(TmuxError::Failed {
                command: "select-layout".to_string(),
                status: "exit status: 1".to_string(),
                stderr: format!("invalid layout: {}", descriptor),
            });
        }
        state.calls.push(format!("select-layout {}", descriptor));
        Ok(())
    }

    async fn set_pane_title(&self, pane: TmuxPaneId, title: &str) -> TmuxResult<()> {
        let mut state = self.state.lock();
        match state.panes.get_mut(&pane) {
            Some(p) => p.title = title.to_string(),
            None => return Err(missing("select-pane", pane)),
        }
        state.calls.push(format!("title %{} {}", pane, title));
        Ok(())
    }

    async fn send_keys(&self, pane: TmuxPaneId, text: &str, enter: bool) -> TmuxResult<()> {
        self.state
            .lock()
            .calls
            .push(format!("send-keys %{} {:?} {}", pane, text, enter));
        Ok(())
    }

    async fn get_option(&self, name: &str) -> TmuxResult<Option<String>> {
        Ok(self.state.lock().options.get(name).cloned())
    }

    async fn set_option(&self, name: &str, value: &str) -> TmuxResult<()> {
        self.state
            .lock()
            .options
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    async fn window_size(&self) -> TmuxResult<(usize, usize)> {
        Ok(self.state.lock().window)
    }

    async fn terminal_size(&self) -> TmuxResult<(usize, usize)> {
        Ok(self.state.lock().terminal)
    }

    async fn set_hook(&self, hook: &str, shell_command: &str) -> TmuxResult<()> {
        self.state
            .lock()
            .hooks
            .push((hook.to_string(), shell_command.to_string()));
        Ok(())
    }
}

/// A temporary project wired around a [`FakeMultiplexer`].
///
/// Keep the struct alive for the whole test; dropping it removes the
/// project directory.
pub struct TestProject {
    pub dir: TempDir,
    pub mux: Arc<FakeMultiplexer>,
    pub store: Arc<StateStore>,
    pub locks: Arc<LifecycleManager>,
    pub layout: Arc<LayoutSession>,
    pub reconciler: Arc<Reconciler>,
    pub dispatcher: ActionDispatcher,
}

impl TestProject {
    /// Pane `%0` is the sidebar, titled "sidebar"; `titles` become `%1..`.
    pub fn new(titles: &[&str]) -> Self {
        let mut all = vec!["sidebar"];
        all.extend_from_slice(titles);
        let mux = FakeMultiplexer::with_panes(&all, 200, 50);
        Self::with_mux(mux, Some(0))
    }

    pub fn with_mux(mux: Arc<FakeMultiplexer>, control_pane: Option<TmuxPaneId>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(StateStore::new(dir.path().join(".panegrid").join("panes.json")));
        let locks = Arc::new(LifecycleManager::new(Duration::from_secs(30)));
        let worktrees = Arc::new(DirectoryWorktrees::new(dir.path().join("worktrees")));
        let layout = Arc::new(LayoutSession::new(
            mux.clone(),
            LayoutBounds::default(),
            SpacerManager::new(SPACER_TITLE),
        ));
        let reconciler = Arc::new(
            Reconciler::new(
                mux.clone(),
                Arc::clone(&store),
                Arc::clone(&locks),
                worktrees.clone(),
                SPACER_TITLE,
                3,
            )
            .with_layout(Arc::clone(&layout))
            .with_control_pane(control_pane),
        );
        let dispatcher = ActionDispatcher::new(
            mux.clone(),
            Arc::clone(&store),
            Arc::clone(&locks),
            worktrees,
            Arc::clone(&reconciler),
        )
        .with_layout(Arc::clone(&layout))
        .with_control_pane(control_pane);

        Self {
            dir,
            mux,
            store,
            locks,
            layout,
            reconciler,
            dispatcher,
        }
    }

    pub fn worktree_dir(&self, slug: &str) -> PathBuf {
        self.dir.path().join("worktrees").join(slug)
    }

    /// Create the worktree directory for `slug` and return it
    pub fn make_worktree(&self, slug: &str) -> PathBuf {
        let path = self.worktree_dir(slug);
        std::fs::create_dir_all(&path).expect("Failed to create worktree dir");
        path
    }

    /// Write a document straight to disk, bypassing the store
    pub fn seed(&self, doc: &StateDocument) {
        let path = self.store.path();
        std::fs::create_dir_all(path.parent().expect("state file has a parent"))
            .expect("Failed to create state dir");
        std::fs::write(path, serde_json::to_string_pretty(doc).expect("serialize"))
            .expect("Failed to write state file");
    }

    pub async fn doc(&self) -> StateDocument {
        self.store.load().await.expect("state file readable")
    }
}
