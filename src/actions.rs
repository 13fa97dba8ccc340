//! User actions on tracked panes.
//!
//! Each action is one [`PaneAction`] variant handled by
//! [`ActionDispatcher::dispatch`]. Actions that change the pane set take a
//! lifecycle lock first, so a reconcile pass running at the same time sees
//! the pane as fenced instead of treating the change as manual. Splits are
//! fenced from before `split-window` runs until the new record is written.
//!
//! Inside `watch` the follow-up pass is handed to the event loop as a
//! [`ChangeEvent::UserAction`]; elsewhere it runs inline.

use crate::best_effort;
use crate::events::{ChangeEvent, ChangeNotifier};
use crate::layout::{LayoutError, LayoutOptions, LayoutOutcome, LayoutSession};
use crate::lifecycle::{LifecycleManager, LockIntent};
use crate::reconcile::Reconciler;
use crate::slug::{is_valid_slug, sibling_slug};
use crate::state::{PaneKind, PaneRecord, StateDocument, StateStore, StoreError};
use crate::worktree::{WorktreeProvider, worktree_name};
use panegrid_tmux::{Multiplexer, SplitDirection, TmuxError, TmuxPaneId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Something the user asked for. `pane_id` accepts a logical ID, a slug or
/// a `%N` handle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PaneAction {
    Close { pane_id: String },
    /// Open another pane on the same worktree
    Attach { pane_id: String },
    Create { slug: String, kind: PaneKind },
    Rename { pane_id: String, slug: String },
    /// Recompute and re-apply the grid even if nothing changed
    Refresh,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ActionOutcome {
    Closed { slug: String },
    Attached { slug: String, pane: TmuxPaneId },
    Created { slug: String, pane: TmuxPaneId },
    Renamed { from: String, to: String },
    Refreshed { applied: bool },
    /// Another operation holds the pane's lock
    Skipped { reason: String },
}

#[derive(Debug, Error)]
pub enum ActionError {
    #[error("no tracked pane matches '{0}'")]
    UnknownPane(String),

    #[error("slug '{0}' is already in use")]
    SlugTaken(String),

    #[error("'{0}' is not a valid slug")]
    InvalidSlug(String),

    #[error("pane '{0}' is not bound to a worktree")]
    NotAWorktree(String),

    #[error("no control pane known; run from the sidebar pane or pass --control-pane")]
    NoControlPane,

    #[error("pane %{pane} is already tracked as '{slug}'")]
    AlreadyTracked { pane: TmuxPaneId, slug: String },

    #[error("worktree for '{slug}': {source}")]
    Worktree {
        slug: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tmux(#[from] TmuxError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Layout(#[from] LayoutError),
}

/// Runs [`PaneAction`]s against tmux and the state file
pub struct ActionDispatcher {
    mux: Arc<dyn Multiplexer>,
    store: Arc<StateStore>,
    locks: Arc<LifecycleManager>,
    worktrees: Arc<dyn WorktreeProvider>,
    reconciler: Arc<Reconciler>,
    layout: Option<Arc<LayoutSession>>,
    control_pane: Option<TmuxPaneId>,
    notifier: Mutex<Option<ChangeNotifier>>,
}

impl ActionDispatcher {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        store: Arc<StateStore>,
        locks: Arc<LifecycleManager>,
        worktrees: Arc<dyn WorktreeProvider>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            mux,
            store,
            locks,
            worktrees,
            reconciler,
            layout: None,
            control_pane: None,
            notifier: Mutex::new(None),
        }
    }

    pub fn with_layout(mut self, layout: Arc<LayoutSession>) -> Self {
        self.layout = Some(layout);
        self
    }

    pub fn with_control_pane(mut self, pane: Option<TmuxPaneId>) -> Self {
        self.control_pane = pane;
        self
    }

    /// Route follow-up passes through an event loop; `None` runs them inline
    pub fn set_notifier(&self, notifier: Option<ChangeNotifier>) {
        *self.notifier.lock() = notifier;
    }

    /// Reconcile after an action, through the event loop when one listens
    async fn settle(&self, reason: String) {
        let notifier = self.notifier.lock().clone();
        if let Some(notifier) = notifier {
            if notifier.notify(ChangeEvent::UserAction(reason)) {
                return;
            }
            log::debug!("Event loop gone; reconciling inline");
        }
        self.reconciler.reconcile().await;
    }

    pub async fn dispatch(&self, action: PaneAction) -> Result<ActionOutcome, ActionError> {
        log::debug!("Dispatching {:?}", action);
        match action {
            PaneAction::Close { pane_id } => self.close(&pane_id).await,
            PaneAction::Attach { pane_id } => self.attach(&pane_id).await,
            PaneAction::Create { slug, kind } => self.create(slug, kind).await,
            PaneAction::Rename { pane_id, slug } => self.rename(&pane_id, slug).await,
            PaneAction::Refresh => self.refresh().await,
        }
    }

    fn sidebar(&self, doc: &StateDocument) -> Option<TmuxPaneId> {
        self.control_pane.or(doc.control_pane_id)
    }

    async fn resolve(&self, key: &str) -> Result<(StateDocument, PaneRecord), ActionError> {
        let doc = self.store.load().await?;
        let record = doc
            .resolve(key)
            .cloned()
            .ok_or_else(|| ActionError::UnknownPane(key.to_string()))?;
        Ok((doc, record))
    }

    async fn close(&self, key: &str) -> Result<ActionOutcome, ActionError> {
        let (_, record) = self.resolve(key).await?;
        let Some(token) = self.locks.acquire(
            &record.id,
            record.external_pane_id,
            LockIntent::Close,
            "user close",
        ) else {
            return Ok(ActionOutcome::Skipped {
                reason: format!("{} is already being closed or rebuilt", record.slug),
            });
        };

        // Record first, pane second: a pass that sees the pane vanish then
        // has nothing left to recreate
        let id = record.id.clone();
        if let Err(e) = self.store.update(move |doc| doc.remove(&id)).await {
            self.locks.release(token);
            return Err(e.into());
        }
        if let Some(pane) = record.external_pane_id {
            best_effort("kill pane", self.mux.kill_pane(pane).await);
        }
        self.locks.release(token);

        log::info!("Closed {}", record.slug);
        self.settle(format!("close {}", record.slug)).await;
        Ok(ActionOutcome::Closed { slug: record.slug })
    }

    async fn attach(&self, key: &str) -> Result<ActionOutcome, ActionError> {
        let (doc, record) = self.resolve(key).await?;
        let path = match (&record.kind, &record.worktree_path) {
            (PaneKind::Worktree, Some(path)) => path.clone(),
            _ => return Err(ActionError::NotAWorktree(record.slug)),
        };
        let base = worktree_name(&path)
            .ok_or_else(|| ActionError::NotAWorktree(record.slug.clone()))?
            .to_string();
        let anchor = record
            .external_pane_id
            .or(self.sidebar(&doc))
            .ok_or(ActionError::NoControlPane)?;

        let fence = self.locks.begin_split();
        let pane = self
            .mux
            .split_pane(anchor, SplitDirection::Right, Some(&path))
            .await?;
        let slug = self
            .record_new_pane(pane, PaneKind::Worktree, Some(path), move |doc| {
                Ok(sibling_slug(&base, doc.slugs()))
            })
            .await?;
        drop(fence);

        log::info!("Attached {} as %{} next to {}", slug, pane, record.slug);
        self.settle(format!("attach {}", slug)).await;
        Ok(ActionOutcome::Attached { slug, pane })
    }

    async fn create(&self, slug: String, kind: PaneKind) -> Result<ActionOutcome, ActionError> {
        if !is_valid_slug(&slug) {
            return Err(ActionError::InvalidSlug(slug));
        }
        let doc = self.store.load().await?;
        if doc.slug_taken(&slug) {
            return Err(ActionError::SlugTaken(slug));
        }
        let anchor = doc
            .content_pane_ids()
            .last()
            .copied()
            .or(self.sidebar(&doc))
            .ok_or(ActionError::NoControlPane)?;

        let path = match kind {
            PaneKind::Worktree => Some(self.worktrees.ensure(&slug).map_err(|source| {
                ActionError::Worktree {
                    slug: slug.clone(),
                    source,
                }
            })?),
            PaneKind::Shell => None,
        };

        let fence = self.locks.begin_split();
        let pane = self
            .mux
            .split_pane(anchor, SplitDirection::Below, path.as_deref())
            .await?;
        let wanted = slug.clone();
        let slug = self
            .record_new_pane(pane, kind, path, move |doc| {
                if doc.slug_taken(&wanted) {
                    Err(ActionError::SlugTaken(wanted))
                } else {
                    Ok(wanted)
                }
            })
            .await?;
        drop(fence);

        log::info!("Created {} pane {} as %{}", kind, slug, pane);
        self.settle(format!("create {}", slug)).await;
        Ok(ActionOutcome::Created { slug, pane })
    }

    /// Record a freshly split pane. Callers hold a split fence around the
    /// split and this call, so a concurrent pass does not adopt the pane as an
    /// untracked shell first. The slug is picked against the fresh document
    /// inside the write queue.
    ///
    /// A pane some record already claims is left to that record. On any
    /// other failure the pane is killed.
    async fn record_new_pane<F>(
        &self,
        pane: TmuxPaneId,
        kind: PaneKind,
        path: Option<PathBuf>,
        pick_slug: F,
    ) -> Result<String, ActionError>
    where
        F: FnOnce(&StateDocument) -> Result<String, ActionError>,
    {
        let id = PaneRecord::new_id();
        let token = self
            .locks
            .acquire(&id, Some(pane), LockIntent::Busy, "new pane");

        let recorded = self
            .store
            .update(move |doc| {
                if let Some(existing) = doc.find_by_pane(pane) {
                    return Err(ActionError::AlreadyTracked {
                        pane,
                        slug: existing.slug.clone(),
                    });
                }
                let slug = pick_slug(doc)?;
                let mut record = match (kind, path) {
                    (PaneKind::Worktree, Some(path)) => PaneRecord::worktree(&slug, pane, path),
                    _ => PaneRecord::shell(&slug, pane),
                };
                record.id = id;
                doc.panes.push(record);
                Ok::<String, ActionError>(slug)
            })
            .await
            .map_err(ActionError::from)
            .and_then(|picked| picked);

        match &recorded {
            Ok(slug) => {
                best_effort("title new pane", self.mux.set_pane_title(pane, slug).await);
            }
            Err(e @ ActionError::AlreadyTracked { .. }) => {
                log::warn!("Not recording new pane: {}", e);
            }
            Err(e) => {
                log::warn!("Could not record new pane %{}: {}", pane, e);
                best_effort("kill unrecorded pane", self.mux.kill_pane(pane).await);
            }
        }
        if let Some(token) = token {
            self.locks.release(token);
        }
        recorded
    }

    async fn rename(&self, key: &str, slug: String) -> Result<ActionOutcome, ActionError> {
        if !is_valid_slug(&slug) {
            return Err(ActionError::InvalidSlug(slug));
        }
        let (_, record) = self.resolve(key).await?;

        let id = record.id.clone();
        let to = slug.clone();
        let renamed = self
            .store
            .update(move |doc| {
                if doc.panes.iter().any(|r| r.slug == to && r.id != id) {
                    return Err(ActionError::SlugTaken(to));
                }
                let record = doc
                    .find_mut(&id)
                    .ok_or_else(|| ActionError::UnknownPane(id.clone()))?;
                let from = std::mem::replace(&mut record.slug, to);
                Ok((from, record.external_pane_id))
            })
            .await?;
        let (from, pane) = renamed?;

        if let Some(pane) = pane {
            best_effort("retitle renamed pane", self.mux.set_pane_title(pane, &slug).await);
        }
        log::info!("Renamed {} to {}", from, slug);
        Ok(ActionOutcome::Renamed { from, to: slug })
    }

    async fn refresh(&self) -> Result<ActionOutcome, ActionError> {
        let Some(layout) = &self.layout else {
            return Ok(ActionOutcome::Skipped {
                reason: "no layout session".to_string(),
            });
        };
        let doc = self.store.load_or_empty().await;
        let sidebar = self.sidebar(&doc).ok_or(ActionError::NoControlPane)?;

        let live = self.mux.list_panes().await?;
        let content: Vec<TmuxPaneId> = doc
            .content_pane_ids()
            .into_iter()
            .filter(|id| live.iter().any(|pane| pane.id == *id))
            .collect();
        let (width, height) = self.mux.terminal_size().await?;

        let options = LayoutOptions {
            force: true,
            ..Default::default()
        };
        let outcome = layout
            .recalculate_and_apply_layout(sidebar, &content, width, height, options)
            .await?;
        Ok(ActionOutcome::Refreshed {
            applied: matches!(outcome, LayoutOutcome::Applied { .. }),
        })
    }
}
