//! Pane state reconciliation
//!
//! One pass: load the state document and the live pane list, work out the
//! drift ([`plan_pass`]), recreate lost worktree panes, retitle, persist the
//! patch through the write queue, then refresh the layout.
//!
//! Passes never overlap. A `reconcile()` call that arrives while a pass is
//! running only raises a flag, and the running pass loops once more before
//! returning. Persisting replays the pass's patch against a fresh read on the
//! write queue, so a user action that writes between our read and our write
//! is kept.

mod health;
mod plan;

pub use health::{HEALTH_OPTION, HealthSnapshot, PublishedHealth, ReconcileHealth};
pub use plan::{PassPlan, ReconcilePhase, StatePatch, plan_pass};

use crate::best_effort;
use crate::layout::{LayoutError, LayoutOptions, LayoutOutcome, LayoutSession};
use crate::lifecycle::{LifecycleManager, LockIntent};
use crate::state::{StateStore, StoreError};
use crate::worktree::WorktreeProvider;
use panegrid_tmux::{Multiplexer, SplitDirection, TmuxError, TmuxPaneId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Back-to-back passes one `reconcile()` call may run before handing the
/// leftover request to the next call
const MAX_PASSES_PER_CALL: usize = 4;

/// Why a pass stopped early
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{phase}: {source}")]
    Tmux {
        phase: ReconcilePhase,
        #[source]
        source: TmuxError,
    },

    #[error("persisting: {0}")]
    Store(#[from] StoreError),

    #[error("recreating: {failed} worktree pane(s) could not be recreated")]
    Incomplete { failed: usize },
}

/// What one pass changed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub rebound: usize,
    pub pruned: usize,
    pub adopted: usize,
    pub recreated: usize,
    /// Worktree records dropped because their directory is gone
    pub dropped: usize,
    pub retitled: usize,
    pub persisted: bool,
    pub layout_applied: bool,
    /// The applied grid had no room for its spacer
    pub spacer_overflow: bool,
}

impl ReconcileReport {
    /// Whether the set of tracked panes changed
    pub fn topology_changed(&self) -> bool {
        self.rebound + self.pruned + self.adopted + self.recreated + self.dropped > 0
    }
}

/// Result of a `reconcile()` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReconcileOutcome {
    /// The last pass run by this call finished
    Completed(ReconcileReport),
    /// A pass was already running; it will run once more for us
    Coalesced,
    /// The last pass run by this call failed (logged and counted)
    Failed(String),
}

/// Resets the running flag if a pass future is dropped mid-flight
struct RunningGuard<'a> {
    flag: &'a AtomicBool,
    armed: bool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.flag.store(false, Ordering::SeqCst);
        }
    }
}

/// Drives reconciliation passes for one project
pub struct Reconciler {
    mux: Arc<dyn Multiplexer>,
    store: Arc<StateStore>,
    locks: Arc<LifecycleManager>,
    worktrees: Arc<dyn WorktreeProvider>,
    layout: Option<Arc<LayoutSession>>,
    control_pane: Option<TmuxPaneId>,
    spacer_title: String,
    health: ReconcileHealth,
    /// Project root to publish health for, when publishing
    health_project: Option<PathBuf>,
    published: Mutex<Option<(bool, u32, Option<String>)>>,
    running: AtomicBool,
    rerun: AtomicBool,
}

impl Reconciler {
    pub fn new(
        mux: Arc<dyn Multiplexer>,
        store: Arc<StateStore>,
        locks: Arc<LifecycleManager>,
        worktrees: Arc<dyn WorktreeProvider>,
        spacer_title: impl Into<String>,
        failure_threshold: u32,
    ) -> Self {
        Self {
            mux,
            store,
            locks,
            worktrees,
            layout: None,
            control_pane: None,
            spacer_title: spacer_title.into(),
            health: ReconcileHealth::new(failure_threshold),
            health_project: None,
            published: Mutex::new(None),
            running: AtomicBool::new(false),
            rerun: AtomicBool::new(false),
        }
    }

    /// Refresh the grid after each pass
    pub fn with_layout(mut self, layout: Arc<LayoutSession>) -> Self {
        self.layout = Some(layout);
        self
    }

    /// Use this sidebar pane instead of the one recorded in the document
    pub fn with_control_pane(mut self, pane: Option<TmuxPaneId>) -> Self {
        self.control_pane = pane;
        self
    }

    /// Publish health under [`HEALTH_OPTION`] whenever it changes
    pub fn with_health_publishing(mut self, project_root: impl Into<PathBuf>) -> Self {
        self.health_project = Some(project_root.into());
        self
    }

    pub fn health(&self) -> &ReconcileHealth {
        &self.health
    }

    /// Make the next layout refresh apply even if nothing changed
    pub async fn invalidate_layout(&self) {
        if let Some(layout) = &self.layout {
            layout.invalidate().await;
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run a pass, or fold this request into the one already running.
    ///
    /// Never returns an error: failures are logged, counted in
    /// [`Self::health`] and retried by the next call.
    pub async fn reconcile(&self) -> ReconcileOutcome {
        if self.running.swap(true, Ordering::SeqCst) {
            self.rerun.store(true, Ordering::SeqCst);
            log::debug!("Reconcile requested mid-pass; coalescing");
            return ReconcileOutcome::Coalesced;
        }
        let mut guard = RunningGuard {
            flag: &self.running,
            armed: true,
        };

        let mut passes = 0;
        loop {
            self.rerun.store(false, Ordering::SeqCst);
            let outcome = self.run_recorded_pass().await;
            passes += 1;
            if passes >= MAX_PASSES_PER_CALL {
                log::debug!("Reconcile ran {} passes in a row; yielding", passes);
                return outcome;
            }
            if self.rerun.load(Ordering::SeqCst) {
                continue;
            }

            self.running.store(false, Ordering::SeqCst);
            // A request may have slipped in between the check and the release
            if !self.rerun.load(Ordering::SeqCst) || self.running.swap(true, Ordering::SeqCst) {
                guard.armed = false;
                return outcome;
            }
        }
    }

    async fn run_recorded_pass(&self) -> ReconcileOutcome {
        let outcome = match self.run_pass().await {
            Ok(report) => {
                self.health.record_success();
                if report.topology_changed() {
                    log::info!("Reconciled: {:?}", report);
                }
                ReconcileOutcome::Completed(report)
            }
            Err(e) => {
                log::warn!("Reconciliation pass failed: {}", e);
                self.health.record_failure(e.to_string());
                ReconcileOutcome::Failed(e.to_string())
            }
        };
        self.publish_health().await;
        outcome
    }

    async fn publish_health(&self) {
        let Some(project) = &self.health_project else {
            return;
        };
        let snapshot = self.health.snapshot();
        let key = snapshot.status_key();
        if self.published.lock().as_ref() == Some(&key) {
            return;
        }

        let published = PublishedHealth {
            project: project.clone(),
            health: snapshot,
        };
        let value = match serde_json::to_string(&published) {
            Ok(value) => value,
            Err(e) => {
                log::warn!("Failed to serialize health: {}", e);
                return;
            }
        };
        if best_effort(
            "publish health",
            self.mux.set_option(HEALTH_OPTION, &value).await,
        )
        .is_some()
        {
            *self.published.lock() = Some(key);
        }
    }

    async fn run_pass(&self) -> Result<ReconcileReport, ReconcileError> {
        log::trace!("reconcile: {}", ReconcilePhase::Loading);
        // Read before anything else so a split racing the loads is noticed
        let split_epoch = self.locks.split_epoch();
        let doc = self.store.load_or_empty().await;
        let live = self
            .mux
            .list_panes()
            .await
            .map_err(|source| ReconcileError::Tmux {
                phase: ReconcilePhase::Loading,
                source,
            })?;
        let sidebar = self.control_pane.or(doc.control_pane_id);

        let mut plan = plan_pass(
            &doc,
            &live,
            sidebar,
            &self.spacer_title,
            &self.locks,
            split_epoch,
        );
        let mut report = ReconcileReport {
            rebound: plan.patch.rebound.len(),
            pruned: plan.pruned,
            adopted: plan.patch.adopted.len(),
            ..Default::default()
        };

        log::trace!("reconcile: {}", ReconcilePhase::Recreating);
        let failed = self.recreate(&mut plan, &mut report).await;

        for (pane, slug) in &plan.retitle {
            if best_effort("retitle pane", self.mux.set_pane_title(*pane, slug).await).is_some() {
                report.retitled += 1;
            }
        }

        log::trace!("reconcile: {}", ReconcilePhase::Persisting);
        let mut final_doc = doc.clone();
        plan.patch.apply(&mut final_doc);
        if !plan.patch.is_empty() {
            let patch = plan.patch.clone();
            let orphans = self.store.update(move |fresh| patch.apply(fresh)).await?;
            for pane in orphans {
                log::info!("Record closed mid-pass; killing recreated pane %{}", pane);
                best_effort("kill orphaned pane", self.mux.kill_pane(pane).await);
            }
            report.persisted = true;
        }

        if let (Some(layout), Some(sidebar)) = (&self.layout, sidebar) {
            log::trace!("reconcile: {}", ReconcilePhase::LayoutRefresh);
            let content: Vec<TmuxPaneId> = final_doc
                .content_pane_ids()
                .into_iter()
                .filter(|pane| plan.claimed.contains(pane))
                .collect();
            self.refresh_layout(layout, sidebar, &content, &mut report)
                .await;
        }

        log::trace!("reconcile: {}", ReconcilePhase::Done);
        if failed > 0 {
            return Err(ReconcileError::Incomplete { failed });
        }
        Ok(report)
    }

    /// Split fresh panes for lost worktree records. Returns how many failed.
    async fn recreate(&self, plan: &mut PassPlan, report: &mut ReconcileReport) -> usize {
        let mut failed = 0;
        let mut anchor = plan.anchor.or(self.control_pane).or(plan.claimed.iter().min().copied());

        for record in std::mem::take(&mut plan.to_recreate) {
            let path = record
                .worktree_path
                .clone()
                .unwrap_or_else(|| self.worktrees.worktree_path(&record.slug));
            if !self.worktrees.exists(&path) {
                log::info!(
                    "Dropping {}: worktree {} no longer exists",
                    record.slug,
                    path.display()
                );
                plan.patch.removed.push(record.id.clone());
                report.dropped += 1;
                continue;
            }

            let Some(target) = anchor else {
                log::warn!("No pane to split from; cannot recreate {}", record.slug);
                failed += 1;
                continue;
            };
            let Some(token) = self
                .locks
                .acquire(&record.id, None, LockIntent::Busy, "recreate")
            else {
                continue;
            };

            match self
                .mux
                .split_pane(target, SplitDirection::Below, Some(&path))
                .await
            {
                Ok(pane) => {
                    log::info!(
                        "Recreated {} as %{} in {}",
                        record.slug,
                        pane,
                        path.display()
                    );
                    best_effort(
                        "title recreated pane",
                        self.mux.set_pane_title(pane, &record.slug).await,
                    );
                    plan.claimed.insert(pane);
                    plan.patch.recreated.push((record.id.clone(), pane));
                    report.recreated += 1;
                    anchor = Some(pane);
                }
                Err(e) => {
                    log::warn!("Could not recreate {}: {}", record.slug, e);
                    failed += 1;
                }
            }
            self.locks.release(token);
        }
        failed
    }

    async fn refresh_layout(
        &self,
        layout: &LayoutSession,
        sidebar: TmuxPaneId,
        content: &[TmuxPaneId],
        report: &mut ReconcileReport,
    ) {
        let Some((width, height)) =
            best_effort("query terminal size", self.mux.terminal_size().await)
        else {
            return;
        };
        match layout
            .recalculate_and_apply_layout(sidebar, content, width, height, LayoutOptions::default())
            .await
        {
            Ok(LayoutOutcome::Applied {
                spacer_overflow, ..
            }) => {
                report.layout_applied = true;
                report.spacer_overflow = spacer_overflow;
            }
            Ok(LayoutOutcome::Unchanged) => {}
            // The operation holding the lock reconciles once it is done
            Err(LayoutError::Stale { missing, untracked })
                if missing.is_empty()
                    && untracked.iter().all(|&pane| self.locks.is_pane_locked(pane)) =>
            {
                log::debug!("Layout waits on locked panes {:?}", untracked);
            }
            Err(e) if e.is_stale() => {
                log::debug!("{}; scheduling another pass", e);
                self.rerun.store(true, Ordering::SeqCst);
            }
            Err(e) => log::warn!("Layout refresh failed: {}", e),
        }
    }
}
