//! The pure half of a reconciliation pass.
//!
//! [`plan_pass`] compares the state document against the live pane list and
//! decides what to rebind, prune, adopt, recreate and retitle. Only the
//! recreations need tmux, so they are handed back for the caller to run.
//! Everything that touches the file ends up in a [`StatePatch`], which is
//! replayed against a fresh read when persisting.

use crate::lifecycle::LifecycleManager;
use crate::slug::next_shell_slug;
use crate::state::{PaneKind, PaneRecord, StateDocument};
use panegrid_tmux::{TmuxPane, TmuxPaneId};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// Steps of one pass, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    Loading,
    Rebinding,
    Pruning,
    DetectingUntracked,
    Recreating,
    Persisting,
    LayoutRefresh,
    Done,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcilePhase::Loading => "loading",
            ReconcilePhase::Rebinding => "rebinding",
            ReconcilePhase::Pruning => "pruning",
            ReconcilePhase::DetectingUntracked => "detecting untracked",
            ReconcilePhase::Recreating => "recreating",
            ReconcilePhase::Persisting => "persisting",
            ReconcilePhase::LayoutRefresh => "layout refresh",
            ReconcilePhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Document changes found by one pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    /// Record ID -> live pane found by title
    pub rebound: Vec<(String, TmuxPaneId)>,
    /// Record ID -> freshly split pane
    pub recreated: Vec<(String, TmuxPaneId)>,
    /// Records to forget
    pub removed: Vec<String>,
    /// New shell records for panes nobody tracks
    pub adopted: Vec<PaneRecord>,
    /// Sidebar handle to record
    pub control_pane_id: Option<TmuxPaneId>,
}

impl StatePatch {
    pub fn is_empty(&self) -> bool {
        self.rebound.is_empty()
            && self.recreated.is_empty()
            && self.removed.is_empty()
            && self.adopted.is_empty()
            && self.control_pane_id.is_none()
    }

    /// Replay onto `doc`, which may have changed since the pass read it.
    ///
    /// Returns recreated panes whose record disappeared in the meantime
    /// (closed by the user mid-pass); the caller should kill them.
    pub fn apply(&self, doc: &mut StateDocument) -> Vec<TmuxPaneId> {
        let mut orphans = Vec::new();

        for (id, pane) in &self.rebound {
            if let Some(record) = doc.find_mut(id) {
                record.external_pane_id = Some(*pane);
            }
        }
        for (id, pane) in &self.recreated {
            match doc.find_mut(id) {
                Some(record) => record.external_pane_id = Some(*pane),
                None => orphans.push(*pane),
            }
        }
        for id in &self.removed {
            doc.remove(id);
        }
        for record in &self.adopted {
            let Some(pane) = record.external_pane_id else {
                continue;
            };
            if doc.find_by_pane(pane).is_some() {
                continue;
            }
            let mut record = record.clone();
            if doc.slug_taken(&record.slug) {
                record.slug = next_shell_slug(doc.slugs());
            }
            doc.panes.push(record);
        }
        if let Some(control) = self.control_pane_id {
            doc.control_pane_id = Some(control);
        }

        orphans
    }
}

/// Decisions for one pass
#[derive(Debug, Clone, Default)]
pub struct PassPlan {
    pub patch: StatePatch,
    /// Worktree records with no live pane, to be split anew
    pub to_recreate: Vec<PaneRecord>,
    /// Panes whose live title differs from their record's slug
    pub retitle: Vec<(TmuxPaneId, String)>,
    /// Live panes accounted for (sidebar, matched, rebound, adopted)
    pub claimed: HashSet<TmuxPaneId>,
    /// Last live content pane in document order, to split new panes from
    pub anchor: Option<TmuxPaneId>,
    pub pruned: usize,
}

/// Diff the document against the live panes.
///
/// Records and panes under a lifecycle lock are left exactly as they are.
/// Without a known sidebar nothing is adopted, since the sidebar itself would
/// look untracked. Nor is anything adopted when a split was in flight at any
/// point since `split_epoch` was read (before loading `doc` and `live`): the
/// untracked pane may be one a user action is about to record.
pub fn plan_pass(
    doc: &StateDocument,
    live: &[TmuxPane],
    sidebar: Option<TmuxPaneId>,
    spacer_title: &str,
    locks: &LifecycleManager,
    split_epoch: u64,
) -> PassPlan {
    let mut plan = PassPlan::default();
    let live_by_id: HashMap<TmuxPaneId, &TmuxPane> = live.iter().map(|p| (p.id, p)).collect();
    plan.claimed.extend(sidebar);

    if sidebar.is_some() && doc.control_pane_id != sidebar {
        plan.patch.control_pane_id = sidebar;
    }

    // Direct matches first so a title match can never steal a bound pane
    let mut unresolved = Vec::new();
    for record in &doc.panes {
        let locked = locks.is_locked(&record.id)
            || record
                .external_pane_id
                .is_some_and(|pane| locks.is_pane_locked(pane));
        match record.external_pane_id {
            Some(pane) if live_by_id.contains_key(&pane) && !plan.claimed.contains(&pane) => {
                plan.claimed.insert(pane);
                plan.anchor = Some(pane);
                if live_by_id[&pane].title != record.slug && !locked {
                    plan.retitle.push((pane, record.slug.clone()));
                }
            }
            _ if locked => {
                log::debug!("Skipping locked record {} ({})", record.slug, record.id);
            }
            _ => unresolved.push(record),
        }
    }

    log::trace!("reconcile: {}", ReconcilePhase::Rebinding);
    let mut dangling = Vec::new();
    for record in unresolved {
        let found = live.iter().find(|pane| {
            pane.title == record.slug
                && pane.title != spacer_title
                && !plan.claimed.contains(&pane.id)
                && !locks.is_pane_locked(pane.id)
        });
        match found {
            Some(pane) => {
                log::info!(
                    "Rebinding {} from {:?} to %{}",
                    record.slug,
                    record.external_pane_id,
                    pane.id
                );
                plan.claimed.insert(pane.id);
                plan.anchor = Some(pane.id);
                plan.patch.rebound.push((record.id.clone(), pane.id));
            }
            None => dangling.push(record),
        }
    }

    log::trace!("reconcile: {}", ReconcilePhase::Pruning);
    for record in dangling {
        match record.kind {
            PaneKind::Shell => {
                log::info!("Pruning shell pane {} (pane gone)", record.slug);
                plan.patch.removed.push(record.id.clone());
                plan.pruned += 1;
            }
            PaneKind::Worktree => plan.to_recreate.push(record.clone()),
        }
    }

    log::trace!("reconcile: {}", ReconcilePhase::DetectingUntracked);
    if sidebar.is_none() {
        log::debug!("No control pane known; not adopting untracked panes");
        return plan;
    }
    if !locks.splits_quiet_since(split_epoch) {
        log::debug!("Split in flight during this pass; not adopting untracked panes");
        return plan;
    }
    let mut used_slugs: Vec<String> = doc
        .panes
        .iter()
        .filter(|record| !plan.patch.removed.contains(&record.id))
        .map(|record| record.slug.clone())
        .collect();
    for pane in live {
        if plan.claimed.contains(&pane.id)
            || pane.title == spacer_title
            || locks.is_pane_locked(pane.id)
        {
            continue;
        }
        let slug = next_shell_slug(used_slugs.iter().map(String::as_str));
        log::info!("Adopting untracked pane %{} as {}", pane.id, slug);
        used_slugs.push(slug.clone());
        plan.claimed.insert(pane.id);
        plan.retitle.push((pane.id, slug.clone()));
        plan.patch.adopted.push(PaneRecord::shell(slug, pane.id));
    }

    plan
}
