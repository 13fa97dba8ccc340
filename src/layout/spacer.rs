//! Spacer pane management
//!
//! When the final grid row is only partially filled, its panes would stretch
//! across the whole content width. A throwaway filler pane, identified only
//! by its title, soaks up the leftover width instead. It is never tracked in
//! the state file and is rebuilt from scratch on every layout pass.

use super::GridLayout;
use crate::best_effort;
use panegrid_tmux::{Multiplexer, SplitDirection, TmuxPane, TmuxPaneId, TmuxResult};

/// Whether the final row needs a filler pane to keep its panes at or under
/// `max_pane_width`.
pub fn needs_spacer(pane_count: usize, layout: &GridLayout) -> bool {
    if pane_count == 0 || layout.columns <= 1 {
        return false;
    }
    let last_row = layout.last_row_len(pane_count);
    if last_row == 0 || last_row >= layout.columns {
        return false;
    }
    let stretched = layout.content_width.saturating_sub(last_row - 1) / last_row;
    stretched > layout.max_pane_width
}

/// Creates and destroys the spacer pane
#[derive(Debug, Clone)]
pub struct SpacerManager {
    title: String,
}

impl SpacerManager {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn is_spacer(&self, pane: &TmuxPane) -> bool {
        pane.title == self.title
    }

    /// Kill every live pane carrying the spacer title, except `protected` ones.
    ///
    /// Returns the IDs that were killed. Individual failures are logged and
    /// skipped.
    pub async fn remove_existing(
        &self,
        mux: &dyn Multiplexer,
        live: &[TmuxPane],
        protected: &[TmuxPaneId],
    ) -> Vec<TmuxPaneId> {
        let mut removed = Vec::new();
        for pane in live.iter().filter(|p| self.is_spacer(p)) {
            if protected.contains(&pane.id) {
                log::warn!("Pane %{} carries the spacer title but is tracked", pane.id);
                continue;
            }
            if best_effort("kill spacer pane", mux.kill_pane(pane.id).await).is_some() {
                removed.push(pane.id);
            }
        }
        removed
    }

    /// Split a fresh spacer off `anchor` (the last real content pane).
    pub async fn create(
        &self,
        mux: &dyn Multiplexer,
        anchor: TmuxPaneId,
    ) -> TmuxResult<TmuxPaneId> {
        let id = mux.split_pane(anchor, SplitDirection::Right, None).await?;
        best_effort("title spacer pane", mux.set_pane_title(id, &self.title).await);
        log::debug!("Created spacer pane %{} next to %{}", id, anchor);
        Ok(id)
    }
}
