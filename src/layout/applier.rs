//! Applying a descriptor to the live window
//!
//! The descriptor is parsed back and checked against the live pane set right
//! before any tmux call. The two must hold exactly the same panes: one that
//! vanished since the descriptor was built, or a live pane the descriptor
//! leaves out, aborts the apply with [`LayoutError::Stale`]. Nothing is
//! partially applied.

use super::LayoutError;
use panegrid_tmux::{LayoutNode, Multiplexer, TmuxLayout, TmuxPaneId};
use std::collections::HashSet;

/// Apply `descriptor` to the window.
///
/// Order matters: the sidebar is pinned to its width first, then the window
/// is resized, then the grid geometry is selected. Resizing the window before
/// pinning the sidebar lets tmux spread the width change onto it.
pub async fn apply_layout(
    mux: &dyn Multiplexer,
    descriptor: &str,
    sidebar_id: TmuxPaneId,
    live_pane_ids: &HashSet<TmuxPaneId>,
) -> Result<(), LayoutError> {
    let layout = TmuxLayout::parse(descriptor)
        .ok_or_else(|| LayoutError::Malformed(descriptor.to_string()))?;

    let placed = layout.pane_ids();
    let missing: Vec<TmuxPaneId> = placed
        .iter()
        .copied()
        .filter(|id| !live_pane_ids.contains(id))
        .collect();
    let mut untracked: Vec<TmuxPaneId> = live_pane_ids
        .iter()
        .copied()
        .filter(|id| !placed.contains(id))
        .collect();
    untracked.sort_unstable();
    if !missing.is_empty() || !untracked.is_empty() {
        log::debug!(
            "Aborting layout apply, panes gone: {:?}, not placed: {:?}",
            missing,
            untracked
        );
        return Err(LayoutError::Stale { missing, untracked });
    }

    let sidebar_width = find_pane_width(&layout.root, sidebar_id).ok_or_else(|| {
        LayoutError::Malformed(format!("sidebar %{} not in {}", sidebar_id, descriptor))
    })?;

    mux.resize_pane(sidebar_id, Some(sidebar_width), None).await?;
    mux.resize_window(layout.root.width(), layout.root.height()).await?;
    mux.select_layout(descriptor).await?;

    log::debug!(
        "Applied {}x{} layout with {} panes",
        layout.root.width(),
        layout.root.height(),
        layout.pane_ids().len()
    );
    Ok(())
}

fn find_pane_width(node: &LayoutNode, target: TmuxPaneId) -> Option<usize> {
    match node {
        LayoutNode::Pane { id, width, .. } => (*id == target).then_some(*width),
        LayoutNode::HorizontalSplit { children, .. }
        | LayoutNode::VerticalSplit { children, .. } => children
            .iter()
            .find_map(|child| find_pane_width(child, target)),
    }
}
