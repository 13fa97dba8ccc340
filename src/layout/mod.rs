//! Grid layout engine
//!
//! The pipeline runs calculator -> spacer -> encoder -> applier:
//!
//! - [`calculator`]: rows x columns selection and scoring
//! - [`spacer`]: filler pane for a partially filled final row
//! - [`encoder`]: checksummed tmux layout descriptor
//! - [`applier`]: re-validation and the resize/select-layout calls
//!
//! [`LayoutSession`] ties them together and owns the "last applied" key so
//! an unchanged grid is not re-applied on every reconciliation pass.

pub mod applier;
pub mod calculator;
pub mod encoder;
mod error;
pub mod spacer;

pub use applier::apply_layout;
pub use calculator::{GridLayout, LayoutBounds, compute_layout, distribute_panes};
pub use encoder::{EncodeRequest, EncodedLayout, encode_layout};
pub use error::LayoutError;
pub use spacer::{SpacerManager, needs_spacer};

use crate::best_effort;
use panegrid_tmux::{Multiplexer, TmuxPaneId};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Options for [`LayoutSession::recalculate_and_apply_layout`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutOptions {
    /// Apply even when nothing changed since the last apply
    pub force: bool,
    /// Never create a spacer pane
    pub suppress_spacer: bool,
}

/// What a layout pass did
#[derive(Debug, Clone, PartialEq)]
pub enum LayoutOutcome {
    /// Same panes and dimensions as the last successful apply
    Unchanged,
    Applied {
        layout: GridLayout,
        spacer_id: Option<TmuxPaneId>,
        descriptor: String,
        /// The spacer had to be clamped to one column
        spacer_overflow: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LayoutKey {
    sidebar_id: TmuxPaneId,
    content_pane_ids: Vec<TmuxPaneId>,
    width: usize,
    height: usize,
    suppress_spacer: bool,
}

/// Long-lived layout state for one tmux window
pub struct LayoutSession {
    mux: Arc<dyn Multiplexer>,
    bounds: LayoutBounds,
    spacer: SpacerManager,
    /// Key of the last successful apply. Held for the whole pass so two
    /// passes never race on the spacer.
    last_applied: Mutex<Option<LayoutKey>>,
}

impl LayoutSession {
    pub fn new(mux: Arc<dyn Multiplexer>, bounds: LayoutBounds, spacer: SpacerManager) -> Self {
        Self {
            mux,
            bounds,
            spacer,
            last_applied: Mutex::new(None),
        }
    }

    pub fn bounds(&self) -> &LayoutBounds {
        &self.bounds
    }

    pub fn spacer(&self) -> &SpacerManager {
        &self.spacer
    }

    /// Forget the last applied key so the next pass always applies.
    ///
    /// Called when the terminal was resized: tmux may have reflowed the
    /// window even if the computed grid comes out the same.
    pub async fn invalidate(&self) {
        *self.last_applied.lock().await = None;
    }

    /// Compute, encode and apply the grid for `content_pane_ids`.
    ///
    /// Returns [`LayoutOutcome::Unchanged`] without touching tmux when the
    /// panes and dimensions match the last apply, unless `options.force`.
    pub async fn recalculate_and_apply_layout(
        &self,
        sidebar_id: TmuxPaneId,
        content_pane_ids: &[TmuxPaneId],
        width: usize,
        height: usize,
        options: LayoutOptions,
    ) -> Result<LayoutOutcome, LayoutError> {
        if width == 0 || height == 0 {
            return Err(LayoutError::InvalidDimensions { width, height });
        }

        let key = LayoutKey {
            sidebar_id,
            content_pane_ids: content_pane_ids.to_vec(),
            width,
            height,
            suppress_spacer: options.suppress_spacer,
        };

        let mut last_applied = self.last_applied.lock().await;
        if !options.force && last_applied.as_ref() == Some(&key) {
            log::trace!(
                "Layout unchanged for {} panes at {}x{}",
                content_pane_ids.len(),
                width,
                height
            );
            return Ok(LayoutOutcome::Unchanged);
        }

        let pane_count = content_pane_ids.len();
        let layout = compute_layout(pane_count, width, height, &self.bounds)?;
        log::debug!(
            "Layout for {} panes at {}x{}: {}x{} (window width {})",
            pane_count,
            width,
            height,
            layout.columns,
            layout.rows,
            layout.window_width
        );

        // The spacer is always rebuilt so its geometry is never stale
        let live = self.mux.list_panes().await?;
        let mut protected = content_pane_ids.to_vec();
        protected.push(sidebar_id);
        self.spacer
            .remove_existing(self.mux.as_ref(), &live, &protected)
            .await;

        let spacer_id = match content_pane_ids.last() {
            Some(&anchor) if !options.suppress_spacer && needs_spacer(pane_count, &layout) => {
                best_effort(
                    "create spacer pane",
                    self.spacer.create(self.mux.as_ref(), anchor).await,
                )
            }
            _ => None,
        };

        let encoded = encode_layout(&EncodeRequest {
            sidebar_id,
            content_pane_ids,
            spacer_id,
            sidebar_width: self.bounds.sidebar_width,
            window_width: layout.window_width,
            window_height: height,
            columns: layout.columns,
            max_pane_width: self.bounds.max_width,
        });

        let live_ids: HashSet<TmuxPaneId> = self
            .mux
            .list_panes()
            .await?
            .into_iter()
            .map(|pane| pane.id)
            .collect();

        let applied =
            apply_layout(self.mux.as_ref(), &encoded.descriptor, sidebar_id, &live_ids).await;
        if let Err(e) = applied {
            *last_applied = None;
            return Err(e);
        }

        if encoded.spacer_overflow {
            log::warn!(
                "Spacer clamped for {} panes at {}x{}; pane bounds do not fit this terminal",
                pane_count,
                width,
                height
            );
        }
        *last_applied = Some(key);
        Ok(LayoutOutcome::Applied {
            layout,
            spacer_id,
            descriptor: encoded.descriptor,
            spacer_overflow: encoded.spacer_overflow,
        })
    }
}
