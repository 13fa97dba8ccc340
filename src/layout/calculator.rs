//! Grid shape selection.
//!
//! Picks a rows x columns arrangement for N content panes to the right of a
//! fixed-width sidebar. Every candidate column count is checked against the
//! minimum pane size, the survivors are scored, and the best one wins. An
//! infeasible terminal still gets a layout through the fallback path.

use super::LayoutError;
use panegrid_config::Config;

/// Width and height bounds for content panes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutBounds {
    /// Width of the control pane at the left edge
    pub sidebar_width: usize,
    /// Narrowest acceptable content pane
    pub min_width: usize,
    /// Widest comfortable content pane
    pub max_width: usize,
    /// Shortest acceptable content pane
    pub min_height: usize,
}

impl LayoutBounds {
    pub fn from_config(config: &Config) -> Self {
        Self {
            sidebar_width: config.sidebar_width,
            min_width: config.min_pane_width,
            max_width: config.max_pane_width,
            min_height: config.min_pane_height,
        }
    }
}

impl Default for LayoutBounds {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Result of [`compute_layout`]. Never cached across dimension changes.
#[derive(Debug, Clone, PartialEq)]
pub struct GridLayout {
    /// Number of columns (0 for an empty grid)
    pub columns: usize,
    /// Number of rows (0 for an empty grid)
    pub rows: usize,
    /// Sidebar + border + content
    pub window_width: usize,
    /// Width available to content panes, borders included
    pub content_width: usize,
    /// Panes per column, remainder on the first columns
    pub pane_distribution: Vec<usize>,
    /// Width of each pane in a fully populated row
    pub actual_pane_width: usize,
    /// Height of each non-final row
    pub pane_height: usize,
    /// Upper width bound the layout was computed with
    pub max_pane_width: usize,
    /// Score of the chosen candidate
    pub score: f64,
}

impl GridLayout {
    /// Number of panes in the final row
    pub fn last_row_len(&self, pane_count: usize) -> usize {
        if self.columns == 0 || pane_count == 0 {
            return 0;
        }
        pane_count - (self.rows - 1) * self.columns
    }
}

/// Compute the grid for `pane_count` content panes in a
/// `terminal_width` x `terminal_height` window.
///
/// Deterministic, and infallible for positive dimensions: when no candidate
/// satisfies both minimums, the width floor is relaxed first and a single
/// column is used as the last resort.
pub fn compute_layout(
    pane_count: usize,
    terminal_width: usize,
    terminal_height: usize,
    bounds: &LayoutBounds,
) -> Result<GridLayout, LayoutError> {
    if terminal_width == 0 || terminal_height == 0 {
        return Err(LayoutError::InvalidDimensions {
            width: terminal_width,
            height: terminal_height,
        });
    }

    if pane_count == 0 {
        let content_width = terminal_width
            .saturating_sub(bounds.sidebar_width + 1)
            .min(bounds.max_width);
        return Ok(GridLayout {
            columns: 0,
            rows: 0,
            window_width: (bounds.sidebar_width + 1 + bounds.max_width).min(terminal_width),
            content_width,
            pane_distribution: Vec::new(),
            actual_pane_width: content_width,
            pane_height: terminal_height,
            max_pane_width: bounds.max_width,
            score: 0.0,
        });
    }

    let mut best: Option<(usize, f64)> = None;
    for columns in (1..=pane_count).rev() {
        let rows = pane_count.div_ceil(columns);
        let required_width = bounds.sidebar_width + 1 + columns * bounds.min_width + (columns - 1);
        let required_height = rows * bounds.min_height + (rows - 1);
        if required_width > terminal_width || required_height > terminal_height {
            continue;
        }

        let score = score_candidate(pane_count, columns, terminal_width, terminal_height, bounds);
        log::trace!(
            "layout candidate {}x{} for {} panes: score {:.4}",
            columns,
            rows,
            pane_count,
            score
        );
        // Iterating from most to fewest columns, so `>=` hands ties to fewer columns
        if best.is_none_or(|(_, best_score)| score >= best_score) {
            best = Some((columns, score));
        }
    }

    let layout = match best {
        Some((columns, score)) => {
            build_layout(pane_count, columns, terminal_width, terminal_height, bounds, score)
        }
        None => {
            let columns = fallback_columns(pane_count, terminal_height, bounds);
            log::debug!(
                "no feasible grid for {} panes in {}x{}, falling back to {} column(s)",
                pane_count,
                terminal_width,
                terminal_height,
                columns
            );
            let score =
                score_candidate(pane_count, columns, terminal_width, terminal_height, bounds);
            build_layout(pane_count, columns, terminal_width, terminal_height, bounds, score)
        }
    };
    Ok(layout)
}

/// Fewest columns whose rows still meet the height floor, else one column
fn fallback_columns(pane_count: usize, terminal_height: usize, bounds: &LayoutBounds) -> usize {
    (1..=pane_count)
        .find(|&columns| {
            let rows = pane_count.div_ceil(columns);
            rows * bounds.min_height + (rows - 1) <= terminal_height
        })
        .unwrap_or(1)
}

fn score_candidate(
    pane_count: usize,
    columns: usize,
    terminal_width: usize,
    terminal_height: usize,
    bounds: &LayoutBounds,
) -> f64 {
    let rows = pane_count.div_ceil(columns);
    let last_row = pane_count - (rows - 1) * columns;

    let balance = if last_row == 1 && columns > 1 { 0.5 } else { 1.0 };

    let pane_height = terminal_height.saturating_sub(rows - 1) / rows;
    let height_fraction = pane_height as f64 / terminal_height as f64;

    let available = terminal_width.saturating_sub(bounds.sidebar_width + 1);
    let uncapped_width = available.saturating_sub(columns - 1) / columns;
    let width_fitness = if uncapped_width <= bounds.max_width { 1.0 } else { 0.8 };

    balance * height_fraction * width_fitness
}

fn build_layout(
    pane_count: usize,
    columns: usize,
    terminal_width: usize,
    terminal_height: usize,
    bounds: &LayoutBounds,
    score: f64,
) -> GridLayout {
    let rows = pane_count.div_ceil(columns);
    let content_width = terminal_width
        .saturating_sub(bounds.sidebar_width + 1)
        .min(columns * bounds.max_width + (columns - 1));
    GridLayout {
        columns,
        rows,
        window_width: (bounds.sidebar_width + 1 + content_width).min(terminal_width),
        content_width,
        pane_distribution: distribute_panes(pane_count, columns),
        actual_pane_width: content_width.saturating_sub(columns - 1) / columns,
        pane_height: terminal_height.saturating_sub(rows - 1) / rows,
        max_pane_width: bounds.max_width,
        score,
    }
}

/// Spread `pane_count` panes over `columns`, the first columns taking the
/// remainder: `(5, 3)` gives `[2, 2, 1]`.
pub fn distribute_panes(pane_count: usize, columns: usize) -> Vec<usize> {
    if columns == 0 {
        return Vec::new();
    }
    let base = pane_count / columns;
    let remainder = pane_count % columns;
    (0..columns)
        .map(|column| base + usize::from(column < remainder))
        .collect()
}
