//! Default value functions for configuration.
//!
//! Each function backs a `#[serde(default = "crate::defaults::...")]`
//! attribute on a [`crate::Config`] field.

// ── Layout bounds ──────────────────────────────────────────────────────────

pub fn sidebar_width() -> usize {
    40
}

pub fn min_pane_width() -> usize {
    50
}

pub fn max_pane_width() -> usize {
    80
}

pub fn min_pane_height() -> usize {
    12
}

pub fn spacer_title() -> String {
    "panegrid-spacer".to_string()
}

// ── tmux ───────────────────────────────────────────────────────────────────

pub fn tmux_path() -> String {
    "tmux".to_string()
}

pub fn command_timeout_secs() -> u64 {
    5
}

// ── Reconciliation ─────────────────────────────────────────────────────────

pub fn poll_interval_secs() -> u64 {
    2
}

pub fn event_debounce_ms() -> u64 {
    150
}

pub fn failure_threshold() -> u32 {
    5
}

// ── Lifecycle locks ────────────────────────────────────────────────────────

pub fn lock_timeout_secs() -> u64 {
    30
}

pub fn lock_sweep_interval_secs() -> u64 {
    5
}

// ── Project state ──────────────────────────────────────────────────────────

pub fn state_dir_name() -> String {
    ".panegrid".to_string()
}
