//! Passive health indicator for the reconciliation loop.
//!
//! A failed pass is never surfaced directly; the next poll tick or event
//! retries it. Only a run of consecutive failures flips the indicator to
//! degraded, which outer layers can show without blocking anything.
//!
//! The counters live in whichever process runs the passes, normally `watch`.
//! That process publishes them as a global tmux option ([`HEALTH_OPTION`])
//! so `status` in any other process can read them back.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Global tmux option holding the last published [`PublishedHealth`]
pub const HEALTH_OPTION: &str = "@panegrid-health";

#[derive(Debug, Default)]
struct HealthState {
    consecutive_failures: u32,
    total_passes: u64,
    last_error: Option<String>,
    last_success: Option<DateTime<Utc>>,
}

/// Point-in-time view of [`ReconcileHealth`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthSnapshot {
    pub consecutive_failures: u32,
    pub total_passes: u64,
    pub degraded: bool,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
}

impl HealthSnapshot {
    /// The part of the snapshot worth republishing when it changes
    pub(crate) fn status_key(&self) -> (bool, u32, Option<String>) {
        (
            self.degraded,
            self.consecutive_failures,
            self.last_error.clone(),
        )
    }
}

/// Health as published for one project. The tmux server may be shared by
/// several projects; readers ignore entries for other roots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedHealth {
    pub project: PathBuf,
    pub health: HealthSnapshot,
}

impl PublishedHealth {
    /// Parse an option value, keeping it only if it belongs to `project`
    pub fn parse_for(value: &str, project: &Path) -> Option<HealthSnapshot> {
        match serde_json::from_str::<PublishedHealth>(value) {
            Ok(published) if published.project == project => Some(published.health),
            Ok(published) => {
                log::debug!(
                    "Published health is for {}, not {}",
                    published.project.display(),
                    project.display()
                );
                None
            }
            Err(e) => {
                log::debug!("Unreadable published health: {}", e);
                None
            }
        }
    }
}

#[derive(Debug)]
pub struct ReconcileHealth {
    threshold: u32,
    state: Mutex<HealthState>,
}

impl ReconcileHealth {
    /// `threshold` consecutive failures mark the loop degraded
    pub fn new(threshold: u32) -> Self {
        Self {
            threshold: threshold.max(1),
            state: Mutex::new(HealthState::default()),
        }
    }

    pub fn record_success(&self) {
        let mut state = self.state.lock();
        if state.consecutive_failures >= self.threshold {
            log::info!(
                "Reconciliation recovered after {} failed passes",
                state.consecutive_failures
            );
        }
        state.consecutive_failures = 0;
        state.total_passes += 1;
        state.last_success = Some(Utc::now());
    }

    pub fn record_failure(&self, error: impl Into<String>) {
        let mut state = self.state.lock();
        state.consecutive_failures += 1;
        state.total_passes += 1;
        state.last_error = Some(error.into());
        if state.consecutive_failures == self.threshold {
            log::error!(
                "Reconciliation degraded: {} consecutive failures (last: {})",
                state.consecutive_failures,
                state.last_error.as_deref().unwrap_or_default()
            );
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.state.lock().consecutive_failures >= self.threshold
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let state = self.state.lock();
        HealthSnapshot {
            consecutive_failures: state.consecutive_failures,
            total_passes: state.total_passes,
            degraded: state.consecutive_failures >= self.threshold,
            last_error: state.last_error.clone(),
            last_success: state.last_success,
        }
    }
}
