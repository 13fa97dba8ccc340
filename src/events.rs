//! Change notification
//!
//! Everything that might mean "the panes changed" becomes a [`ChangeEvent`] on
//! one channel: tmux hooks (via the trigger file), the fallback poller, user
//! actions. The event loop folds each burst into a single reconcile.

use crate::reconcile::Reconciler;
use crate::shell_quote::quote_path;
use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, Event, PollWatcher, RecursiveMode, Watcher};
use panegrid_tmux::{Multiplexer, TmuxPaneId, TmuxResult};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;

/// tmux hooks that should wake the event loop
pub const WATCHED_HOOKS: &[&str] = &[
    "after-split-window",
    "pane-exited",
    "after-kill-pane",
    "window-resized",
];

/// Something that may have changed the pane set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeEvent {
    PaneSplit(TmuxPaneId),
    PaneExited(TmuxPaneId),
    Resized { width: usize, height: usize },
    PollTick,
    UserAction(String),
    /// A tmux hook touched the trigger file without saying what happened
    External,
}

/// `notify` arguments each watched hook passes along
pub fn hook_event_args(hook: &str) -> &'static str {
    match hook {
        "after-split-window" => "--event split --pane '#{hook_pane}'",
        "pane-exited" | "after-kill-pane" => "--event exited --pane '#{hook_pane}'",
        "window-resized" => "--event resized --size '#{client_width}x#{client_height}'",
        _ => "",
    }
}

/// Parse a `WIDTHxHEIGHT` size as tmux formats print it
pub fn parse_size(value: &str) -> Option<(usize, usize)> {
    let (width, height) = value.trim().split_once('x')?;
    Some((width.parse().ok()?, height.parse().ok()?))
}

/// Sending half; cheap to clone
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: UnboundedSender<ChangeEvent>,
}

impl ChangeNotifier {
    /// Queue an event. Returns `false` once the event loop has gone away.
    pub fn notify(&self, event: ChangeEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}

/// Receiving half, owned by the event loop
#[derive(Debug)]
pub struct ChangeReceiver {
    rx: UnboundedReceiver<ChangeEvent>,
}

pub fn channel() -> (ChangeNotifier, ChangeReceiver) {
    let (tx, rx) = unbounded_channel();
    (ChangeNotifier { tx }, ChangeReceiver { rx })
}

impl ChangeReceiver {
    /// Wait for an event, then collect whatever else arrives within
    /// `debounce` of it. `None` once every notifier is dropped.
    pub async fn next_burst(&mut self, debounce: Duration) -> Option<Vec<ChangeEvent>> {
        let first = self.rx.recv().await?;
        let mut burst = vec![first];
        let deadline = tokio::time::Instant::now() + debounce;
        while let Ok(Some(event)) = tokio::time::timeout_at(deadline, self.rx.recv()).await {
            burst.push(event);
        }
        Some(burst)
    }
}

/// Reconcile once per burst until every notifier is dropped.
pub async fn run_event_loop(
    mut events: ChangeReceiver,
    reconciler: Arc<Reconciler>,
    debounce: Duration,
) {
    let mut was_degraded = false;
    while let Some(burst) = events.next_burst(debounce).await {
        log::debug!("Change burst of {}: {:?}", burst.len(), burst);
        // tmux reflows panes itself on resize, so the last apply no longer holds
        if burst
            .iter()
            .any(|event| matches!(event, ChangeEvent::Resized { .. }))
        {
            reconciler.invalidate_layout().await;
        }
        reconciler.reconcile().await;

        let degraded = reconciler.health().is_degraded();
        if degraded && !was_degraded {
            let snapshot = reconciler.health().snapshot();
            log::error!(
                "Reconciliation degraded after {} consecutive failures (last: {})",
                snapshot.consecutive_failures,
                snapshot.last_error.as_deref().unwrap_or("unknown")
            );
        } else if was_degraded && !degraded {
            log::info!("Reconciliation recovered");
        }
        was_degraded = degraded;
    }
    log::debug!("Event loop finished: no notifiers left");
}

/// Emit a [`ChangeEvent::PollTick`] every `interval`, starting immediately.
///
/// Catches anything the hooks miss. Stops when the event loop goes away.
pub fn spawn_poller(notifier: ChangeNotifier, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            if !notifier.notify(ChangeEvent::PollTick) {
                break;
            }
        }
    })
}

/// What the trigger file holds: the last event and when it was written
#[derive(Debug, Serialize, Deserialize)]
struct TriggerRecord {
    at: String,
    event: ChangeEvent,
}

/// Write `event` to the hook trigger file, creating it and its directory if
/// needed.
pub fn touch_trigger(path: &Path, event: &ChangeEvent) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let record = TriggerRecord {
        at: chrono::Utc::now().to_rfc3339(),
        event: event.clone(),
    };
    let body = serde_json::to_string(&record).context("Failed to encode trigger event")?;
    std::fs::write(path, body)
        .with_context(|| format!("Failed to touch trigger file {}", path.display()))
}

/// The event last written to the trigger file, or
/// [`ChangeEvent::External`] when it cannot be read back.
pub fn read_trigger(path: &Path) -> ChangeEvent {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|body| serde_json::from_str::<TriggerRecord>(&body).ok())
        .map(|record| record.event)
        .unwrap_or(ChangeEvent::External)
}

/// Point the watched tmux hooks at
/// `<exe> --project <project> notify <hook arguments>`.
///
/// Returns how many hooks were installed.
pub async fn install_hooks(mux: &dyn Multiplexer, exe: &Path, project: &Path) -> TmuxResult<usize> {
    let base = format!(
        "{} --project {} notify",
        quote_path(exe),
        quote_path(project)
    );
    for hook in WATCHED_HOOKS {
        let command = match hook_event_args(hook) {
            "" => base.clone(),
            args => format!("{} {}", base, args),
        };
        mux.set_hook(hook, &command).await?;
        log::info!("Installed tmux hook {} -> {}", hook, command);
    }
    Ok(WATCHED_HOOKS.len())
}

/// Turns writes to the trigger file into the [`ChangeEvent`] they carry.
pub struct HookWatcher {
    _watcher: Box<dyn Watcher + Send>,
    trigger: PathBuf,
}

impl std::fmt::Debug for HookWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookWatcher")
            .field("trigger", &self.trigger)
            .finish_non_exhaustive()
    }
}

fn make_event_handler(
    filename: OsString,
    notifier: ChangeNotifier,
) -> impl Fn(std::result::Result<Event, notify::Error>) + Send + 'static {
    move |result: std::result::Result<Event, notify::Error>| {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                log::debug!("Trigger watcher error: {}", e);
                return;
            }
        };
        if !matches!(
            event.kind,
            notify::EventKind::Modify(_) | notify::EventKind::Create(_)
        ) {
            return;
        }
        if let Some(path) = event
            .paths
            .iter()
            .find(|p| p.file_name().is_some_and(|f| f == filename))
        {
            let change = read_trigger(path);
            log::trace!("Trigger file touched: {:?}", change);
            notifier.notify(change);
        }
    }
}

impl HookWatcher {
    /// Watch `trigger`, creating it first if it does not exist yet.
    ///
    /// Uses the native backend, falling back to polling every
    /// `poll_interval` where that is unavailable.
    pub fn new(trigger: &Path, notifier: ChangeNotifier, poll_interval: Duration) -> Result<Self> {
        if !trigger.exists() {
            touch_trigger(trigger, &ChangeEvent::External)?;
        }
        let trigger = trigger
            .canonicalize()
            .unwrap_or_else(|_| trigger.to_path_buf());
        let filename = trigger
            .file_name()
            .context("Trigger path has no filename")?
            .to_os_string();
        let parent = trigger
            .parent()
            .context("Trigger path has no parent directory")?
            .to_path_buf();

        let handler = make_event_handler(filename.clone(), notifier.clone());
        let mut watcher: Box<dyn Watcher + Send> = match notify::recommended_watcher(handler) {
            Ok(w) => Box::new(w),
            Err(e) => {
                log::warn!(
                    "Hook watcher: native backend unavailable ({}); falling back to PollWatcher",
                    e
                );
                let poll_watcher = PollWatcher::new(
                    make_event_handler(filename, notifier),
                    NotifyConfig::default().with_poll_interval(poll_interval),
                )
                .context("Failed to create fallback PollWatcher")?;
                Box::new(poll_watcher)
            }
        };

        watcher
            .watch(&parent, RecursiveMode::NonRecursive)
            .with_context(|| format!("Failed to watch {}", parent.display()))?;
        log::info!("Watching hook trigger {}", trigger.display());

        Ok(Self {
            _watcher: watcher,
            trigger,
        })
    }

    pub fn trigger(&self) -> &Path {
        &self.trigger
    }
}
