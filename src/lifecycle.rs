//! Pane lifecycle locks
//!
//! A lock fences a pane while something intentionally changes it: a user
//! close, a recreate, an attach that has split a pane but not yet recorded
//! it. The reconciler checks these locks before treating a pane's
//! disappearance (or appearance) as something a user did by hand.
//!
//! Each lock is stored under every key the caller knows, the logical ID and
//! the `%N` handle, because different call sites only have one or the other.
//! Locks self-expire so a crashed operation can never wedge a pane forever.
//! A lock taken with [`LifecycleManager::acquire`] is released through its
//! [`LockToken`], so a holder whose lock expired and was taken over cannot
//! release the new holder's lock.
//!
//! Splits get a separate fence. Between `split-window` creating a pane and
//! the new record reaching the state file, the pane has no ID anyone could
//! lock. [`SplitFence`] covers that window: while one is held, or if one was
//! taken since a pass started, the pass does not adopt untracked panes.

use panegrid_tmux::{TmuxPaneId, format_pane_id};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Why a pane is locked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockIntent {
    /// The pane is being closed on purpose
    Close,
    /// The pane is being created or rebuilt
    Busy,
}

#[derive(Debug, Clone)]
struct LockEntry {
    intent: LockIntent,
    reason: String,
    acquired_at: Instant,
    aliases: Vec<String>,
    generation: u64,
}

/// Proof of holding a lock; the only way to release one taken with
/// [`LifecycleManager::acquire`]
#[must_use = "a lock is held until its token is released or it expires"]
#[derive(Debug, PartialEq, Eq)]
pub struct LockToken {
    key: String,
    generation: u64,
}

impl LockToken {
    /// The primary key the lock was taken under
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Debug, Default)]
struct SplitState {
    active: usize,
    epoch: u64,
}

/// Held from just before a split until the new pane is recorded.
///
/// Dropping it ends the fence.
#[must_use = "the fence ends as soon as it is dropped"]
#[derive(Debug)]
pub struct SplitFence<'a> {
    manager: &'a LifecycleManager,
}

impl Drop for SplitFence<'_> {
    fn drop(&mut self) {
        let mut splits = self.manager.splits.lock();
        splits.active = splits.active.saturating_sub(1);
        splits.epoch += 1;
    }
}

/// Read-only view of a held lock
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockInfo {
    pub keys: Vec<String>,
    pub intent: LockIntent,
    pub reason: String,
    pub age: Duration,
}

/// Lock key for a tmux pane handle
pub fn pane_key(pane: TmuxPaneId) -> String {
    format_pane_id(pane)
}

/// Per-pane mutual exclusion with timeout
#[derive(Debug)]
pub struct LifecycleManager {
    locks: Mutex<HashMap<String, LockEntry>>,
    next_generation: AtomicU64,
    splits: Mutex<SplitState>,
    timeout: Duration,
}

impl LifecycleManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            splits: Mutex::new(SplitState::default()),
            timeout,
        }
    }

    /// Lock a pane for closing.
    ///
    /// Returns `false` when any of its keys is already locked; the caller
    /// must then skip its conflicting work instead of waiting.
    pub fn begin_close(&self, id: &str, external: Option<TmuxPaneId>, reason: &str) -> bool {
        self.acquire(id, external, LockIntent::Close, reason)
            .is_some()
    }

    /// Lock a pane while it is being created or rebuilt.
    pub fn begin_operation(&self, id: &str, external: Option<TmuxPaneId>, reason: &str) -> bool {
        self.acquire(id, external, LockIntent::Busy, reason)
            .is_some()
    }

    /// Lock `id` (and `%N` when given), returning the token that releases it.
    ///
    /// `None` when any of the keys is already locked.
    pub fn acquire(
        &self,
        id: &str,
        external: Option<TmuxPaneId>,
        intent: LockIntent,
        reason: &str,
    ) -> Option<LockToken> {
        let mut keys = vec![id.to_string()];
        if let Some(pane) = external {
            keys.push(pane_key(pane));
        }

        let mut locks = self.locks.lock();
        let now = Instant::now();
        if let Some(held) = keys
            .iter()
            .filter_map(|key| locks.get(key))
            .find(|entry| now.duration_since(entry.acquired_at) < self.timeout)
        {
            log::debug!(
                "Lock on {:?} refused: held for '{}' ({:?})",
                keys,
                held.reason,
                held.intent
            );
            return None;
        }

        // Expired leftovers under any of our keys go away with all their aliases
        let stale: Vec<String> = keys
            .iter()
            .filter_map(|key| locks.get(key))
            .flat_map(|entry| entry.aliases.clone())
            .collect();
        for key in stale {
            locks.remove(&key);
        }

        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let entry = LockEntry {
            intent,
            reason: reason.to_string(),
            acquired_at: now,
            aliases: keys.clone(),
            generation,
        };
        for key in keys {
            locks.insert(key, entry.clone());
        }
        log::debug!("Locked {} for '{}' ({:?})", id, reason, intent);
        Some(LockToken {
            key: id.to_string(),
            generation,
        })
    }

    fn active_entry(&self, key: &str) -> Option<LockEntry> {
        let locks = self.locks.lock();
        locks
            .get(key)
            .filter(|entry| entry.acquired_at.elapsed() < self.timeout)
            .cloned()
    }

    /// Whether `key` is locked for closing
    pub fn is_closing(&self, key: &str) -> bool {
        self.active_entry(key)
            .is_some_and(|entry| entry.intent == LockIntent::Close)
    }

    /// Whether `key` is locked for any reason
    pub fn is_locked(&self, key: &str) -> bool {
        self.active_entry(key).is_some()
    }

    pub fn is_pane_locked(&self, pane: TmuxPaneId) -> bool {
        self.is_locked(&pane_key(pane))
    }

    /// Finish a close started with [`Self::begin_close`], releasing whatever
    /// lock is held under `key` and every alias.
    pub fn complete_close(&self, key: &str) -> bool {
        let mut locks = self.locks.lock();
        let Some(entry) = locks.remove(key) else {
            return false;
        };
        for alias in &entry.aliases {
            locks.remove(alias);
        }
        log::debug!("Completed close of {:?} ('{}')", entry.aliases, entry.reason);
        true
    }

    /// Release the lock `token` was issued for, with every alias.
    ///
    /// Returns `false` when the lock is gone or was taken over by someone
    /// else after expiring; the current holder keeps it.
    pub fn release(&self, token: LockToken) -> bool {
        let mut locks = self.locks.lock();
        let entry = match locks.get(&token.key) {
            Some(entry) if entry.generation == token.generation => entry.clone(),
            Some(entry) => {
                log::warn!(
                    "Not releasing {}: lock was re-taken for '{}' after expiring",
                    token.key,
                    entry.reason
                );
                return false;
            }
            None => return false,
        };
        for alias in &entry.aliases {
            if locks
                .get(alias)
                .is_some_and(|held| held.generation == token.generation)
            {
                locks.remove(alias);
            }
        }
        log::debug!("Released lock on {:?} ('{}')", entry.aliases, entry.reason);
        true
    }

    /// Fence a split until the returned guard is dropped.
    pub fn begin_split(&self) -> SplitFence<'_> {
        let mut splits = self.splits.lock();
        splits.active += 1;
        splits.epoch += 1;
        SplitFence { manager: self }
    }

    /// Marker to pass to [`Self::splits_quiet_since`] later
    pub fn split_epoch(&self) -> u64 {
        self.splits.lock().epoch
    }

    /// Whether no split is in flight and none started or finished since
    /// `epoch` was read
    pub fn splits_quiet_since(&self, epoch: u64) -> bool {
        let splits = self.splits.lock();
        splits.active == 0 && splits.epoch == epoch
    }

    /// Release locks older than the timeout. Returns how many were released.
    pub fn sweep_expired(&self) -> usize {
        let mut locks = self.locks.lock();
        let expired: Vec<LockEntry> = locks
            .values()
            .filter(|entry| entry.acquired_at.elapsed() >= self.timeout)
            .cloned()
            .collect();

        let mut released = 0;
        for entry in expired {
            let mut removed_any = false;
            for alias in &entry.aliases {
                removed_any |= locks.remove(alias).is_some();
            }
            if removed_any {
                released += 1;
                log::warn!(
                    "Lock on {:?} ('{}') expired after {:?}",
                    entry.aliases,
                    entry.reason,
                    self.timeout
                );
            }
        }
        released
    }

    /// Snapshot of the currently held locks, one entry per lock
    pub fn held(&self) -> Vec<LockInfo> {
        let locks = self.locks.lock();
        let mut seen: Vec<&Vec<String>> = Vec::new();
        let mut held = Vec::new();
        for entry in locks.values() {
            if seen.contains(&&entry.aliases) {
                continue;
            }
            seen.push(&entry.aliases);
            held.push(LockInfo {
                keys: entry.aliases.clone(),
                intent: entry.intent,
                reason: entry.reason.clone(),
                age: entry.acquired_at.elapsed(),
            });
        }
        held.sort_by(|a, b| a.keys.cmp(&b.keys));
        held
    }

    /// Periodically sweep expired locks until the manager is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.sweep_expired();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_close_is_refused() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        assert!(locks.begin_close("pg-1", Some(4), "user close"));
        assert!(!locks.begin_close("pg-1", Some(4), "user close again"));
        // Either key alone is enough to collide
        assert!(!locks.begin_close("pg-other", Some(4), "hook"));
        assert!(!locks.begin_operation("pg-1", None, "recreate"));
    }

    #[test]
    fn test_lock_visible_under_both_keys() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        locks.begin_close("pg-1", Some(4), "user close");
        assert!(locks.is_closing("pg-1"));
        assert!(locks.is_closing("%4"));
        assert!(locks.is_pane_locked(4));
        assert!(!locks.is_locked("pg-2"));
    }

    #[test]
    fn test_complete_releases_all_aliases() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        locks.begin_close("pg-1", Some(4), "user close");
        assert!(locks.complete_close("%4"));
        assert!(!locks.is_locked("pg-1"));
        assert!(!locks.is_locked("%4"));
        assert!(!locks.complete_close("pg-1"));
        assert!(locks.begin_close("pg-1", Some(4), "again"));
    }

    #[test]
    fn test_busy_is_locked_but_not_closing() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        locks.begin_operation("pg-1", None, "recreate");
        assert!(locks.is_locked("pg-1"));
        assert!(!locks.is_closing("pg-1"));
    }

    #[test]
    fn test_expired_locks_are_ignored_and_swept() {
        let locks = LifecycleManager::new(Duration::from_millis(10));
        locks.begin_close("pg-1", Some(4), "crashed close");
        locks.begin_operation("pg-2", None, "crashed create");
        std::thread::sleep(Duration::from_millis(25));

        assert!(!locks.is_locked("pg-1"));
        assert_eq!(locks.held().len(), 2);
        assert_eq!(locks.sweep_expired(), 2);
        assert!(locks.held().is_empty());
    }

    #[test]
    fn test_expired_lock_can_be_retaken() {
        let locks = LifecycleManager::new(Duration::from_millis(10));
        locks.begin_close("pg-1", Some(4), "crashed close");
        std::thread::sleep(Duration::from_millis(25));
        assert!(locks.begin_close("pg-1", Some(5), "retry"));
        // The old %4 alias went away with the expired entry
        assert_eq!(locks.held().len(), 1);
        assert_eq!(locks.held()[0].keys, vec!["pg-1".to_string(), "%5".to_string()]);
    }

    #[test]
    fn test_token_releases_every_alias() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        let token = locks
            .acquire("pg-1", Some(4), LockIntent::Busy, "new pane")
            .unwrap();
        assert_eq!(token.key(), "pg-1");
        assert!(locks.is_pane_locked(4));
        assert!(locks.release(token));
        assert!(locks.held().is_empty());
    }

    #[test]
    fn test_stale_token_cannot_release_new_holder() {
        let locks = LifecycleManager::new(Duration::from_millis(10));
        let stale = locks
            .acquire("pg-1", Some(4), LockIntent::Busy, "slow recreate")
            .unwrap();
        std::thread::sleep(Duration::from_millis(25));

        let current = locks
            .acquire("pg-1", Some(4), LockIntent::Close, "user close")
            .unwrap();
        assert!(!locks.release(stale));
        assert!(locks.is_closing("pg-1"));
        assert!(locks.is_closing("%4"));

        assert!(locks.release(current));
        assert!(!locks.is_locked("pg-1"));
    }

    #[test]
    fn test_split_fence_marks_epoch_dirty() {
        let locks = LifecycleManager::new(Duration::from_secs(30));
        let before = locks.split_epoch();
        assert!(locks.splits_quiet_since(before));

        let fence = locks.begin_split();
        assert!(!locks.splits_quiet_since(before));
        assert!(!locks.splits_quiet_since(locks.split_epoch()));
        drop(fence);

        // Finished since `before`, so a pass that read `before` stays wary
        assert!(!locks.splits_quiet_since(before));
        assert!(locks.splits_quiet_since(locks.split_epoch()));
    }

    #[tokio::test]
    async fn test_sweeper_task_releases_expired_locks() {
        let locks = Arc::new(LifecycleManager::new(Duration::from_millis(10)));
        locks.begin_close("pg-1", None, "crashed close");
        let sweeper = locks.spawn_sweeper(Duration::from_millis(5));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(locks.held().is_empty());
        sweeper.abort();
    }
}
