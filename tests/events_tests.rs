//! Integration tests for change notification: hooks, trigger file and the
//! debounced event loop.

mod common;

use common::{FakeMultiplexer, TestProject};
use panegrid::events::{
    ChangeEvent, HookWatcher, WATCHED_HOOKS, channel, install_hooks, run_event_loop, touch_trigger,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn test_install_hooks_runs_notify_for_project() {
    let mux = FakeMultiplexer::with_panes(&["sidebar"], 200, 50);
    let count = install_hooks(
        &*mux,
        Path::new("/usr/local/bin/panegrid"),
        Path::new("/home/me/my project"),
    )
    .await
    .unwrap();
    assert_eq!(count, WATCHED_HOOKS.len());

    let hooks = mux.hooks();
    let names: Vec<&str> = hooks.iter().map(|(hook, _)| hook.as_str()).collect();
    assert_eq!(names, WATCHED_HOOKS);
    assert_eq!(
        hooks[0].1,
        "'/usr/local/bin/panegrid' --project '/home/me/my project' notify \
         --event split --pane '#{hook_pane}'"
    );
    let resized = hooks
        .iter()
        .find(|(hook, _)| hook == "window-resized")
        .unwrap();
    assert!(
        resized
            .1
            .ends_with("--event resized --size '#{client_width}x#{client_height}'")
    );
}

#[tokio::test]
async fn test_event_loop_reconciles_each_burst() {
    let project = TestProject::new(&["bash"]);
    let (notifier, events) = channel();

    notifier.notify(ChangeEvent::PaneSplit(1));
    notifier.notify(ChangeEvent::PollTick);
    notifier.notify(ChangeEvent::UserAction("test".to_string()));
    drop(notifier);

    run_event_loop(
        events,
        Arc::clone(&project.reconciler),
        Duration::from_millis(20),
    )
    .await;

    // Three events inside one debounce window make a single pass
    assert_eq!(project.reconciler.health().snapshot().total_passes, 1);
    assert_eq!(project.doc().await.panes.len(), 1);
}

#[tokio::test]
async fn test_trigger_touch_reaches_the_channel() {
    let dir = tempfile::tempdir().unwrap();
    let trigger = dir.path().join(".panegrid").join("notify");
    let (notifier, mut events) = channel();
    let _watcher = HookWatcher::new(&trigger, notifier, Duration::from_millis(50)).unwrap();

    // Give the backend a moment to arm before touching
    tokio::time::sleep(Duration::from_millis(100)).await;
    touch_trigger(&trigger, &ChangeEvent::PaneExited(7)).unwrap();

    let burst = tokio::time::timeout(
        Duration::from_secs(5),
        events.next_burst(Duration::from_millis(20)),
    )
    .await
    .expect("trigger touch not observed")
    .unwrap();
    assert!(burst.contains(&ChangeEvent::PaneExited(7)));
}

#[tokio::test]
async fn test_resize_burst_reapplies_layout() {
    let project = TestProject::new(&["a", "b"]);
    project.reconciler.reconcile().await;
    assert_eq!(project.mux.calls_matching("select-layout").len(), 1);

    // Same panes, same size: only the resize forces the grid back on
    let (notifier, events) = channel();
    notifier.notify(ChangeEvent::PollTick);
    drop(notifier);
    run_event_loop(events, Arc::clone(&project.reconciler), Duration::from_millis(20)).await;
    assert_eq!(project.mux.calls_matching("select-layout").len(), 1);

    let (notifier, events) = channel();
    notifier.notify(ChangeEvent::Resized {
        width: 200,
        height: 50,
    });
    drop(notifier);
    run_event_loop(events, Arc::clone(&project.reconciler), Duration::from_millis(20)).await;
    assert_eq!(project.mux.calls_matching("select-layout").len(), 2);
}
