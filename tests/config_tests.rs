//! Integration tests for configuration loading and how it feeds the rest of
//! panegrid.

use panegrid::config::{Config, ConfigError};
use panegrid::layout::{LayoutBounds, compute_layout};
use std::path::Path;
use tempfile::TempDir;

/// Test that a partial YAML file keeps defaults for everything it omits.
#[test]
fn test_partial_yaml_keeps_defaults() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.yaml");
    std::fs::write(
        &path,
        r#"
sidebar_width: 30
max_pane_width: 100
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.sidebar_width, 30);
    assert_eq!(config.max_pane_width, 100);
    assert_eq!(config.min_pane_width, Config::default().min_pane_width);
    assert_eq!(config.spacer_title, "panegrid-spacer");
}

/// Test that validation failures surface as a typed error inside anyhow.
#[test]
fn test_invalid_bounds_rejected() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("config.yaml");
    std::fs::write(&path, "min_pane_width: 120\nmax_pane_width: 80\n").unwrap();

    let err = Config::load_from(&path).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Validation(_))
    ));
}

/// Test that a saved config loads back equal.
#[test]
fn test_save_then_load() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.yaml");
    let config = Config {
        poll_interval_secs: 7,
        tmux_path: "/opt/tmux/bin/tmux".to_string(),
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.poll_interval_secs, 7);
    assert_eq!(loaded.tmux_path, "/opt/tmux/bin/tmux");
}

/// Test the per-project layout of the state directory.
#[test]
fn test_project_paths() {
    let config = Config::default();
    let root = Path::new("/work/repo");
    assert_eq!(
        config.state_file(root),
        Path::new("/work/repo/.panegrid/panes.json")
    );
    assert_eq!(
        config.hook_trigger_file(root),
        Path::new("/work/repo/.panegrid/notify")
    );
    assert_eq!(
        config.worktrees_dir(root),
        Path::new("/work/repo/.panegrid/worktrees")
    );
}

/// Test that configured bounds drive the grid.
#[test]
fn test_bounds_from_config() {
    let config = Config {
        sidebar_width: 20,
        min_pane_width: 60,
        max_pane_width: 100,
        min_pane_height: 15,
        ..Config::default()
    };
    let bounds = LayoutBounds::from_config(&config);
    assert_eq!(bounds.sidebar_width, 20);

    // Two 60-wide columns need 20 + 1 + 60 + 1 + 60 = 142
    let narrow = compute_layout(2, 141, 40, &bounds).unwrap();
    assert_eq!(narrow.columns, 1);
    let wide = compute_layout(2, 142, 40, &bounds).unwrap();
    assert_eq!(wide.columns, 2);
}
