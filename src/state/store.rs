//! File I/O for the state document
//!
//! The document lives at `<project>/.panegrid/panes.json`. Reads may happen
//! anywhere; every write goes through [`StateStore::update`], which runs the
//! read-modify-write on the store's [`WriteQueue`] against a fresh read.

use super::{StateDocument, WriteQueue};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

/// Errors reading or writing the state document
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on state file {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt state file {path:?}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Owner of one project's state file
#[derive(Debug)]
pub struct StateStore {
    path: PathBuf,
    queue: WriteQueue,
    writes: AtomicU64,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            queue: WriteQueue::new(),
            writes: AtomicU64::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of times the file has been written by this store
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    /// Read the document. A missing or blank file is an empty document.
    pub async fn load(&self) -> Result<StateDocument, StoreError> {
        let contents = match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(StateDocument::default());
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if contents.trim().is_empty() {
            return Ok(StateDocument::default());
        }

        serde_json::from_str(&contents).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })
    }

    /// Read the document, treating an unreadable or corrupt file as empty.
    ///
    /// Untracked-pane detection re-adopts whatever is live, so the tracked
    /// set heals itself on the next pass.
    pub async fn load_or_empty(&self) -> StateDocument {
        match self.load().await {
            Ok(doc) => doc,
            Err(e) => {
                log::warn!("{}; continuing with an empty pane collection", e);
                StateDocument::default()
            }
        }
    }

    /// Apply `mutate` to a fresh read of the document on the write queue.
    ///
    /// The file is rewritten only when `mutate` actually changed the
    /// document. A corrupt file is replaced by the mutated empty document.
    pub async fn update<F, T>(&self, mutate: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut StateDocument) -> T,
    {
        self.queue
            .enqueue(move || async move {
                let mut doc = self.load_or_empty().await;
                let before = doc.clone();
                let result = mutate(&mut doc);
                if doc != before {
                    self.write(&mut doc).await?;
                }
                Ok::<T, StoreError>(result)
            })
            .await
    }

    /// Atomic whole-document write: temp file then rename
    async fn write(&self, doc: &mut StateDocument) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
        }

        doc.last_updated = Some(chrono::Utc::now());
        let json = serde_json::to_string_pretty(doc).map_err(|source| StoreError::Json {
            path: self.path.clone(),
            source,
        })?;

        let temp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&temp_path, json).await.map_err(io_err)?;
        tokio::fs::rename(&temp_path, &self.path)
            .await
            .map_err(io_err)?;

        self.writes.fetch_add(1, Ordering::Relaxed);
        log::debug!(
            "Saved pane state ({} panes) to {:?}",
            doc.panes.len(),
            self.path
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::PaneRecord;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_load_nonexistent_file() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join("panes.json"));
        assert_eq!(store.load().await.unwrap(), StateDocument::default());
    }

    #[tokio::test]
    async fn test_load_corrupt_file() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("panes.json");
        std::fs::write(&path, "{ not json").unwrap();
        let store = StateStore::new(&path);

        assert!(matches!(store.load().await, Err(StoreError::Json { .. })));
        assert!(store.load_or_empty().await.panes.is_empty());
    }

    #[tokio::test]
    async fn test_update_writes_only_on_change() {
        let temp = tempdir().unwrap();
        let store = StateStore::new(temp.path().join(".panegrid").join("panes.json"));

        store
            .update(|doc| doc.panes.push(PaneRecord::shell("shell-1", 3)))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 1);
        assert!(!store.path().with_extension("json.tmp").exists());

        let count = store.update(|doc| doc.panes.len()).await.unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.write_count(), 1);

        let doc = store.load().await.unwrap();
        assert_eq!(doc.panes[0].slug, "shell-1");
        assert!(doc.last_updated.is_some());
    }

    #[tokio::test]
    async fn test_update_preserves_foreign_fields() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("panes.json");
        std::fs::write(
            &path,
            r#"{"panes": [{"id": "pg-1", "slug": "a", "paneId": "%1", "kind": "shell", "note": "keep"}], "theme": "dark"}"#,
        )
        .unwrap();
        let store = StateStore::new(&path);

        store
            .update(|doc| doc.control_pane_id = Some(0))
            .await
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["theme"], "dark");
        assert_eq!(raw["panes"][0]["note"], "keep");
        assert_eq!(raw["controlPaneId"], "%0");
    }
}
