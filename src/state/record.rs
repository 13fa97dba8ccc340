//! Tracked pane records and the state document that holds them.

use chrono::{DateTime, Utc};
use panegrid_tmux::TmuxPaneId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;

/// What a content pane is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaneKind {
    /// Runs an agent inside its own worktree directory
    Worktree,
    /// Plain terminal, nothing to restore when it dies
    Shell,
}

impl std::fmt::Display for PaneKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(match self {
            PaneKind::Worktree => "worktree",
            PaneKind::Shell => "shell",
        })
    }
}

/// One tracked content pane.
///
/// Presence in [`StateDocument::panes`] is what "tracked" means; there is no
/// separate status field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaneRecord {
    /// Stable logical ID, never reused
    pub id: String,
    /// Human-readable name; also the worktree directory and the pane title
    pub slug: String,
    /// Current tmux handle. Volatile, only rebound by title match.
    #[serde(
        rename = "paneId",
        with = "pane_handle",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub external_pane_id: Option<TmuxPaneId>,
    pub kind: PaneKind,
    /// Only set for worktree panes; siblings may share it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_path: Option<PathBuf>,
    /// Fields owned by other tools (agent metadata, prompts, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PaneRecord {
    /// Generate a fresh logical ID
    pub fn new_id() -> String {
        format!("pg-{}", uuid::Uuid::new_v4())
    }

    pub fn worktree(slug: impl Into<String>, pane: TmuxPaneId, path: impl Into<PathBuf>) -> Self {
        Self {
            id: Self::new_id(),
            slug: slug.into(),
            external_pane_id: Some(pane),
            kind: PaneKind::Worktree,
            worktree_path: Some(path.into()),
            extra: Map::new(),
        }
    }

    pub fn shell(slug: impl Into<String>, pane: TmuxPaneId) -> Self {
        Self {
            id: Self::new_id(),
            slug: slug.into(),
            external_pane_id: Some(pane),
            kind: PaneKind::Shell,
            worktree_path: None,
            extra: Map::new(),
        }
    }

    /// Whether `key` names this record by logical ID, slug or `%N` handle
    pub fn matches_key(&self, key: &str) -> bool {
        self.id == key
            || self.slug == key
            || (self.external_pane_id.is_some()
                && self.external_pane_id == panegrid_tmux::parse_pane_id(key)
                && key.starts_with('%'))
    }
}

/// The JSON file of record for one project
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDocument {
    #[serde(default)]
    pub panes: Vec<PaneRecord>,
    /// The sidebar pane
    #[serde(with = "pane_handle", default, skip_serializing_if = "Option::is_none")]
    pub control_pane_id: Option<TmuxPaneId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Document fields this crate does not own; preserved verbatim
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl StateDocument {
    pub fn find(&self, id: &str) -> Option<&PaneRecord> {
        self.panes.iter().find(|record| record.id == id)
    }

    pub fn find_mut(&mut self, id: &str) -> Option<&mut PaneRecord> {
        self.panes.iter_mut().find(|record| record.id == id)
    }

    /// Resolve a logical ID, slug or `%N` handle
    pub fn resolve(&self, key: &str) -> Option<&PaneRecord> {
        self.panes.iter().find(|record| record.matches_key(key))
    }

    pub fn find_by_pane(&self, pane: TmuxPaneId) -> Option<&PaneRecord> {
        self.panes
            .iter()
            .find(|record| record.external_pane_id == Some(pane))
    }

    pub fn slug_taken(&self, slug: &str) -> bool {
        self.panes.iter().any(|record| record.slug == slug)
    }

    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.panes.iter().map(|record| record.slug.as_str())
    }

    /// Remove a record by logical ID, returning it
    pub fn remove(&mut self, id: &str) -> Option<PaneRecord> {
        let index = self.panes.iter().position(|record| record.id == id)?;
        Some(self.panes.remove(index))
    }

    /// Tmux handles of the tracked panes, in document order
    pub fn content_pane_ids(&self) -> Vec<TmuxPaneId> {
        self.panes
            .iter()
            .filter_map(|record| record.external_pane_id)
            .collect()
    }
}

/// `%N` on disk, [`TmuxPaneId`] in memory. Unparsable handles load as `None`
/// so a hand-edited file degrades to "unresolved" instead of failing.
mod pane_handle {
    use panegrid_tmux::{TmuxPaneId, format_pane_id, parse_pane_id};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<TmuxPaneId>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(id) => serializer.serialize_str(&format_pane_id(*id)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<TmuxPaneId>, D::Error> {
        let handle = Option::<String>::deserialize(deserializer)?;
        Ok(handle.as_deref().and_then(parse_pane_id))
    }
}
