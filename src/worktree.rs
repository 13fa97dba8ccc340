//! Worktree directory lookup.
//!
//! panegrid never creates branches or runs git; it only needs to know where
//! a slug's working copy lives and whether that directory still exists.

use std::path::{Path, PathBuf};

/// Maps slugs to worktree directories
pub trait WorktreeProvider: Send + Sync {
    /// Directory for `slug`, whether or not it exists yet
    fn worktree_path(&self, slug: &str) -> PathBuf;

    /// Whether `path` is still there to start a pane in
    fn exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    /// Make sure the directory for `slug` exists and return it
    fn ensure(&self, slug: &str) -> std::io::Result<PathBuf> {
        let path = self.worktree_path(slug);
        std::fs::create_dir_all(&path)?;
        Ok(path)
    }
}

/// Worktrees laid out as `<root>/<slug>`
#[derive(Debug, Clone)]
pub struct DirectoryWorktrees {
    root: PathBuf,
}

impl DirectoryWorktrees {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl WorktreeProvider for DirectoryWorktrees {
    fn worktree_path(&self, slug: &str) -> PathBuf {
        self.root.join(slug)
    }
}

/// The worktree directory name, used as the base for sibling slugs
pub fn worktree_name(path: &Path) -> Option<&str> {
    path.file_name()?.to_str()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_directory_layout() {
        let temp = tempdir().unwrap();
        let worktrees = DirectoryWorktrees::new(temp.path().join("worktrees"));
        let path = worktrees.worktree_path("feature-x");
        assert_eq!(path, temp.path().join("worktrees").join("feature-x"));
        assert!(!worktrees.exists(&path));

        let created = worktrees.ensure("feature-x").unwrap();
        assert_eq!(created, path);
        assert!(worktrees.exists(&path));
    }

    #[test]
    fn test_worktree_name() {
        assert_eq!(worktree_name(Path::new("/repo/.panegrid/worktrees/x")), Some("x"));
        assert_eq!(worktree_name(Path::new("/")), None);
    }
}
