//! Slug naming rules.
//!
//! A slug is the pane's name, its title in tmux and the worktree directory
//! name, so it has to be filesystem-safe and unique per project.

use regex::Regex;

/// Prefix of slugs given to adopted plain terminals
pub const SHELL_SLUG_PREFIX: &str = "shell";

/// Whether `slug` is safe to use as a directory name and pane title
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug.len() <= 64
        && !slug.starts_with('.')
        && !slug.starts_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Slug for another pane attached to the worktree named `base`.
///
/// The base counts as number 1, so `{x, x-a2}` yields `x-a3`. Always anchored
/// on the worktree directory name, so attaching from an attached pane never
/// compounds suffixes.
pub fn sibling_slug<'a>(base: &str, existing: impl IntoIterator<Item = &'a str>) -> String {
    let pattern = format!(r"^{}-a(\d+)$", regex::escape(base));
    let highest = match Regex::new(&pattern) {
        Ok(re) => existing
            .into_iter()
            .filter_map(|slug| re.captures(slug))
            .filter_map(|caps| caps[1].parse::<u32>().ok())
            .fold(1, u32::max),
        Err(e) => {
            log::warn!("Bad sibling pattern for {:?}: {}", base, e);
            1
        }
    };
    format!("{}-a{}", base, highest + 1)
}

/// Next free `shell-N` slug, numbered after the highest one in use
pub fn next_shell_slug<'a>(existing: impl IntoIterator<Item = &'a str>) -> String {
    let highest = existing
        .into_iter()
        .filter_map(|slug| slug.strip_prefix(SHELL_SLUG_PREFIX)?.strip_prefix('-'))
        .filter_map(|n| n.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{}-{}", SHELL_SLUG_PREFIX, highest + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_slug_counts_base_as_one() {
        assert_eq!(sibling_slug("x", ["x"]), "x-a2");
        assert_eq!(sibling_slug("x", ["x", "x-a2"]), "x-a3");
        assert_eq!(sibling_slug("x", ["x", "x-a2", "x-a7", "y-a9"]), "x-a8");
    }

    #[test]
    fn test_sibling_slug_ignores_lookalikes() {
        assert_eq!(sibling_slug("x", ["xx-a5", "x-a2-a3", "x-ab"]), "x-a2");
        assert_eq!(sibling_slug("a.b", ["axb-a4", "a.b-a2"]), "a.b-a3");
    }

    #[test]
    fn test_next_shell_slug() {
        assert_eq!(next_shell_slug(Vec::<&str>::new()), "shell-1");
        assert_eq!(next_shell_slug(["shell-1", "shell-3", "feature"]), "shell-4");
        assert_eq!(next_shell_slug(["shellfish-9", "shell-x"]), "shell-1");
    }

    #[test]
    fn test_is_valid_slug() {
        assert!(is_valid_slug("feature-x_2.1"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug(".hidden"));
        assert!(!is_valid_slug("-flag"));
        assert!(!is_valid_slug("has space"));
        assert!(!is_valid_slug("a/b"));
    }
}
