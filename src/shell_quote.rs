//! Shell quoting for the commands panegrid hands to tmux hooks.
//!
//! tmux runs hook commands through `/bin/sh -c`, so paths with spaces or
//! quotes in them must be quoted before they are spliced in.

use std::path::Path;

/// Characters that require quoting in POSIX shells
const SHELL_SPECIAL_CHARS: &[char] = &[
    ' ', '\t', '\n', '\r', // Whitespace
    '\'', '"', '`', // Quotes and backticks
    '$', '!', '&', '|', // Variable expansion and control operators
    ';', '(', ')', '{', '}', '[', ']', // Grouping and subshell
    '<', '>', // Redirection
    '*', '?', // Glob patterns
    '\\', '#', '~', '^', // Escape, comments, home, history
];

/// Check if a word contains any characters that need quoting.
pub fn needs_quoting(word: &str) -> bool {
    word.is_empty() || word.chars().any(|c| SHELL_SPECIAL_CHARS.contains(&c))
}

/// Single-quote `word`, closing and reopening the quote around any `'`:
/// `it's` becomes `'it'\''s'`
pub fn quote(word: &str) -> String {
    format!("'{}'", word.replace('\'', "'\\''"))
}

/// Quote a path for a shell command line.
pub fn quote_path(path: &Path) -> String {
    quote(&path.to_string_lossy())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path_still_quoted() {
        assert_eq!(quote_path(Path::new("/usr/bin/panegrid")), "'/usr/bin/panegrid'");
        assert!(!needs_quoting("/usr/bin/panegrid"));
    }

    #[test]
    fn test_spaces_and_quotes() {
        assert!(needs_quoting("/home/me/my project"));
        assert_eq!(quote("/tmp/it's here"), "'/tmp/it'\\''s here'");
    }

    #[test]
    fn test_empty_needs_quoting() {
        assert!(needs_quoting(""));
        assert_eq!(quote(""), "''");
    }
}
