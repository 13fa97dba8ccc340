//! Marker for cleanup steps whose failure must not stop the surrounding flow.
//!
//! Killing a stale pane, retitling or removing a leftover file is allowed to
//! fail. Wrapping such a step in [`best_effort`] makes that choice visible at
//! the call site and still leaves a trace in the debug log.

use std::fmt::Display;

/// Log and discard the error of a non-fatal step.
pub fn best_effort<T, E: Display>(label: &str, result: Result<T, E>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            log::debug!("best-effort step '{}' failed: {}", label, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_best_effort_keeps_value() {
        assert_eq!(best_effort::<_, String>("ok", Ok(3)), Some(3));
        assert_eq!(best_effort::<u8, _>("fail", Err("boom")), None);
    }
}
