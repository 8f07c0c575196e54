/*
 * This file is part of the lifecycle-supervisor distribution.
 *
 * Licensed under the MIT license. See LICENSE file in the project root for details.
 */

//! A small environment-variable loading convenience, independent of the supervisor core.
//!
//! Kept intentionally minimal: this crate's specification places it out of core scope, as a
//! convenience rather than a designed subsystem.

use std::collections::HashMap;
use std::path::Path;

/// How a loaded value is applied to the process environment.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Action {
    /// Always sets the variable, replacing any existing value.
    Override,
    /// Only sets the variable if it isn't already present in the environment.
    Default,
}

/// Parses `KEY=value` lines (blank lines and `#`-prefixed comments ignored) into a map.
#[must_use]
pub fn parse(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect()
}

/// Reads `path` and applies its `KEY=value` pairs to the process environment using `action`.
///
/// # Errors
///
/// Returns an error if `path` cannot be read.
pub fn apply_file(path: impl AsRef<Path>, action: Action) -> std::io::Result<()> {
    let contents = std::fs::read_to_string(path)?;
    apply_map(&parse(&contents), action);
    Ok(())
}

/// Applies `values` to the process environment using `action`.
pub fn apply_map(values: &HashMap<String, String>, action: Action) {
    for (key, value) in values {
        match action {
            Action::Override => {
                // SAFETY: this crate does not spawn threads that read the environment
                // concurrently with this call; callers embedding this in a multi-threaded
                // context should apply environment values before spawning such threads.
                unsafe { std::env::set_var(key, value) };
            }
            Action::Default => {
                if std::env::var_os(key).is_none() {
                    // SAFETY: see above.
                    unsafe { std::env::set_var(key, value) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_skips_blank_lines_and_comments() {
        let parsed = parse("# a comment\nFOO=bar\n\nBAZ=qux\n");
        assert_eq!(parsed.get("FOO").map(String::as_str), Some("bar"));
        assert_eq!(parsed.get("BAZ").map(String::as_str), Some("qux"));
        assert_eq!(parsed.len(), 2);
    }

    #[test]
    fn parse_trims_keys_and_values() {
        let parsed = parse("  FOO = bar  \n");
        assert_eq!(parsed.get("FOO").map(String::as_str), Some("bar"));
    }
}
