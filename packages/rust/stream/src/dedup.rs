//! Collapse cumulative content snapshots into appended suffixes.

/// The part of `new_full` that extends `previous_full`.
///
/// When `new_full` does not start with `previous_full` the producer restarted
/// its output, and all of `new_full` counts as new. Either way the caller's
/// baseline becomes `new_full`.
pub fn delta<'a>(previous_full: &str, new_full: &'a str) -> &'a str {
    new_full.strip_prefix(previous_full).unwrap_or(new_full)
}

/// Whether `new_full` extends `previous_full`.
pub fn is_extension(previous_full: &str, new_full: &str) -> bool {
    new_full.starts_with(previous_full)
}
