//! String utilities for the domain layer.

/// Truncate a string to at most `max_bytes` without splitting a UTF-8
/// character boundary.
///
/// Returns a sub-slice of the original string. If the string is shorter than
/// `max_bytes`, the entire string is returned unchanged.
pub fn truncate_str(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Build the single-line callstack suffix attached to application errors:
/// `"\n<function_name>(<first 20 bytes of params>)"`.
pub fn callstack_suffix(function_name: &str, params_json: &str) -> String {
    format!("\n{}({})", function_name, truncate_str(params_json, 20))
}
