//! String utilities

/// Longest `last_error` text kept on a credential
pub const MAX_ERROR_CHARS: usize = 500;

/// Safely truncate a string at a character boundary
///
/// # Example
/// ```
/// use keypool::utils::truncate_str;
///
/// assert_eq!(truncate_str("quota exceeded", 5), "quota");
/// assert_eq!(truncate_str("größe", 3), "grö");
/// ```
pub fn truncate_str(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Diagnostic error text bounded to [`MAX_ERROR_CHARS`]
pub fn bound_error_text(error: impl std::fmt::Display) -> String {
    truncate_str(&error.to_string(), MAX_ERROR_CHARS).to_string()
}
