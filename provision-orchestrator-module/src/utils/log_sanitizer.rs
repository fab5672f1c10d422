//! Log sanitization utilities
//!
//! Keeps provider response bodies (which can echo account details or keys)
//! from being fully exposed in debug/error logs and call records.

/// Maximum number of bytes to include in truncated log output.
pub const TRUNCATE_LIMIT: usize = 256;

fn floor_char_boundary(s: &str, index: usize) -> usize {
    if index >= s.len() {
        s.len()
    } else {
        let mut i = index;
        while i > 0 && !s.is_char_boundary(i) {
            i -= 1;
        }
        i
    }
}

/// Truncate a string for safe logging.
pub fn truncate_for_log(s: &str) -> String {
    truncate_to(s, TRUNCATE_LIMIT)
}

/// Truncate a string to `limit` bytes on a char boundary, noting the total length.
pub fn truncate_to(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        s.to_string()
    } else {
        format!(
            "{}... [truncated, total {} bytes]",
            &s[..floor_char_boundary(s, limit)],
            s.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_string_unchanged() {
        assert_eq!(truncate_for_log("error=0&text=ok"), "error=0&text=ok");
    }

    #[test]
    fn over_limit_truncated() {
        let s = "x".repeat(TRUNCATE_LIMIT + 10);
        let result = truncate_for_log(&s);
        assert!(result.ends_with(&format!("total {} bytes]", TRUNCATE_LIMIT + 10)));
    }

    #[test]
    fn multibyte_chars_safe() {
        let s = "é".repeat(300);
        assert!(truncate_to(&s, 5).starts_with("éé..."));
    }
}
