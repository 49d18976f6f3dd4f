//! Truncation Utilities
//!
//! Short, UTF-8 safe previews of arbitrary text for log lines.

/// Keep the first `max_bytes` of `content` on a char boundary and note how
/// much was cut. Used for warning logs about skipped stream frames.
pub fn truncate_text(content: &str, max_bytes: usize) -> String {
    if content.len() <= max_bytes {
        return content.to_string();
    }

    let mut end = max_bytes;
    while !content.is_char_boundary(end) {
        end -= 1;
    }

    format!("{}... [{} bytes truncated]", &content[..end], content.len() - end)
}
