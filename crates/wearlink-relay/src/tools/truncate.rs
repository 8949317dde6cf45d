//! Byte-budget truncation at sentence boundaries.

/// Appended to any content that was cut.
pub const TRUNCATION_MARKER: &str = "\n\n[Content truncated]";

/// Cut `content` to at most `budget` bytes (marker excluded).
///
/// Looks backward from the budget to 80% of it for the last sentence end
/// (`.`, `!` or `?` followed by whitespace) or newline; without one the cut
/// is made at the budget, moved back to the nearest char boundary.
pub fn truncate_content(content: &str, budget: usize) -> String {
    if content.len() <= budget {
        return content.to_string();
    }

    let hard = floor_char_boundary(content, budget);
    let window_start = budget / 10 * 8 + budget % 10 * 8 / 10;
    let cut = sentence_boundary(content.as_bytes(), window_start, hard).unwrap_or(hard);

    let mut out = String::with_capacity(cut + TRUNCATION_MARKER.len());
    out.push_str(&content[..cut]);
    out.push_str(TRUNCATION_MARKER);
    out
}

/// End offset of the last boundary in `[start, end)`.
fn sentence_boundary(bytes: &[u8], start: usize, end: usize) -> Option<usize> {
    (start..end).rev().find_map(|i| match bytes[i] {
        b'\n' => Some(i),
        b'.' | b'!' | b'?' if bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace) => Some(i + 1),
        _ => None,
    })
}

fn floor_char_boundary(s: &str, index: usize) -> usize {
    let mut i = index.min(s.len());
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}
