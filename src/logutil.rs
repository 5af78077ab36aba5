//! Sanitising user-supplied text (names, descriptions, messages) before it reaches a log line.

const MAX_PREVIEW: usize = 120;

/// Escape `s` so it stays on one log line, truncated to a short preview.
///
/// Backslash, newline, carriage return and tab become two-character escapes; any other
/// control character becomes `\xNN`. Text longer than the preview ends in `…`.
pub fn escape_log(s: &str) -> String {
    escape_with_limit(s, MAX_PREVIEW)
}

fn escape_with_limit(s: &str, limit: usize) -> String {
    use std::fmt::Write;

    let mut out = String::with_capacity(s.len().min(limit) + 4);
    for (count, ch) in s.chars().enumerate() {
        if count >= limit {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}
