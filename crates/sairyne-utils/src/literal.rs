//! String-literal escaping for scripts and hand-built JSON documents.
//!
//! The host builds small JSON blobs and script snippets by concatenation
//! instead of through a serializer, so every value spliced into them goes
//! through one of these escapers first.

use std::fmt::Write;

/// Escape `text` for use between the double quotes of a JSON string.
///
/// Backslash, double quote, `\n`, `\r` and `\t` get their short escapes;
/// other control characters become `\u00XX`. U+2028/U+2029 are escaped too
/// because the result is also evaluated as script source.
pub fn escape_json_string(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c if (c as u32) < 0x20 => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// Escape `text` for use between the single quotes of a JavaScript string.
pub fn escape_js_single_quoted(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 8);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            // `</script>` inside an inline script would end the element.
            '<' => out.push_str("\\x3C"),
            c => out.push(c),
        }
    }
    out
}
