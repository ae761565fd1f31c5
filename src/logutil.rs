//! Log sanitizing helpers.
//!
//! Server text (message log lines, menu bodies, raw JSON frames) routinely carries
//! newlines and tab characters. Everything that reaches a `log` macro from the wire
//! goes through these helpers so each record stays on a single line.

use std::fmt::Write;

/// Upper bound on characters kept by [`escape_log`].
const MAX_PREVIEW: usize = 300;

/// Escape control characters for single-line logging and cap the length.
///
/// `\n`, `\r`, `\t` and backslash get their usual escapes; other control
/// characters are shown as `\xNN`. Output past [`MAX_PREVIEW`] characters is
/// replaced with an ellipsis.
pub fn escape_log(s: &str) -> String {
    let mut out = String::with_capacity(s.len().min(MAX_PREVIEW) + 8);
    for (count, ch) in s.chars().enumerate() {
        if count >= MAX_PREVIEW {
            out.push('…');
            break;
        }
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let _ = write!(&mut out, "\\x{:02X}", c as u32);
            }
            c => out.push(c),
        }
    }
    out
}

/// UTF-8 safe byte truncation followed by [`escape_log`].
///
/// Used for raw frames where the byte budget matters more than characters.
pub fn truncate_for_log(input: &str, max_bytes: usize) -> String {
    if input.len() <= max_bytes {
        return escape_log(input);
    }
    let mut cut = max_bytes.saturating_sub(3);
    while cut > 0 && !input.is_char_boundary(cut) {
        cut -= 1;
    }
    let mut out = escape_log(&input[..cut]);
    out.push_str("...");
    out
}

/// Short hex preview of a binary frame, e.g. for undecodable compressed data.
pub fn hex_preview(data: &[u8], max: usize) -> String {
    let mut out = String::with_capacity(max.min(data.len()) * 2 + 8);
    for b in data.iter().take(max) {
        let _ = write!(&mut out, "{:02x}", b);
    }
    if data.len() > max {
        let _ = write!(&mut out, "..(+{})", data.len() - max);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_newlines_and_tabs() {
        let esc = escape_log("You die...\n\tKilled by a jackal\r");
        assert_eq!(esc, "You die...\\n\\tKilled by a jackal\\r");
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        let s = "ééééé"; // two bytes each
        let out = truncate_for_log(s, 6);
        assert!(out.ends_with("..."));
        assert!(out.starts_with('é'));
    }

    #[test]
    fn hex_preview_marks_remaining_bytes() {
        assert_eq!(hex_preview(&[0x00, 0xff, 0x10], 2), "00ff..(+1)");
        assert_eq!(hex_preview(&[0xab], 4), "ab");
    }
}
