//! Escaped byte accounting.
//!
//! Frames travel as JSON strings, so their cost on the wire is the length of
//! the string *after* JSON escaping, not the raw text length. The rules here
//! match `serde_json`'s string serializer exactly:
//!
//! | character                         | cost |
//! |-----------------------------------|------|
//! | `"` and `\`                       | 2    |
//! | `\b` `\t` `\n` `\f` `\r`          | 2    |
//! | other U+0000..=U+001F             | 6 (`\u00XX`) |
//! | anything else                     | UTF-8 length (1–4) |
//!
//! Serialized JSON text never contains raw control characters, but the
//! accountant works on arbitrary text and prices them anyway.

/// Bytes added by the enclosing quotes of a JSON string literal.
pub const QUOTE_OVERHEAD: usize = 2;

/// Upper bound on escaped bytes per input byte.
///
/// Text is indexed in UTF-8 bytes. The worst expansion is a control character
/// such as U+0001: one input byte, six output bytes (`\u0001`). Quotes and
/// backslashes are 1 → 2, and multi-byte characters never grow (a 4-byte
/// character costs 4), so 6 never under-counts.
pub const FAST_PATH_BYTES_PER_UNIT: usize = 6;

/// Escaped byte length of one character inside a JSON string.
pub fn escaped_char_len(c: char) -> usize {
    match c {
        '"' | '\\' => 2,
        '\u{08}' | '\t' | '\n' | '\u{0C}' | '\r' => 2,
        '\u{00}'..='\u{1F}' => 6,
        _ => c.len_utf8(),
    }
}

/// Byte length of `text` serialized as a JSON string, quotes included.
pub fn escaped_len(text: &str) -> usize {
    text.chars()
        .map(escaped_char_len)
        .fold(QUOTE_OVERHEAD, usize::saturating_add)
}

/// Find the furthest cut point for a frame slice.
///
/// Returns the largest `end` on a character boundary such that
/// `escaped_len(&text[start..end]) <= max_bytes`. Returns `start` when not
/// even one character fits.
///
/// # Panics
///
/// Panics if `start` is not on a character boundary of `text`.
pub fn cut(text: &str, start: usize, max_bytes: usize) -> usize {
    let rest = &text[start..];

    let worst_case = rest
        .len()
        .saturating_mul(FAST_PATH_BYTES_PER_UNIT)
        .saturating_add(QUOTE_OVERHEAD);
    if worst_case <= max_bytes {
        return text.len();
    }

    let mut used = QUOTE_OVERHEAD;
    for (offset, c) in rest.char_indices() {
        used += escaped_char_len(c);
        if used > max_bytes {
            return start + offset;
        }
    }
    text.len()
}
