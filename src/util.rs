//! Text decoding and character-offset helpers.
//!
//! All offsets exchanged with the two annotation stores count Unicode scalar
//! values, never bytes, so the helpers here translate between the two.

use std::borrow::Cow;

/// Decode bytes to a string, handling various encodings.
///
/// This function:
/// 1. First tries UTF-8 (handles BOM automatically via encoding_rs)
/// 2. If malformed, tries the hint encoding (from `<?xml encoding="..."?>`)
/// 3. Falls back to Windows-1252 (common in old ebooks)
pub fn decode_text<'a>(bytes: &'a [u8], hint_encoding: Option<&str>) -> Cow<'a, str> {
    let (result, _encoding, malformed) = encoding_rs::UTF_8.decode(bytes);

    if !malformed {
        return result;
    }

    if let Some(name) = hint_encoding
        && let Some(encoding) = encoding_rs::Encoding::for_label(name.as_bytes())
    {
        let (result, _, _) = encoding.decode(bytes);
        return result;
    }

    let (result, _, _) = encoding_rs::WINDOWS_1252.decode(bytes);
    result
}

/// Extract the encoding name from an XML declaration, if any.
///
/// Only the first 100 bytes are inspected.
pub fn extract_xml_encoding(bytes: &[u8]) -> Option<&str> {
    let check_len = bytes.len().min(100);
    let prefix = &bytes[..check_len];

    let xml_start = prefix.windows(5).position(|w| w == b"<?xml")?;
    let after_xml = &prefix[xml_start..];

    let enc_pos = after_xml
        .windows(9)
        .position(|w| w.eq_ignore_ascii_case(b"encoding="))?;
    let after_enc = &after_xml[enc_pos + 9..];

    if after_enc.is_empty() {
        return None;
    }

    let quote = after_enc[0];
    if quote != b'"' && quote != b'\'' {
        return None;
    }

    let value_end = after_enc[1..].iter().position(|&b| b == quote)? + 1;
    std::str::from_utf8(&after_enc[1..value_end]).ok()
}

/// Normalize `\r\n` and lone `\r` line endings to `\n`.
///
/// Device offsets were computed over text read with universal newlines, so
/// content documents must be normalized before any offset arithmetic.
pub fn normalize_newlines(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Number of Unicode scalar values in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte index of the `char_index`-th character, clamped to the end of `text`.
pub fn byte_offset(text: &str, char_index: usize) -> usize {
    text.char_indices()
        .nth(char_index)
        .map(|(i, _)| i)
        .unwrap_or(text.len())
}

/// The suffix of `text` starting at character `char_index`.
pub fn char_tail(text: &str, char_index: usize) -> &str {
    &text[byte_offset(text, char_index)..]
}

/// The prefix of `text` holding its first `char_count` characters.
pub fn char_head(text: &str, char_count: usize) -> &str {
    &text[..byte_offset(text, char_count)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_xml_encoding() {
        let xml = br#"<?xml version="1.0" encoding="windows-1252"?><html/>"#;
        assert_eq!(extract_xml_encoding(xml), Some("windows-1252"));

        let single = b"<?xml version='1.0' encoding='UTF-8'?>";
        assert_eq!(extract_xml_encoding(single), Some("UTF-8"));

        assert_eq!(extract_xml_encoding(b"<html></html>"), None);
    }

    #[test]
    fn test_decode_text_fallback() {
        // 0x92 is a right single quote in Windows-1252 and invalid UTF-8
        let bytes = b"It\x92s";
        assert_eq!(decode_text(bytes, None), "It\u{2019}s");
        assert_eq!(decode_text("plain".as_bytes(), None), "plain");
    }

    #[test]
    fn test_normalize_newlines() {
        assert_eq!(normalize_newlines("a\r\nb\rc\n"), "a\nb\nc\n");
        assert!(matches!(normalize_newlines("a\nb"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_char_helpers() {
        let text = "Привет, world";
        assert_eq!(char_len(text), 13);
        assert_eq!(char_head(text, 6), "Привет");
        assert_eq!(char_tail(text, 8), "world");
        assert_eq!(char_tail(text, 100), "");
        assert_eq!(byte_offset(text, 1), 2);
    }
}
