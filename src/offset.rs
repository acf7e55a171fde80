//! Offsets measured in `\uXXXX`-escaped text.
//!
//! Some device databases store highlight text with every non-ASCII code point
//! written as a backslash escape, and measure offsets in that representation.
//! [`rebase_offset`] converts such an offset to a count of decoded code points.

use std::fmt::Write;

/// Result of reading one backslash escape.
enum Escape {
    /// A complete escape spanning `consumed` escaped characters that decodes
    /// to `decoded` code points.
    Complete { consumed: usize, decoded: usize },
    /// The prefix ends inside the escape.
    Truncated,
    /// Not a recognised escape; the backslash stands for itself.
    Literal,
}

/// Convert an offset into escaped text to an offset into the decoded text.
///
/// `escaped_offset` counts characters of `escaped`. An escape cut off by the
/// offset (`\u04` at the boundary) is not decodable yet and contributes
/// nothing. A UTF-16 surrogate pair written as two escapes counts as one
/// code point.
///
/// ```
/// use kobo2calibre::offset::rebase_offset;
///
/// let escaped = r"\u041e\u043d said";
/// assert_eq!(rebase_offset(escaped, 6), 1);
/// assert_eq!(rebase_offset(escaped, 9), 1);
/// assert_eq!(rebase_offset(escaped, 13), 3);
/// ```
pub fn rebase_offset(escaped: &str, escaped_offset: usize) -> usize {
    let prefix: Vec<char> = escaped.chars().take(escaped_offset).collect();
    let mut decoded = 0;
    let mut i = 0;

    while i < prefix.len() {
        if prefix[i] != '\\' {
            decoded += 1;
            i += 1;
            continue;
        }
        match read_escape(&prefix[i..]) {
            Escape::Complete {
                consumed,
                decoded: n,
            } => {
                decoded += n;
                i += consumed;
            }
            Escape::Truncated => break,
            Escape::Literal => {
                decoded += 1;
                i += 1;
            }
        }
    }

    decoded
}

/// Number of code points `escaped` decodes to.
pub fn decoded_len(escaped: &str) -> usize {
    rebase_offset(escaped, escaped.chars().count())
}

/// Escape `text` the way the device stores it: backslashes doubled and every
/// non-ASCII code point as `\uXXXX` (astral code points as surrogate pairs).
pub fn escape_unicode(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\\' {
            out.push_str("\\\\");
        } else if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                let _ = write!(out, "\\u{unit:04x}");
            }
        }
    }
    out
}

fn read_escape(s: &[char]) -> Escape {
    let Some(&kind) = s.get(1) else {
        return Escape::Truncated;
    };
    match kind {
        'u' => match read_hex(&s[2..], 4) {
            Hex::Value(high) if (0xd800..0xdc00).contains(&high) => read_low_surrogate(&s[6..]),
            Hex::Value(_) => Escape::Complete {
                consumed: 6,
                decoded: 1,
            },
            Hex::Truncated => Escape::Truncated,
            Hex::Invalid => Escape::Literal,
        },
        'U' => hex_escape(&s[2..], 8),
        'x' => hex_escape(&s[2..], 2),
        '\\' | '\'' | '"' | 'n' | 't' | 'r' | 'a' | 'b' | 'f' | 'v' => Escape::Complete {
            consumed: 2,
            decoded: 1,
        },
        // escaped line continuation
        '\n' => Escape::Complete {
            consumed: 2,
            decoded: 0,
        },
        _ => Escape::Literal,
    }
}

/// Finish a surrogate pair whose high half occupied the previous six characters.
fn read_low_surrogate(rest: &[char]) -> Escape {
    let lone_high = Escape::Complete {
        consumed: 6,
        decoded: 1,
    };
    if rest.is_empty() {
        return Escape::Truncated;
    }
    if rest[0] != '\\' {
        return lone_high;
    }
    match rest.get(1) {
        None => Escape::Truncated,
        Some('u') => match read_hex(&rest[2..], 4) {
            Hex::Value(low) if (0xdc00..0xe000).contains(&low) => Escape::Complete {
                consumed: 12,
                decoded: 1,
            },
            Hex::Truncated => Escape::Truncated,
            _ => lone_high,
        },
        Some(_) => lone_high,
    }
}

fn hex_escape(digits: &[char], width: usize) -> Escape {
    match read_hex(digits, width) {
        Hex::Value(_) => Escape::Complete {
            consumed: 2 + width,
            decoded: 1,
        },
        Hex::Truncated => Escape::Truncated,
        Hex::Invalid => Escape::Literal,
    }
}

enum Hex {
    Value(u32),
    Truncated,
    Invalid,
}

fn read_hex(digits: &[char], width: usize) -> Hex {
    let mut value = 0u32;
    for i in 0..width {
        let Some(&c) = digits.get(i) else {
            return Hex::Truncated;
        };
        let Some(d) = c.to_digit(16) else {
            return Hex::Invalid;
        };
        value = value.wrapping_mul(16).wrapping_add(d);
    }
    Hex::Value(value)
}
