//! Device-side highlight addresses.
//!
//! The device wraps every sentence of every significant text node in a
//! `<span id="kobo.T.S">` when it renders a book, and stores highlight
//! boundaries as a CSS selector for that span (`span#kobo\.T\.S`) plus an
//! offset from the start of the sentence. Both counters are 1-based and run
//! over [`significant_text_nodes`] in document order.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use crate::dom::{Document, NodeId, TextPosition, significant_text_nodes};
use crate::error::{Error, Result};
use crate::tokenizer::{Bias, SentenceTokenizer};

/// A `(tag, sentence)` pair, both 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DevicePath {
    pub tag: usize,
    pub sentence: usize,
}

impl DevicePath {
    pub fn new(tag: usize, sentence: usize) -> Self {
        Self { tag, sentence }
    }
}

impl fmt::Display for DevicePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "span#kobo\\.{}\\.{}", self.tag, self.sentence)
    }
}

impl FromStr for DevicePath {
    type Err = Error;

    /// Accepts `span#kobo\.12\.3`, `kobo.12.3`, `12.3` and `(12/3)`.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = |reason: &str| Error::MalformedDevicePath {
            path: s.to_string(),
            reason: reason.to_string(),
        };

        let trimmed = s.trim();
        let (tag, sentence) = if let Some(inner) = trimmed
            .strip_prefix('(')
            .and_then(|rest| rest.strip_suffix(')'))
        {
            inner
                .split_once('/')
                .ok_or_else(|| malformed("expected (tag/sentence)"))?
        } else {
            let body = trimmed.strip_prefix("span#").unwrap_or(trimmed);
            let body = body.strip_prefix("kobo").unwrap_or(body);
            let body = body.replace("\\.", ".");
            let body = body.strip_prefix('.').unwrap_or(&body).to_string();
            let mut parts = body.split('.');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(tag), Some(sentence), None) => {
                    return parse_pair(tag, sentence).map_err(|reason| malformed(reason));
                }
                _ => return Err(malformed("expected two dot-separated indices")),
            }
        };

        parse_pair(tag, sentence).map_err(|reason| malformed(reason))
    }
}

fn parse_pair(tag: &str, sentence: &str) -> std::result::Result<DevicePath, &'static str> {
    let tag: usize = tag.trim().parse().map_err(|_| "tag index is not a number")?;
    let sentence: usize = sentence
        .trim()
        .parse()
        .map_err(|_| "sentence index is not a number")?;
    if tag == 0 || sentence == 0 {
        return Err("indices are 1-based");
    }
    Ok(DevicePath { tag, sentence })
}

/// Resolve a device path to a text node and an offset inside it.
///
/// The offset is `base_offset` plus the length of every sentence before
/// `path.sentence`; sentence indices past the end of the node clamp to the
/// node's end. Fails with [`Error::NodeNotFound`] when `path.tag` exceeds the
/// number of significant text nodes under `root`.
pub fn decode_device_path(
    dom: &Document,
    root: NodeId,
    path: DevicePath,
    base_offset: usize,
    tokenizer: &SentenceTokenizer,
) -> Result<TextPosition> {
    let mut available = 0;
    let found = if path.tag == 0 {
        None
    } else {
        significant_text_nodes(dom, root)
            .inspect(|_| available += 1)
            .nth(path.tag - 1)
    };

    let Some(node) = found else {
        let available = if path.tag == 0 {
            significant_text_nodes(dom, root).count()
        } else {
            available
        };
        return Err(Error::NodeNotFound {
            tag_index: path.tag,
            available,
        });
    };

    let text = dom.text_content(node).unwrap_or_default();
    let offset = base_offset + tokenizer.sentence_offset(text, path.sentence);
    trace!(tag = path.tag, sentence = path.sentence, offset, "decoded device path");
    Ok(TextPosition::new(node, offset))
}

/// Express a text position as a device path plus an offset inside the
/// addressed sentence.
///
/// `bias` decides whether an offset on a sentence boundary belongs to the
/// following sentence (highlight starts) or the preceding one (ends). Fails
/// with [`Error::NotSignificant`] for text the device does not number.
pub fn encode_device_path(
    dom: &Document,
    root: NodeId,
    position: TextPosition,
    bias: Bias,
    tokenizer: &SentenceTokenizer,
) -> Result<(DevicePath, usize)> {
    let tag = significant_text_nodes(dom, root)
        .position(|node| node == position.node)
        .ok_or(Error::NotSignificant)?
        + 1;

    let text = dom.text_content(position.node).unwrap_or_default();
    let (sentence, offset) = tokenizer.locate(text, position.offset, bias);
    Ok((DevicePath { tag, sentence }, offset))
}
