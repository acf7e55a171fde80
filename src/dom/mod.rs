//! Content document trees.
//!
//! A [`Document`] is parsed once per content file and then only read. XHTML
//! goes through a structure-preserving XML parser; anything that is not
//! well-formed falls back to the html5ever tree builder.
//!
//! ```
//! use kobo2calibre::dom::{Document, significant_text_nodes};
//!
//! let dom = Document::parse(b"<html><body><p>Hello world.</p></body></html>");
//! let body = dom.body().unwrap();
//! let first = significant_text_nodes(&dom, body).next().unwrap();
//! assert_eq!(dom.text_content(first), Some("Hello world."));
//! ```

mod arena;
mod tree_sink;
mod walk;
mod xml;

pub use arena::{Attribute, Children, Document, Node, NodeData, NodeId};
pub use walk::{
    SignificantTextNodes, addressable_children, ancestors, element_children, is_significant_text,
    significant_text_nodes,
};
pub use xml::parse_xhtml;

use html5ever::driver::ParseOpts;
use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use tracing::debug;

use crate::util::{decode_text, extract_xml_encoding, normalize_newlines};
use tree_sink::DocumentSink;

/// A character offset inside a text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextPosition {
    pub node: NodeId,
    /// Offset in Unicode scalar values.
    pub offset: usize,
}

impl TextPosition {
    pub fn new(node: NodeId, offset: usize) -> Self {
        Self { node, offset }
    }
}

/// Parse HTML with the html5ever tree builder.
pub fn parse_html(html: &str) -> Document {
    let sink = DocumentSink::new();
    parse_document(sink, ParseOpts::default())
        .from_utf8()
        .one(html.as_bytes())
        .into_document()
}

impl Document {
    /// Parse content-file bytes.
    ///
    /// Decodes with the XML declaration's encoding hint, normalizes line
    /// endings, then tries the XHTML parser before falling back to HTML.
    pub fn parse(bytes: &[u8]) -> Document {
        let text = decode_text(bytes, extract_xml_encoding(bytes));
        Self::parse_str(&text)
    }

    /// Parse already-decoded markup.
    pub fn parse_str(markup: &str) -> Document {
        let markup = normalize_newlines(markup);
        match parse_xhtml(&markup) {
            Ok(dom) => dom,
            Err(e) => {
                debug!(error = %e, "markup is not well-formed XML, parsing as HTML");
                parse_html(&markup)
            }
        }
    }
}
