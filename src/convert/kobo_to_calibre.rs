use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{BookConversion, BookDocuments, Translator};
use crate::cfi::{Cfi, encode_cfi};
use crate::device_path::{DevicePath, decode_device_path};
use crate::dom::{Document, NodeId, TextPosition};
use crate::epub::EpubArchive;
use crate::error::{Error, Result};
use crate::highlight::{CalibreAnnotation, KoboHighlight, SpineRef, kobo_color_to_calibre_color};

/// Device highlights of one book into desktop annotation rows.
pub struct KoboToCalibre<'a> {
    translator: &'a Translator,
    book_id: i64,
    now: DateTime<Utc>,
}

impl<'a> KoboToCalibre<'a> {
    pub fn new(translator: &'a Translator, book_id: i64, now: DateTime<Utc>) -> Self {
        Self {
            translator,
            book_id,
            now,
        }
    }

    /// Translate every highlight of the book.
    pub fn convert_book<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        highlights: &[KoboHighlight],
    ) -> Result<BookConversion<CalibreAnnotation>> {
        let mut documents = BookDocuments::new(archive);
        let mut result = BookConversion::default();

        for highlight in highlights {
            match self.convert_one(&mut documents, highlight) {
                Ok(row) => result.rows.push(row),
                Err(e) if e.is_skippable() => {
                    warn!(
                        book = self.book_id,
                        content_path = %highlight.content_path,
                        start = %highlight.start_path,
                        end = %highlight.end_path,
                        start_offset = highlight.start_offset,
                        end_offset = highlight.end_offset,
                        error = %e,
                        "skipping device highlight"
                    );
                    result.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(result)
    }

    fn convert_one<R: Read + Seek>(
        &self,
        documents: &mut BookDocuments<'_, R>,
        highlight: &KoboHighlight,
    ) -> Result<CalibreAnnotation> {
        let loaded = documents.load(&highlight.content_path)?;
        let body = loaded
            .dom
            .body()
            .ok_or_else(|| Error::NoBody(loaded.path.clone()))?;
        let spine_index = loaded
            .spine_index
            .ok_or_else(|| Error::MissingContent(format!("{} is not in the spine", loaded.path)))?;

        let (start_cfi, end_cfi) = self.translator.kobo_to_cfi(loaded.dom, body, highlight)?;
        debug!(
            content_path = %loaded.path,
            start = %start_cfi,
            end = %end_cfi,
            "translated device highlight"
        );

        let color = highlight
            .color
            .map(kobo_color_to_calibre_color)
            .unwrap_or(self.translator.default_color.as_str());

        CalibreAnnotation::highlight(
            self.book_id,
            start_cfi.to_string(),
            end_cfi.to_string(),
            &highlight.text,
            SpineRef {
                index: spine_index,
                name: loaded.path,
            },
            color,
            self.now,
        )
    }
}

impl Translator {
    /// Start and end CFIs of a device highlight inside one content document.
    ///
    /// Each end is resolved on its own node with that node's own sentence
    /// split, so highlights spanning several tags need no running total.
    pub fn kobo_to_cfi(
        &self,
        dom: &Document,
        body: NodeId,
        highlight: &KoboHighlight,
    ) -> Result<(Cfi, Cfi)> {
        let start_path: DevicePath = highlight.start_path.parse()?;
        let end_path: DevicePath = highlight.end_path.parse()?;

        let start = self.device_position(dom, body, start_path, highlight.start_offset)?;
        let end = self.device_position(dom, body, end_path, highlight.end_offset)?;

        Ok((encode_cfi(dom, start)?, encode_cfi(dom, end)?))
    }

    fn device_position(
        &self,
        dom: &Document,
        body: NodeId,
        path: DevicePath,
        device_offset: usize,
    ) -> Result<TextPosition> {
        let sentence_start = decode_device_path(dom, body, path, 0, &self.tokenizer)?;
        let text = dom.text_content(sentence_start.node).unwrap_or_default();
        let offset = self.device_to_node(text, sentence_start.offset, device_offset);
        Ok(TextPosition::new(sentence_start.node, offset))
    }
}
