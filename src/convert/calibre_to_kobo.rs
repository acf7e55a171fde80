use std::fmt;
use std::io::{Read, Seek};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::{BookConversion, BookDocuments, Translator};
use crate::cfi::{Cfi, resolve};
use crate::device_path::{DevicePath, encode_device_path};
use crate::dom::{Document, NodeId};
use crate::epub::EpubArchive;
use crate::error::{Error, Result};
use crate::highlight::{CalibreHighlight, DeviceRange, KoboBookmark, calibre_color_to_kobo_color};
use crate::tokenizer::Bias;

/// One end of a highlight as the device stores it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress {
    pub path: DevicePath,
    /// Offset counted from the start of the addressed sentence.
    pub offset: usize,
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.offset)
    }
}

/// Desktop highlights of one book into device Bookmark rows.
pub struct CalibreToKobo<'a> {
    translator: &'a Translator,
    volume_id: &'a str,
    now: DateTime<Utc>,
}

impl<'a> CalibreToKobo<'a> {
    pub fn new(translator: &'a Translator, volume_id: &'a str, now: DateTime<Utc>) -> Self {
        Self {
            translator,
            volume_id,
            now,
        }
    }

    /// Translate every highlight of the book.
    pub fn convert_book<R: Read + Seek>(
        &self,
        archive: &mut EpubArchive<R>,
        highlights: &[CalibreHighlight],
    ) -> Result<BookConversion<KoboBookmark>> {
        let mut documents = BookDocuments::new(archive);
        let mut result = BookConversion::default();

        for highlight in highlights {
            match self.convert_one(&mut documents, highlight) {
                Ok(row) => result.rows.push(row),
                Err(e) if e.is_skippable() => {
                    warn!(
                        volume = %self.volume_id,
                        spine_name = %highlight.spine_name,
                        start = %highlight.start_cfi,
                        end = %highlight.end_cfi,
                        error = %e,
                        "skipping desktop highlight"
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
        highlight: &CalibreHighlight,
    ) -> Result<KoboBookmark> {
        let start_cfi: Cfi = highlight.start_cfi.parse()?;
        let end_cfi: Cfi = highlight.end_cfi.parse()?;

        let loaded = documents.load(&highlight.spine_name)?;
        let body = loaded
            .dom
            .body()
            .ok_or_else(|| Error::NoBody(loaded.path.clone()))?;

        let start = self
            .translator
            .cfi_to_device(loaded.dom, body, &start_cfi, &highlight.start_cfi, Bias::Start)?;
        let end = self
            .translator
            .cfi_to_device(loaded.dom, body, &end_cfi, &highlight.end_cfi, Bias::End)?;
        debug!(content_path = %loaded.path, %start, %end, "translated desktop highlight");

        let (start_key, end_key) = (start_cfi.to_string(), end_cfi.to_string());
        Ok(KoboBookmark::highlight(
            self.volume_id,
            &loaded.path,
            DeviceRange {
                start_path: start.path.to_string(),
                start_offset: start.offset,
                end_path: end.path.to_string(),
                end_offset: end.offset,
            },
            &highlight.highlighted_text,
            (&start_key, &end_key),
            calibre_color_to_kobo_color(&highlight.color),
            self.now,
        ))
    }
}

impl Translator {
    /// Device address of one end of a desktop highlight.
    ///
    /// `source` is the CFI as written, used in error messages.
    pub fn cfi_to_device(
        &self,
        dom: &Document,
        body: NodeId,
        cfi: &Cfi,
        source: &str,
        bias: Bias,
    ) -> Result<DeviceAddress> {
        let position = resolve(dom, cfi, source)?;
        let (path, within) = encode_device_path(dom, body, position, bias, &self.tokenizer)?;

        let text = dom.text_content(position.node).unwrap_or_default();
        let sentence_start = position.offset.saturating_sub(within);
        Ok(DeviceAddress {
            path,
            offset: self.node_to_device(text, sentence_start, within),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::parse_xhtml;

    const CHAPTER: &str = "<html><head><title>t</title></head><body>\n\
        <p>Hello world. This is a test.</p>\n\
        <p>Second <em>para</em>graph here.</p>\n\
        </body></html>";

    fn address(t: &Translator, cfi: &str, bias: Bias) -> Result<DeviceAddress> {
        let dom = parse_xhtml(CHAPTER).unwrap();
        let body = dom.body().unwrap();
        let parsed: Cfi = cfi.parse()?;
        t.cfi_to_device(&dom, body, &parsed, cfi, bias)
    }

    #[test]
    fn test_offset_inside_second_sentence() {
        let t = Translator::default();
        let a = address(&t, "/2/4/2/1:17", Bias::End).unwrap();
        assert_eq!(a.path, DevicePath::new(1, 2));
        assert_eq!(a.offset, 4);
        assert_eq!(a.to_string(), r"span#kobo\.1\.2@4");
    }

    #[test]
    fn test_boundary_bias() {
        let t = Translator::default();
        // offset 13 is the start of "This is a test."
        let start = address(&t, "/2/4/2/1:13", Bias::Start).unwrap();
        assert_eq!((start.path, start.offset), (DevicePath::new(1, 2), 0));

        let end = address(&t, "/2/4/2/1:13", Bias::End).unwrap();
        assert_eq!((end.path, end.offset), (DevicePath::new(1, 1), 13));
    }

    #[test]
    fn test_inline_element_text() {
        let t = Translator::default();
        let a = address(&t, "/2/4/4/2/1:2", Bias::Start).unwrap();
        assert_eq!((a.path, a.offset), (DevicePath::new(3, 1), 2));
    }

    #[test]
    fn test_epubcfi_wrapper_and_assertions() {
        let t = Translator::default();
        let a = address(&t, "epubcfi(/6/4!/2/4[body01]/2/1:6)", Bias::Start).unwrap();
        assert_eq!((a.path, a.offset), (DevicePath::new(1, 1), 6));
    }

    #[test]
    fn test_bad_targets_are_skippable() {
        let t = Translator::default();
        for cfi in ["/2/4/8/1:0", "/2/4/4/2:0", "/2/4/3/1:0", "not a cfi"] {
            let err = address(&t, cfi, Bias::Start).unwrap_err();
            assert!(err.is_skippable(), "{cfi}: {err}");
        }
    }
}
