//! Per-book highlight translation in both directions.
//!
//! A conversion owns one opened book. Each content file is parsed the first
//! time a highlight needs it and reused for the rest of the book; the trees
//! are never mutated. Failures that only concern one highlight are logged
//! and counted, anything else aborts the book.

mod calibre_to_kobo;
mod kobo_to_calibre;

use std::collections::HashMap;
use std::io::{Read, Seek};

pub use calibre_to_kobo::{CalibreToKobo, DeviceAddress};
pub use kobo_to_calibre::KoboToCalibre;

use crate::config::Config;
use crate::dom::Document;
use crate::epub::EpubArchive;
use crate::error::{Error, Result};
use crate::offset::{escape_unicode, rebase_offset};
use crate::tokenizer::SentenceTokenizer;
use crate::util::{char_head, char_len, char_tail};

/// Settings shared by both directions.
#[derive(Debug, Clone)]
pub struct Translator {
    pub tokenizer: SentenceTokenizer,
    /// Device offsets count characters of `\uXXXX`-escaped text.
    pub escaped_offsets: bool,
    /// Desktop color for device highlights without one.
    pub default_color: String,
}

impl Default for Translator {
    fn default() -> Self {
        Self {
            tokenizer: SentenceTokenizer::default(),
            escaped_offsets: false,
            default_color: "yellow".into(),
        }
    }
}

impl Translator {
    pub fn from_config(config: &Config) -> Self {
        Self {
            tokenizer: SentenceTokenizer::from_config(&config.tokenizer),
            escaped_offsets: config.offsets.escaped,
            default_color: config.default_color.clone(),
        }
    }

    /// Node offset of a device offset counted from `sentence_start`.
    fn device_to_node(&self, text: &str, sentence_start: usize, device_offset: usize) -> usize {
        if !self.escaped_offsets {
            return sentence_start + device_offset;
        }
        let escaped = escape_unicode(char_tail(text, sentence_start));
        sentence_start + rebase_offset(&escaped, device_offset)
    }

    /// Device offset of the node range `sentence_start..sentence_start + within`.
    fn node_to_device(&self, text: &str, sentence_start: usize, within: usize) -> usize {
        if !self.escaped_offsets {
            return within;
        }
        let prefix = char_head(char_tail(text, sentence_start), within);
        char_len(&escape_unicode(prefix))
    }
}

/// Rows produced for one book.
#[derive(Debug, Clone)]
pub struct BookConversion<T> {
    pub rows: Vec<T>,
    /// Highlights skipped because they could not be translated.
    pub failed: usize,
}

impl<T> Default for BookConversion<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            failed: 0,
        }
    }
}

/// A content document loaded for translation.
struct Loaded<'d> {
    path: String,
    spine_index: Option<usize>,
    dom: &'d Document,
}

/// Parsed content documents of one book.
struct BookDocuments<'a, R> {
    archive: &'a mut EpubArchive<R>,
    parsed: HashMap<String, Document>,
}

impl<'a, R: Read + Seek> BookDocuments<'a, R> {
    fn new(archive: &'a mut EpubArchive<R>) -> Self {
        Self {
            archive,
            parsed: HashMap::new(),
        }
    }

    fn load(&mut self, content_path: &str) -> Result<Loaded<'_>> {
        let path = self.archive.resolve_content_path(content_path)?;
        if !self.parsed.contains_key(&path) {
            let dom = self.archive.read_document(&path)?;
            self.parsed.insert(path.clone(), dom);
        }
        let spine_index = self.archive.spine_index().position(&path);
        let dom = self
            .parsed
            .get(&path)
            .ok_or_else(|| Error::MissingContent(path.clone()))?;
        Ok(Loaded {
            path,
            spine_index,
            dom,
        })
    }
}
