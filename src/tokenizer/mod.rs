//! Sentence segmentation matching the device's sentence numbering.
//!
//! The device numbers sentences inside each text node and stores offsets
//! relative to the start of a sentence, so desktop offsets can only be
//! recovered by splitting the node text exactly the way the device did.
//!
//! The rules are deterministic:
//!
//! - `.`, `!`, `?` (and `:` unless disabled) end a sentence; a run such as
//!   `...` or `?!` counts as one terminal.
//! - One closing quote or ellipsis may follow the terminal.
//! - The boundary only counts before whitespace or the end of the text, and
//!   the whitespace belongs to the sentence it follows.
//! - After a closing quote, a lower-case word continues the sentence
//!   (`“Where?” he asked.`).
//! - A period belonging to a known abbreviation never ends a sentence.
//! - A sentence opening `“` without closing it absorbs the next sentence when
//!   that one closes the quote.
//!
//! Concatenating the sentences always reproduces the input.
//!
//! ```
//! use kobo2calibre::tokenizer::SentenceTokenizer;
//!
//! let tokenizer = SentenceTokenizer::default();
//! assert_eq!(
//!     tokenizer.tokenize("Hello world. This is a test."),
//!     vec!["Hello world. ", "This is a test."]
//! );
//! assert_eq!(tokenizer.sentence_offset("Hello world. This is a test.", 2), 13);
//! ```

mod abbreviations;

pub use abbreviations::{ABBREVIATIONS, AbbreviationChecker};

use std::ops::Range;
use std::sync::LazyLock;

use regex_automata::{Input, meta::Regex};

use crate::config::TokenizerConfig;
use crate::util::char_len;

/// Characters that may directly follow a terminal and still belong to it.
const CLOSERS: &[char] = &['\'', '"', '\u{201c}', '\u{201d}', '\u{2018}', '\u{2019}', '\u{2026}'];

/// `CLOSERS` as a character class.
const CLOSER_CLASS: &str = "['\"\u{201c}\u{201d}\u{2018}\u{2019}\u{2026}]";

/// A terminal run, at most one closer, then whitespace or the end of the text.
static BOUNDARY: LazyLock<Regex> = LazyLock::new(|| boundary_regex("[.!?:]"));
static BOUNDARY_NO_COLON: LazyLock<Regex> = LazyLock::new(|| boundary_regex("[.!?]"));

fn boundary_regex(terminal: &str) -> Regex {
    Regex::new(&format!(r"{terminal}+{CLOSER_CLASS}?(?:\s+|$)"))
        .expect("sentence boundary pattern is valid")
}

const OPEN_DOUBLE: char = '\u{201c}';
const CLOSE_DOUBLE: char = '\u{201d}';

/// Which sentence owns an offset that falls exactly on a boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bias {
    /// The boundary starts the later sentence (highlight starts).
    Start,
    /// The boundary ends the earlier sentence (highlight ends).
    End,
}

/// Sentence splitter, constructed once and passed to the converters.
#[derive(Debug, Clone)]
pub struct SentenceTokenizer {
    split_on_colon: bool,
    abbreviations: AbbreviationChecker,
}

impl Default for SentenceTokenizer {
    fn default() -> Self {
        Self::new(true)
    }
}

impl SentenceTokenizer {
    pub fn new(split_on_colon: bool) -> Self {
        Self {
            split_on_colon,
            abbreviations: AbbreviationChecker::new(),
        }
    }

    pub fn from_config(config: &TokenizerConfig) -> Self {
        let mut tokenizer = Self::new(config.split_on_colon);
        tokenizer
            .abbreviations
            .extend(config.extra_abbreviations.iter());
        tokenizer
    }

    /// Split `text` into sentences with trailing whitespace attached.
    pub fn tokenize<'a>(&self, text: &'a str) -> Vec<&'a str> {
        merge_quotes(text, self.segment(text))
    }

    /// Byte spans of the sentences before quote merging.
    fn segment(&self, text: &str) -> Vec<Range<usize>> {
        let boundary = if self.split_on_colon {
            &*BOUNDARY
        } else {
            &*BOUNDARY_NO_COLON
        };

        let mut sentences = Vec::new();
        let mut start = 0;
        let mut from = 0;
        while let Some(m) = boundary.find(Input::new(text).range(from..)) {
            let terminal = m.start();
            if text[terminal..].starts_with('.') && self.ends_abbreviation(text, terminal) {
                from = terminal + 1;
                continue;
            }

            // "Where?” he asked." continues after the closing quote
            let closed = text[m.range()].trim_end().ends_with(CLOSERS);
            if closed && text[m.end()..].chars().next().is_some_and(char::is_lowercase) {
                from = m.end();
                continue;
            }

            sentences.push(start..m.end());
            start = m.end();
            from = m.end();
        }

        if start < text.len() {
            sentences.push(start..text.len());
        }
        sentences
    }

    /// Whether the period at byte `at` belongs to an abbreviation token.
    fn ends_abbreviation(&self, text: &str, at: usize) -> bool {
        let begin = text[..at]
            .char_indices()
            .rev()
            .find(|&(_, c)| c.is_whitespace())
            .map_or(0, |(i, c)| i + c.len_utf8());
        let end = text[at..]
            .find(char::is_whitespace)
            .map_or(text.len(), |i| at + i);
        self.abbreviations.is_abbreviation(&text[begin..end])
    }

    /// Length of the first `sentence_index - 1` sentences, in characters.
    ///
    /// Indices past the last sentence clamp to the end of the text; index 0
    /// and 1 both give 0.
    pub fn sentence_offset(&self, text: &str, sentence_index: usize) -> usize {
        self.tokenize(text)
            .iter()
            .take(sentence_index.saturating_sub(1))
            .map(|s| char_len(s))
            .sum()
    }

    /// Map a character offset in `text` to a 1-based sentence index and an
    /// offset inside that sentence.
    ///
    /// Offsets past the end stay in the last sentence. Text without sentences
    /// reports sentence 1.
    pub fn locate(&self, text: &str, offset: usize, bias: Bias) -> (usize, usize) {
        let sentences = self.tokenize(text);
        let mut before = 0;
        let mut last_start = 0;
        for (index, sentence) in sentences.iter().enumerate() {
            let end = before + char_len(sentence);
            let inside = match bias {
                Bias::Start => offset < end,
                Bias::End => offset <= end,
            };
            if inside {
                return (index + 1, offset.saturating_sub(before));
            }
            last_start = before;
            before = end;
        }

        if sentences.is_empty() {
            (1, offset)
        } else {
            (sentences.len(), offset - last_start)
        }
    }
}

/// Join an unterminated opening-quote sentence with the one that closes it.
///
/// Merges are pairwise: a merged sentence is never merged again.
fn merge_quotes(text: &str, spans: Vec<Range<usize>>) -> Vec<&str> {
    let mut merged = Vec::with_capacity(spans.len());
    let mut i = 0;
    while i < spans.len() {
        let current = &text[spans[i].clone()];
        if let Some(next_span) = spans.get(i + 1)
            && current.starts_with(OPEN_DOUBLE)
            && !current.contains(CLOSE_DOUBLE)
            && text[next_span.clone()].trim_end().ends_with(CLOSE_DOUBLE)
        {
            merged.push(&text[spans[i].start..next_span.end]);
            i += 2;
        } else {
            merged.push(current);
            i += 1;
        }
    }
    merged
}
