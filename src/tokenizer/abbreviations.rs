//! Abbreviations whose trailing period never ends a sentence.

use std::collections::HashSet;

/// Built-in abbreviations, lower-cased, including their final period.
pub const ABBREVIATIONS: &[&str] = &[
    "e.g.", "i.e.", "etc.", "vs.", "cf.", "viz.", "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.",
    "jr.", "st.", "a.m.", "p.m.", "u.s.", "u.k.",
];

/// Characters stripped from the front of a token before lookup.
const OPENERS: &[char] = &['(', '[', '{', '"', '\'', '\u{201c}', '\u{2018}'];

/// Characters stripped from the back of a token before lookup.
const TRAILERS: &[char] = &[
    ',', ';', ':', ')', ']', '}', '"', '\'', '\u{201d}', '\u{2019}',
];

/// Case-insensitive abbreviation lookup.
#[derive(Debug, Clone)]
pub struct AbbreviationChecker {
    abbreviations: HashSet<String>,
}

impl AbbreviationChecker {
    pub fn new() -> Self {
        Self {
            abbreviations: ABBREVIATIONS.iter().map(|a| a.to_string()).collect(),
        }
    }

    /// Add abbreviations on top of the built-in set.
    pub fn extend<I, S>(&mut self, extra: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for abbr in extra {
            let abbr = abbr.as_ref().trim().to_lowercase();
            if abbr.is_empty() {
                continue;
            }
            if abbr.ends_with('.') {
                self.abbreviations.insert(abbr);
            } else {
                self.abbreviations.insert(format!("{abbr}."));
            }
        }
    }

    /// Check a whitespace-delimited token, ignoring surrounding brackets and quotes.
    pub fn is_abbreviation(&self, token: &str) -> bool {
        let clean = token
            .trim_start_matches(OPENERS)
            .trim_end_matches(TRAILERS);
        !clean.is_empty() && self.abbreviations.contains(&clean.to_lowercase())
    }
}

impl Default for AbbreviationChecker {
    fn default() -> Self {
        Self::new()
    }
}
