//! Error types for highlight translation.

use thiserror::Error;

use crate::dom::NodeId;

/// Errors that can occur while reading books, stores, or translating addresses.
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("XML parsing error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("content file not found in book: {0}")]
    MissingContent(String),

    #[error("document has no <body> element: {0}")]
    NoBody(String),

    #[error("malformed device path {path:?}: {reason}")]
    MalformedDevicePath { path: String, reason: String },

    #[error("tag #{tag_index} not found, document has {available} significant text nodes")]
    NodeNotFound { tag_index: usize, available: usize },

    #[error("malformed CFI {cfi:?}: {reason}")]
    MalformedCfi { cfi: String, reason: String },

    #[error("CFI {cfi:?} step {step} selects child #{index}, but only {available} exist")]
    StepOutOfRange {
        cfi: String,
        step: usize,
        index: usize,
        available: usize,
    },

    #[error("CFI {cfi:?} terminal child #{index} is not a text node")]
    MalformedTarget { cfi: String, index: usize },

    #[error("text node is not addressable by a device path")]
    NotSignificant,

    #[error("node {0:?} has no addressable position in its document")]
    Unaddressable(NodeId),

    /// No counterpart in the other store; the whole book is skipped.
    #[error("book not matched: {0}")]
    BookNotMatched(String),

    #[error("store error: {0}")]
    Store(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("cannot start worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

impl Error {
    /// Whether this failure only affects a single highlight or content file.
    ///
    /// Skippable errors are logged and the batch continues; everything else
    /// aborts the current book (or the run, for store failures).
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            Error::MalformedDevicePath { .. }
                | Error::NodeNotFound { .. }
                | Error::MalformedCfi { .. }
                | Error::StepOutOfRange { .. }
                | Error::MalformedTarget { .. }
                | Error::NotSignificant
                | Error::Unaddressable(_)
                | Error::MissingContent(_)
                | Error::NoBody(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
