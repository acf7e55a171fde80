//! # kobo2calibre
//!
//! Translate e-reader highlights between the two addressing schemes used by
//! Kobo devices and the calibre desktop viewer.
//!
//! A Kobo highlight names a position as a *device path*: the n-th significant
//! text node of the document body, the m-th sentence inside it, and a
//! character offset from the start of that sentence. calibre names the same
//! position with an EPUB CFI: a chain of child indices from the document
//! root plus a character offset into a text node.
//!
//! ## Features
//!
//! - Sentence tokenizer shared by both directions
//! - Device path and CFI decoding and encoding over an arena DOM
//! - Re-basing of offsets measured in `\uXXXX`-escaped text
//! - EPUB spine lookup with repair of stale content paths
//! - Batch sync with per-book parallelism and idempotent inserts
//!
//! ## Quick Start
//!
//! ```
//! use kobo2calibre::{DevicePath, Document, SentenceTokenizer, decode_device_path, encode_cfi};
//!
//! let dom = Document::parse_str("<html><body><p>Hello world. This is a test.</p></body></html>");
//! let body = dom.body().unwrap();
//! let tokenizer = SentenceTokenizer::default();
//!
//! let position = decode_device_path(&dom, body, DevicePath::new(1, 2), 0, &tokenizer).unwrap();
//! assert_eq!(position.offset, 13);
//! assert_eq!(encode_cfi(&dom, position).unwrap().to_string(), "/2/2/2/1:13");
//! ```

pub mod cfi;
pub mod config;
pub mod convert;
pub mod device;
pub mod device_path;
pub mod dom;
pub mod epub;
pub mod error;
pub mod highlight;
pub mod offset;
pub mod store;
pub mod sync;
pub mod tokenizer;
pub(crate) mod util;

pub use cfi::{Cfi, decode_cfi, encode_cfi};
pub use config::{Config, load_config};
pub use convert::{BookConversion, CalibreToKobo, DeviceAddress, KoboToCalibre, Translator};
pub use device::DeviceMetadata;
pub use device_path::{DevicePath, decode_device_path, encode_device_path};
pub use dom::{Document, NodeId, TextPosition};
pub use epub::EpubArchive;
pub use error::{Error, Result};
pub use highlight::{
    CalibreAnnotation, CalibreHighlight, KoboBookmark, KoboHighlight, calibre_color_to_kobo_color,
    kobo_color_to_calibre_color, stable_id,
};
pub use offset::rebase_offset;
pub use store::{
    CalibreStore, JsonCalibreStore, JsonKoboStore, KoboStore, SqliteCalibreStore, SqliteKoboStore,
};
pub use sync::{SyncOptions, SyncReport};
pub use tokenizer::{Bias, SentenceTokenizer};
