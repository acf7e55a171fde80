//! EPUB container access: package parsing, spine order, content files.

mod archive;
mod parser;

pub use archive::{EpubArchive, SpineIndex};
pub use parser::{ManifestItem, OpfData, normalize_path, parse_container_xml, parse_opf, resolve_href};
