//! Random access to the content files of an EPUB.

use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use tracing::{debug, warn};
use zip::ZipArchive;

use super::parser::{parse_container_xml, parse_opf, resolve_href, strip_bom};
use crate::dom::Document;
use crate::error::{Error, Result};

/// Reading-order position of every spine document, keyed by archive path.
#[derive(Debug, Default, Clone)]
pub struct SpineIndex {
    positions: HashMap<String, usize>,
    repaired: HashMap<String, String>,
}

impl SpineIndex {
    /// Zero-based reading-order position of an archive path.
    pub fn position(&self, path: &str) -> Option<usize> {
        self.positions.get(path).copied()
    }

    /// Archive path found for a manifest href that does not exist as written.
    pub fn repaired(&self, href: &str) -> Option<&str> {
        self.repaired.get(href).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}

/// An opened EPUB.
pub struct EpubArchive<R = File> {
    archive: ZipArchive<R>,
    entries: Vec<String>,
    title: Option<String>,
    spine: SpineIndex,
}

impl EpubArchive<File> {
    /// Open an EPUB file from disk.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_reader(file)
    }
}

impl<R: Read + Seek> EpubArchive<R> {
    /// Read an EPUB from any [`Read`] + [`Seek`] source.
    pub fn from_reader(reader: R) -> Result<Self> {
        let mut archive = ZipArchive::new(reader)?;
        let entries: Vec<String> = archive.file_names().map(str::to_string).collect();

        let container = read_entry(&mut archive, "META-INF/container.xml")?;
        let opf_path = parse_container_xml(&container)?;
        let opf_dir = opf_path
            .rsplit_once('/')
            .map(|(dir, _)| dir.to_string())
            .unwrap_or_default();

        let opf_bytes = read_entry(&mut archive, &opf_path)?;
        let opf = parse_opf(&String::from_utf8(strip_bom(&opf_bytes).to_vec())?)?;

        let mut spine = SpineIndex::default();
        for (position, id) in opf.spine_ids.iter().enumerate() {
            let Some(item) = opf.manifest.get(id) else {
                warn!(idref = %id, "spine item missing from manifest");
                continue;
            };
            if !item.is_document() {
                continue;
            }

            let path = resolve_href(&opf_dir, &item.href);
            let path = if entries.contains(&path) {
                path
            } else {
                match repair_path(&entries, &path) {
                    Some(fixed) => {
                        debug!(href = %item.href, fixed = %fixed, "repaired manifest href");
                        spine.repaired.insert(item.href.clone(), fixed.clone());
                        spine.repaired.insert(path, fixed.clone());
                        fixed
                    }
                    None => {
                        warn!(href = %item.href, "manifest href not found in archive");
                        path
                    }
                }
            };
            spine.positions.insert(path, position);
        }

        Ok(Self {
            archive,
            entries,
            title: opf.title,
            spine,
        })
    }

    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    pub fn spine_index(&self) -> &SpineIndex {
        &self.spine
    }

    /// Find the archive path for a book-relative content path.
    ///
    /// Tries, in order: the path as given (and percent-decoded), the repair
    /// map, the path with `/` replaced by `!`, then a unique file-name match.
    pub fn resolve_content_path(&self, path: &str) -> Result<String> {
        let trimmed = path.trim_start_matches('/');
        let decoded = percent_encoding::percent_decode_str(trimmed)
            .decode_utf8_lossy()
            .into_owned();

        for candidate in [trimmed, decoded.as_str()] {
            if self.has_entry(candidate) {
                return Ok(candidate.to_string());
            }
            if let Some(fixed) = self.spine.repaired(candidate) {
                return Ok(fixed.to_string());
            }
        }

        let banged = trimmed.replace('/', "!");
        if self.has_entry(&banged) {
            return Ok(banged);
        }

        let name = file_name(&decoded);
        let mut matches = self.entries.iter().filter(|e| file_name(e) == name);
        if let (Some(only), None) = (matches.next(), matches.next()) {
            debug!(path, resolved = %only, "resolved content path by file name");
            return Ok(only.clone());
        }

        Err(Error::MissingContent(path.to_string()))
    }

    /// Raw bytes of a content file.
    pub fn read_bytes(&mut self, path: &str) -> Result<Vec<u8>> {
        let resolved = self.resolve_content_path(path)?;
        read_entry(&mut self.archive, &resolved)
    }

    /// Parse a content file.
    pub fn read_document(&mut self, path: &str) -> Result<Document> {
        let bytes = self.read_bytes(path)?;
        Ok(Document::parse(&bytes))
    }

    fn has_entry(&self, path: &str) -> bool {
        self.entries.iter().any(|e| e == path)
    }
}

/// Find an archive entry with the same file name as `path`.
///
/// With several candidates the first in archive order wins; the choice is
/// logged since it may be wrong.
fn repair_path(entries: &[String], path: &str) -> Option<String> {
    let name = file_name(path);
    let candidates: Vec<&String> = entries.iter().filter(|e| file_name(e) == name).collect();
    match candidates.as_slice() {
        [] => None,
        [only] => Some((*only).clone()),
        [first, ..] => {
            warn!(
                href = path,
                candidates = candidates.len(),
                chosen = %first,
                "ambiguous manifest href repair"
            );
            Some((*first).clone())
        }
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, path: &str) -> Result<Vec<u8>> {
    let mut file = match archive.by_name(path) {
        Ok(file) => file,
        Err(zip::result::ZipError::FileNotFound) => {
            return Err(Error::MissingContent(path.to_string()));
        }
        Err(e) => return Err(e.into()),
    };
    let mut contents = Vec::new();
    file.read_to_end(&mut contents)?;
    Ok(contents)
}
