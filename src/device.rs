//! Book matching through the desktop's device metadata file.
//!
//! When the desktop library sends a book to the device it records the pairing
//! in `metadata.calibre` at the volume root: a JSON array with one object per
//! book, carrying at least the device-relative `lpath` and the library's
//! `application_id`.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Result;

/// One book entry of `metadata.calibre`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DeviceBook {
    pub lpath: String,
    pub application_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceMetadata {
    books: Vec<DeviceBook>,
}

impl DeviceMetadata {
    pub const FILE_NAME: &'static str = "metadata.calibre";

    /// Load `metadata.calibre` from a mounted device volume.
    pub fn load(volume: &Path) -> Result<Self> {
        let bytes = fs::read(volume.join(Self::FILE_NAME))?;
        Self::from_json(&bytes)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        // Entries without an lpath or id are not books we can match
        let raw: Vec<serde_json::Value> = serde_json::from_slice(bytes)?;
        let books = raw
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect();
        Ok(Self { books })
    }

    pub fn books(&self) -> &[DeviceBook] {
        &self.books
    }

    /// Library book id for a device volume id or lpath, matched on file name.
    pub fn book_id(&self, volume_id: &str) -> Option<i64> {
        let name = file_name(volume_id);
        self.books
            .iter()
            .find(|b| file_name(&b.lpath) == name)
            .map(|b| b.application_id)
    }

    /// Device-relative path of a library book.
    pub fn lpath(&self, book_id: i64) -> Option<&str> {
        self.books
            .iter()
            .find(|b| b.application_id == book_id)
            .map(|b| b.lpath.as_str())
    }
}

/// Device volume id of a book at `lpath`.
pub fn volume_id(device_prefix: &str, lpath: &str) -> String {
    format!(
        "{}/{}",
        device_prefix.trim_end_matches('/'),
        lpath.trim_start_matches('/')
    )
}

fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const METADATA: &str = r#"[
        {"lpath": "Doyle/A Study in Scarlet.kepub.epub", "application_id": 12, "title": "A Study"},
        {"lpath": "Austen/Emma.kepub.epub", "application_id": 7},
        {"title": "broken entry"}
    ]"#;

    #[test]
    fn test_match_by_file_name() {
        let meta = DeviceMetadata::from_json(METADATA.as_bytes()).unwrap();
        assert_eq!(meta.books().len(), 2);
        assert_eq!(
            meta.book_id("file:///mnt/onboard/Doyle/A Study in Scarlet.kepub.epub"),
            Some(12)
        );
        assert_eq!(meta.book_id("Emma.kepub.epub"), Some(7));
        assert_eq!(meta.book_id("file:///mnt/onboard/Other.kepub.epub"), None);
        assert_eq!(meta.lpath(7), Some("Austen/Emma.kepub.epub"));
        assert_eq!(meta.lpath(99), None);
    }

    #[test]
    fn test_volume_id() {
        assert_eq!(
            volume_id("file:///mnt/onboard/", "Austen/Emma.kepub.epub"),
            "file:///mnt/onboard/Austen/Emma.kepub.epub"
        );
        assert_eq!(volume_id("file:///mnt/onboard", "/a.epub"), "file:///mnt/onboard/a.epub");
    }

    #[test]
    fn test_load_from_volume() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DeviceMetadata::FILE_NAME), METADATA).unwrap();
        let meta = DeviceMetadata::load(dir.path()).unwrap();
        assert_eq!(meta.book_id("A Study in Scarlet.kepub.epub"), Some(12));
    }
}
