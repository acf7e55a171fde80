//! Highlight stores on both sides.
//!
//! The converters only see the [`KoboStore`] and [`CalibreStore`] traits.
//! [`SqliteKoboStore`] and [`SqliteCalibreStore`] work on the device's
//! `KoboReader.sqlite` and the library's `metadata.db` and commit every
//! insert batch. The JSON stores keep a snapshot of the same tables in memory
//! and write it back atomically on [`JsonKoboStore::save`] /
//! [`JsonCalibreStore::save`].

mod calibre;
mod kobo;
mod sqlite;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use calibre::{CalibreBook, CalibreSnapshot, JsonCalibreStore};
pub use kobo::{JsonKoboStore, KoboSnapshot};
pub use sqlite::{SqliteCalibreStore, SqliteKoboStore};

use crate::error::{Error, Result};
use crate::highlight::{CalibreAnnotation, CalibreHighlight, KoboBookmark, KoboHighlight};

/// Counts from an insert-if-absent batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted: usize,
    pub duplicates: usize,
}

impl std::ops::AddAssign for InsertOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
    }
}

/// Device-side store of Bookmark rows.
pub trait KoboStore {
    /// Text highlights grouped by volume id.
    fn highlights_by_volume(&self) -> BTreeMap<String, Vec<KoboHighlight>>;

    fn contains_bookmark(&self, bookmark_id: &str) -> bool;

    /// Insert rows whose BookmarkID is not present yet.
    fn insert_bookmarks(&mut self, rows: Vec<KoboBookmark>) -> Result<InsertOutcome>;
}

/// Desktop-side store of books and annotations.
pub trait CalibreStore {
    /// Live text highlights grouped by book id.
    fn highlights_by_book(&self) -> BTreeMap<i64, Vec<CalibreHighlight>>;

    /// Library-relative directory of a book.
    fn book_path(&self, book_id: i64) -> Option<&str>;

    fn contains_annotation(&self, annot_id: &str) -> bool;

    /// Insert rows whose `annot_id` is not present yet.
    fn insert_annotations(&mut self, rows: Vec<CalibreAnnotation>) -> Result<InsertOutcome>;
}

/// Device rows grouped by volume. A volume whose rows are all non-highlights
/// still gets an empty entry.
fn group_bookmarks(rows: &[KoboBookmark]) -> BTreeMap<String, Vec<KoboHighlight>> {
    let mut result: BTreeMap<String, Vec<KoboHighlight>> = BTreeMap::new();
    for row in rows {
        let highlights = result.entry(row.volume_id.clone()).or_default();
        if let Some(highlight) = row.to_highlight() {
            highlights.push(highlight);
        }
    }
    result
}

fn group_annotations(rows: &[CalibreAnnotation]) -> BTreeMap<i64, Vec<CalibreHighlight>> {
    let mut result: BTreeMap<i64, Vec<CalibreHighlight>> = BTreeMap::new();
    for row in rows {
        if let Some(highlight) = row.to_highlight() {
            result.entry(row.book).or_default().push(highlight);
        }
    }
    result
}

fn read_snapshot<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = fs::read(path)
        .map_err(|e| Error::Store(format!("cannot open {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Store(format!("cannot parse {}: {e}", path.display())))
}

/// Write through a sibling temp file so a crash never leaves half a store.
fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json = serde_json::to_vec_pretty(value)?;
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}
