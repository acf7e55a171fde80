use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{CalibreStore, InsertOutcome, group_annotations, read_snapshot, write_snapshot};
use crate::error::Result;
use crate::highlight::{CalibreAnnotation, CalibreHighlight};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibreBook {
    pub id: i64,
    /// Directory of the book, relative to the library root.
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

/// On-disk layout of the desktop store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CalibreSnapshot {
    #[serde(default)]
    pub books: Vec<CalibreBook>,
    #[serde(default)]
    pub annotations: Vec<CalibreAnnotation>,
}

/// Desktop store backed by a JSON snapshot of the books and annotations tables.
#[derive(Debug)]
pub struct JsonCalibreStore {
    path: PathBuf,
    snapshot: CalibreSnapshot,
    ids: HashSet<String>,
}

impl JsonCalibreStore {
    /// Conventional location inside a library.
    pub fn default_path(library: &Path) -> PathBuf {
        library.join("annotations.json")
    }

    pub fn open(path: &Path) -> Result<Self> {
        let snapshot: CalibreSnapshot = read_snapshot(path)?;
        debug!(
            path = %path.display(),
            books = snapshot.books.len(),
            annotations = snapshot.annotations.len(),
            "opened desktop store"
        );
        Ok(Self::from_snapshot(path, snapshot))
    }

    pub fn from_snapshot(path: &Path, snapshot: CalibreSnapshot) -> Self {
        let ids = snapshot
            .annotations
            .iter()
            .map(|a| a.annot_id.clone())
            .collect();
        Self {
            path: path.to_path_buf(),
            snapshot,
            ids,
        }
    }

    pub fn annotations(&self) -> &[CalibreAnnotation] {
        &self.snapshot.annotations
    }

    pub fn save(&self) -> Result<()> {
        write_snapshot(&self.path, &self.snapshot)
    }
}

impl CalibreStore for JsonCalibreStore {
    fn highlights_by_book(&self) -> BTreeMap<i64, Vec<CalibreHighlight>> {
        group_annotations(&self.snapshot.annotations)
    }

    fn book_path(&self, book_id: i64) -> Option<&str> {
        self.snapshot
            .books
            .iter()
            .find(|b| b.id == book_id)
            .map(|b| b.path.as_str())
    }

    fn contains_annotation(&self, annot_id: &str) -> bool {
        self.ids.contains(annot_id)
    }

    fn insert_annotations(&mut self, rows: Vec<CalibreAnnotation>) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        for row in rows {
            if !self.ids.insert(row.annot_id.clone()) {
                debug!(annot_id = %row.annot_id, book = row.book, "annotation already exists");
                outcome.duplicates += 1;
                continue;
            }
            self.snapshot.annotations.push(row);
            outcome.inserted += 1;
        }
        info!(inserted = outcome.inserted, duplicates = outcome.duplicates, "desktop store updated");
        Ok(outcome)
    }
}
