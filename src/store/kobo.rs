use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{InsertOutcome, KoboStore, group_bookmarks, read_snapshot, write_snapshot};
use crate::error::Result;
use crate::highlight::{KoboBookmark, KoboHighlight};

/// On-disk layout of the device store.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KoboSnapshot {
    #[serde(rename = "Bookmark", default)]
    pub bookmarks: Vec<KoboBookmark>,
}

/// Device store backed by a JSON snapshot of the Bookmark table.
#[derive(Debug)]
pub struct JsonKoboStore {
    path: PathBuf,
    snapshot: KoboSnapshot,
    ids: HashSet<String>,
}

impl JsonKoboStore {
    /// Conventional location inside a mounted volume.
    pub fn default_path(volume: &Path) -> PathBuf {
        volume.join(".kobo").join("bookmarks.json")
    }

    pub fn open(path: &Path) -> Result<Self> {
        let snapshot: KoboSnapshot = read_snapshot(path)?;
        debug!(path = %path.display(), rows = snapshot.bookmarks.len(), "opened device store");
        Ok(Self::from_snapshot(path, snapshot))
    }

    pub fn from_snapshot(path: &Path, snapshot: KoboSnapshot) -> Self {
        let ids = snapshot
            .bookmarks
            .iter()
            .map(|b| b.bookmark_id.clone())
            .collect();
        Self {
            path: path.to_path_buf(),
            snapshot,
            ids,
        }
    }

    pub fn bookmarks(&self) -> &[KoboBookmark] {
        &self.snapshot.bookmarks
    }

    pub fn save(&self) -> Result<()> {
        write_snapshot(&self.path, &self.snapshot)
    }
}

impl KoboStore for JsonKoboStore {
    fn highlights_by_volume(&self) -> BTreeMap<String, Vec<KoboHighlight>> {
        group_bookmarks(&self.snapshot.bookmarks)
    }

    fn contains_bookmark(&self, bookmark_id: &str) -> bool {
        self.ids.contains(bookmark_id)
    }

    fn insert_bookmarks(&mut self, rows: Vec<KoboBookmark>) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        for row in rows {
            if !self.ids.insert(row.bookmark_id.clone()) {
                debug!(
                    bookmark_id = %row.bookmark_id,
                    volume = %row.volume_id,
                    "bookmark already exists"
                );
                outcome.duplicates += 1;
                continue;
            }
            self.snapshot.bookmarks.push(row);
            outcome.inserted += 1;
        }
        info!(inserted = outcome.inserted, duplicates = outcome.duplicates, "device store updated");
        Ok(outcome)
    }
}
