//! Stores over the device and library databases.
//!
//! Both stores read their rows once on open; inserts go straight to the
//! database, one transaction per batch.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Row, params};
use tracing::{debug, info, warn};

use super::{CalibreBook, CalibreStore, InsertOutcome, KoboStore, group_annotations, group_bookmarks};
use crate::error::{Error, Result};
use crate::highlight::{CalibreAnnotation, CalibreHighlight, KoboBookmark, KoboHighlight};

const SELECT_BOOKMARKS: &str = "SELECT BookmarkID, VolumeID, ContentID, \
    StartContainerPath, StartContainerChildIndex, StartOffset, \
    EndContainerPath, EndContainerChildIndex, EndOffset, \
    Text, Color, Hidden, DateCreated, DateModified, Type FROM Bookmark";

const INSERT_BOOKMARK: &str = "INSERT INTO Bookmark (VolumeID, ContentID, Text, \
    StartContainerPath, EndContainerPath, StartOffset, EndOffset, BookmarkID, Color, \
    StartContainerChildIndex, EndContainerChildIndex, Hidden, DateCreated, DateModified, Type) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)";

const SELECT_BOOKS: &str = "SELECT id, path, title FROM books";

const SELECT_ANNOTATIONS: &str = "SELECT book, format, user_type, user, timestamp, \
    annot_id, annot_type, annot_data, searchable_text FROM annotations";

const INSERT_ANNOTATION: &str = "INSERT INTO annotations (book, format, user_type, user, \
    timestamp, annot_id, annot_type, annot_data, searchable_text) \
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

/// Open a database that must already exist.
fn open_existing(path: &Path) -> Result<Connection> {
    Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(|e| Error::Store(format!("cannot open {}: {e}", path.display())))
}

/// A column as text, whatever affinity the row stored it with.
fn text(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<String>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Null => None,
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Some(String::from_utf8_lossy(bytes).into_owned())
        }
        ValueRef::Integer(i) => Some(i.to_string()),
        ValueRef::Real(f) => Some(f.to_string()),
    })
}

fn integer(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<i64>> {
    Ok(match row.get_ref(idx)? {
        ValueRef::Integer(i) => Some(i),
        ValueRef::Real(f) => Some(f as i64),
        ValueRef::Text(bytes) => std::str::from_utf8(bytes)
            .ok()
            .and_then(|t| t.trim().parse().ok()),
        ValueRef::Null | ValueRef::Blob(_) => None,
    })
}

fn offset(row: &Row<'_>, idx: usize) -> rusqlite::Result<usize> {
    Ok(integer(row, idx)?
        .and_then(|v| usize::try_from(v).ok())
        .unwrap_or(0))
}

fn bookmark_from_row(row: &Row<'_>) -> rusqlite::Result<KoboBookmark> {
    Ok(KoboBookmark {
        bookmark_id: text(row, 0)?.unwrap_or_default(),
        volume_id: text(row, 1)?.unwrap_or_default(),
        content_id: text(row, 2)?.unwrap_or_default(),
        start_path: text(row, 3)?.unwrap_or_default(),
        start_child_index: integer(row, 4)?.unwrap_or(-99),
        start_offset: offset(row, 5)?,
        end_path: text(row, 6)?.unwrap_or_default(),
        end_child_index: integer(row, 7)?.unwrap_or(-99),
        end_offset: offset(row, 8)?,
        text: text(row, 9)?,
        color: integer(row, 10)?,
        hidden: text(row, 11)?.unwrap_or_else(|| "false".into()),
        date_created: text(row, 12)?.unwrap_or_default(),
        date_modified: text(row, 13)?.unwrap_or_default(),
        bookmark_type: text(row, 14)?.unwrap_or_default(),
    })
}

/// Device store over the `Bookmark` table of `KoboReader.sqlite`.
pub struct SqliteKoboStore {
    conn: Connection,
    rows: Vec<KoboBookmark>,
    ids: HashSet<String>,
}

impl SqliteKoboStore {
    /// Location of the device database inside a mounted volume.
    pub fn default_path(volume: &Path) -> PathBuf {
        volume.join(".kobo").join("KoboReader.sqlite")
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_existing(path)?;
        let rows = {
            let mut stmt = conn.prepare(SELECT_BOOKMARKS)?;
            let rows = stmt
                .query_map([], bookmark_from_row)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };
        debug!(path = %path.display(), rows = rows.len(), "opened device database");

        let ids = rows.iter().map(|b| b.bookmark_id.clone()).collect();
        Ok(Self { conn, rows, ids })
    }

    pub fn bookmarks(&self) -> &[KoboBookmark] {
        &self.rows
    }
}

impl KoboStore for SqliteKoboStore {
    fn highlights_by_volume(&self) -> BTreeMap<String, Vec<KoboHighlight>> {
        group_bookmarks(&self.rows)
    }

    fn contains_bookmark(&self, bookmark_id: &str) -> bool {
        self.ids.contains(bookmark_id)
    }

    fn insert_bookmarks(&mut self, rows: Vec<KoboBookmark>) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(INSERT_BOOKMARK)?;
            for row in rows {
                if self.ids.contains(&row.bookmark_id) {
                    debug!(
                        bookmark_id = %row.bookmark_id,
                        volume = %row.volume_id,
                        "bookmark already exists"
                    );
                    outcome.duplicates += 1;
                    continue;
                }
                insert.execute(params![
                    row.volume_id,
                    row.content_id,
                    row.text,
                    row.start_path,
                    row.end_path,
                    row.start_offset,
                    row.end_offset,
                    row.bookmark_id,
                    row.color,
                    row.start_child_index,
                    row.end_child_index,
                    row.hidden,
                    row.date_created,
                    row.date_modified,
                    row.bookmark_type,
                ])?;
                self.ids.insert(row.bookmark_id.clone());
                self.rows.push(row);
                outcome.inserted += 1;
            }
        }
        tx.commit()?;
        info!(inserted = outcome.inserted, duplicates = outcome.duplicates, "device database updated");
        Ok(outcome)
    }
}

/// Desktop store over the `books` and `annotations` tables of `metadata.db`.
pub struct SqliteCalibreStore {
    conn: Connection,
    books: Vec<CalibreBook>,
    annotations: Vec<CalibreAnnotation>,
    ids: HashSet<String>,
}

impl SqliteCalibreStore {
    /// Location of the library database.
    pub fn default_path(library: &Path) -> PathBuf {
        library.join("metadata.db")
    }

    pub fn open(path: &Path) -> Result<Self> {
        let conn = open_existing(path)?;
        let books = {
            let mut stmt = conn.prepare(SELECT_BOOKS)?;
            let books = stmt
                .query_map([], |row| {
                    Ok(CalibreBook {
                        id: integer(row, 0)?.unwrap_or_default(),
                        path: text(row, 1)?.unwrap_or_default(),
                        title: text(row, 2)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            books
        };
        let raw = {
            let mut stmt = conn.prepare(SELECT_ANNOTATIONS)?;
            let raw = stmt.query_map([], |row| {
                let annotation = CalibreAnnotation {
                    book: integer(row, 0)?.unwrap_or_default(),
                    format: text(row, 1)?.unwrap_or_default(),
                    user_type: text(row, 2)?.unwrap_or_default(),
                    user: text(row, 3)?.unwrap_or_default(),
                    timestamp: integer(row, 4)?.unwrap_or_default(),
                    annot_id: text(row, 5)?.unwrap_or_default(),
                    annot_type: text(row, 6)?.unwrap_or_default(),
                    annot_data: serde_json::Value::Null,
                    searchable_text: text(row, 8)?.unwrap_or_default(),
                };
                Ok((annotation, text(row, 7)?.unwrap_or_default()))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
            raw
        };

        let mut annotations = Vec::with_capacity(raw.len());
        for (mut annotation, data) in raw {
            match serde_json::from_str(&data) {
                Ok(value) => annotation.annot_data = value,
                Err(e) => warn!(
                    annot_id = %annotation.annot_id,
                    book = annotation.book,
                    error = %e,
                    "unreadable annotation data, ignoring row"
                ),
            }
            annotations.push(annotation);
        }
        debug!(
            path = %path.display(),
            books = books.len(),
            annotations = annotations.len(),
            "opened library database"
        );

        let ids = annotations.iter().map(|a| a.annot_id.clone()).collect();
        Ok(Self {
            conn,
            books,
            annotations,
            ids,
        })
    }

    pub fn annotations(&self) -> &[CalibreAnnotation] {
        &self.annotations
    }
}

impl CalibreStore for SqliteCalibreStore {
    fn highlights_by_book(&self) -> BTreeMap<i64, Vec<CalibreHighlight>> {
        group_annotations(&self.annotations)
    }

    fn book_path(&self, book_id: i64) -> Option<&str> {
        self.books
            .iter()
            .find(|b| b.id == book_id)
            .map(|b| b.path.as_str())
    }

    fn contains_annotation(&self, annot_id: &str) -> bool {
        self.ids.contains(annot_id)
    }

    fn insert_annotations(&mut self, rows: Vec<CalibreAnnotation>) -> Result<InsertOutcome> {
        let mut outcome = InsertOutcome::default();
        let tx = self.conn.transaction()?;
        {
            let mut insert = tx.prepare(INSERT_ANNOTATION)?;
            for row in rows {
                if self.ids.contains(&row.annot_id) {
                    debug!(annot_id = %row.annot_id, book = row.book, "annotation already exists");
                    outcome.duplicates += 1;
                    continue;
                }
                let timestamp = row.timestamp as f64;
                let data = serde_json::to_string(&row.annot_data)?;
                insert.execute(params![
                    row.book,
                    row.format,
                    row.user_type,
                    row.user,
                    timestamp,
                    row.annot_id,
                    row.annot_type,
                    data,
                    row.searchable_text,
                ])?;
                self.ids.insert(row.annot_id.clone());
                self.annotations.push(row);
                outcome.inserted += 1;
            }
        }
        tx.commit()?;
        info!(inserted = outcome.inserted, duplicates = outcome.duplicates, "library database updated");
        Ok(outcome)
    }
}
