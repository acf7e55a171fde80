//! End-to-end sync between a device volume and a library on disk.
//!
//! Each test lays out a device volume (`metadata.calibre` plus a bookmark
//! store) and a library (two book directories plus an annotation store) in a
//! temporary directory, with the EPUBs written by `ZipWriter`. The second
//! book's EPUB has no `META-INF/container.xml`.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone, Utc};
use kobo2calibre::highlight::SpineRef;
use kobo2calibre::store::{CalibreSnapshot, KoboSnapshot};
use kobo2calibre::sync;
use kobo2calibre::{
    CalibreAnnotation, CalibreStore, DeviceMetadata, Error, JsonCalibreStore, JsonKoboStore,
    KoboStore, SqliteCalibreStore, SqliteKoboStore, SyncOptions, Translator, stable_id,
};
use rusqlite::{Connection, params};
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

const VOLUME_ID: &str = "file:///mnt/onboard/Doyle/A Study.kepub.epub";
const CONTENT_ID: &str = "file:///mnt/onboard/Doyle/A Study.kepub.epub!OEBPS!Text!ch1.xhtml";
const BOOK_DIR: &str = "Arthur Conan Doyle/A Study in Scarlet (1)";

const BROKEN_VOLUME_ID: &str = "file:///mnt/onboard/Doyle/The Sign.kepub.epub";
const BROKEN_CONTENT_ID: &str = "file:///mnt/onboard/Doyle/The Sign.kepub.epub!OEBPS!Text!ch1.xhtml";
const BROKEN_BOOK_DIR: &str = "Arthur Conan Doyle/The Sign of Four (2)";

const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

const OPF: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata><dc:title xmlns:dc="http://purl.org/dc/elements/1.1/">A Study in Scarlet</dc:title></metadata>
  <manifest>
    <item id="ch1" href="Text/ch1.xhtml" media-type="application/xhtml+xml"/>
  </manifest>
  <spine><itemref idref="ch1"/></spine>
</package>"#;

const CHAPTER: &str = "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n\
<!DOCTYPE html>\n\
<html xmlns=\"http://www.w3.org/1999/xhtml\"><head><title>Chapter 1</title></head><body>\n\
<p>Hello world. This is a test.</p>\n\
<p>Second <em>para</em>graph here.</p>\n\
</body></html>";

struct Fixture {
    _dir: TempDir,
    volume: PathBuf,
    library: PathBuf,
}

impl Fixture {
    fn new(bookmarks: serde_json::Value, annotations: Vec<CalibreAnnotation>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let volume = dir.path().join("KOBOeReader");
        let library = dir.path().join("Calibre Library");

        fs::create_dir_all(volume.join(".kobo")).unwrap();
        fs::write(
            volume.join(DeviceMetadata::FILE_NAME),
            r#"[{"lpath": "Doyle/A Study.kepub.epub", "application_id": 1},
                {"lpath": "Doyle/The Sign.kepub.epub", "application_id": 2},
                {"title": "no lpath"}]"#,
        )
        .unwrap();
        fs::write(
            JsonKoboStore::default_path(&volume),
            serde_json::to_vec(&serde_json::json!({ "Bookmark": bookmarks })).unwrap(),
        )
        .unwrap();

        let book_dir = library.join(BOOK_DIR);
        fs::create_dir_all(&book_dir).unwrap();
        write_epub(&book_dir.join("A Study in Scarlet - Arthur Conan Doyle.epub"), &EPUB_ENTRIES);
        let broken_dir = library.join(BROKEN_BOOK_DIR);
        fs::create_dir_all(&broken_dir).unwrap();
        write_epub(
            &broken_dir.join("The Sign of Four - Arthur Conan Doyle.epub"),
            &[EPUB_ENTRIES[0], EPUB_ENTRIES[2], EPUB_ENTRIES[3]],
        );
        let snapshot = serde_json::json!({
            "books": [{"id": 1, "path": BOOK_DIR}, {"id": 2, "path": BROKEN_BOOK_DIR}],
            "annotations": annotations,
        });
        fs::write(
            JsonCalibreStore::default_path(&library),
            serde_json::to_vec(&snapshot).unwrap(),
        )
        .unwrap();

        Self {
            _dir: dir,
            volume,
            library,
        }
    }

    fn kobo(&self) -> JsonKoboStore {
        JsonKoboStore::open(&JsonKoboStore::default_path(&self.volume)).unwrap()
    }

    fn calibre(&self) -> JsonCalibreStore {
        JsonCalibreStore::open(&JsonCalibreStore::default_path(&self.library)).unwrap()
    }

    fn metadata(&self) -> DeviceMetadata {
        DeviceMetadata::load(&self.volume).unwrap()
    }
}

const EPUB_ENTRIES: [(&str, &str); 4] = [
    ("mimetype", "application/epub+zip"),
    ("META-INF/container.xml", CONTAINER),
    ("OEBPS/content.opf", OPF),
    ("OEBPS/Text/ch1.xhtml", CHAPTER),
];

fn write_epub(path: &Path, entries: &[(&str, &str)]) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = SimpleFileOptions::default();
    for &(name, body) in entries {
        zip.start_file(name, options).unwrap();
        zip.write_all(body.as_bytes()).unwrap();
    }
    zip.finish().unwrap();
}

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap()
}

fn options() -> SyncOptions {
    SyncOptions {
        jobs: 2,
        device_prefix: "file:///mnt/onboard/".into(),
        ..SyncOptions::default()
    }
}

fn bookmark(id: &str, start: &str, start_offset: usize, end: &str, end_offset: usize, text: &str) -> serde_json::Value {
    serde_json::json!({
        "BookmarkID": id, "VolumeID": VOLUME_ID, "ContentID": CONTENT_ID,
        "StartContainerPath": start, "StartOffset": start_offset,
        "EndContainerPath": end, "EndOffset": end_offset,
        "Text": text, "Color": 1
    })
}

#[test]
fn test_kobo_to_calibre() {
    let fixture = Fixture::new(
        serde_json::json!([
            bookmark("a", r"span#kobo\.1\.2", 0, r"span#kobo\.1\.2", 4, "This"),
            bookmark("b", r"span#kobo\.9\.1", 0, r"span#kobo\.9\.1", 3, "Gone"),
        ]),
        Vec::new(),
    );
    let kobo = fixture.kobo();
    let mut calibre = fixture.calibre();

    let report = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(report.books, 1);
    assert_eq!(report.converted, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.inserted, 1);
    calibre.save().unwrap();

    let calibre = fixture.calibre();
    let row = &calibre.annotations()[0];
    assert_eq!(row.book, 1);
    assert_eq!(row.timestamp, 1709296205);
    assert_eq!(row.searchable_text, "This");
    let data = row.data().unwrap();
    assert_eq!(data.start_cfi, "/2/4/2/1:13");
    assert_eq!(data.end_cfi, "/2/4/2/1:17");
    assert_eq!(data.spine_index, 0);
    assert_eq!(data.spine_name, "OEBPS/Text/ch1.xhtml");
    assert_eq!(data.style.which, "purple");
    assert_eq!(data.timestamp, "2024-03-01T12:30:05Z");
    assert_eq!(
        row.annot_id,
        stable_id("/2/4/2/1:13", "/2/4/2/1:17", "This").simple().to_string()
    );

    // A second run finds everything already imported
    let mut calibre = fixture.calibre();
    let again = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.duplicates, 1);
}

#[test]
fn test_calibre_to_kobo_shares_ids() {
    let seed = CalibreAnnotation::highlight(
        1,
        "/2/4/4/1:0".into(),
        "/2/4/4/3:5".into(),
        "Second paragraph",
        SpineRef {
            index: 0,
            name: "OEBPS/Text/ch1.xhtml".into(),
        },
        "green",
        now(),
    )
    .unwrap();
    let fixture = Fixture::new(serde_json::json!([]), vec![seed.clone()]);
    let calibre = fixture.calibre();
    let mut kobo = fixture.kobo();

    let report = sync::calibre_to_kobo(
        &fixture.library,
        &calibre,
        &mut kobo,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(report.inserted, 1);
    kobo.save().unwrap();

    let kobo = fixture.kobo();
    let row = &kobo.bookmarks()[0];
    assert_eq!(row.volume_id, VOLUME_ID);
    assert_eq!(row.content_id, CONTENT_ID);
    assert_eq!(row.start_path, r"span#kobo\.2\.1");
    assert_eq!(row.start_offset, 0);
    assert_eq!(row.end_path, r"span#kobo\.4\.1");
    assert_eq!(row.end_offset, 5);
    assert_eq!(row.color, Some(3));
    assert_eq!(row.date_created, "2024-03-01T12:30:05.000");
    assert_eq!(row.start_child_index, -99);
    assert!(kobo.contains_bookmark(&stable_id("/2/4/4/1:0", "/2/4/4/3:5", "Second paragraph").hyphenated().to_string()));

    // Bringing the highlight back translates to the row it came from
    let mut calibre = fixture.calibre();
    let back = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(back.converted, 1);
    assert_eq!(back.inserted, 0);
    assert_eq!(back.duplicates, 1);
    assert!(calibre.contains_annotation(&seed.annot_id));
}

#[test]
fn test_unmatched_and_filtered_books_are_skipped() {
    let mut other = bookmark("z", r"span#kobo\.1\.1", 0, r"span#kobo\.1\.1", 5, "Hello");
    other["VolumeID"] = "file:///mnt/onboard/Unknown.kepub.epub".into();
    let fixture = Fixture::new(
        serde_json::json!([other, bookmark("a", r"span#kobo\.1\.1", 0, r"span#kobo\.1\.1", 5, "Hello")]),
        Vec::new(),
    );
    let kobo = fixture.kobo();
    let mut calibre = fixture.calibre();

    let filtered = SyncOptions {
        filter_bookname: Some("A Study".into()),
        dry_run: true,
        ..options()
    };
    let report = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &filtered,
        now(),
    )
    .unwrap();
    assert_eq!(report.unmatched, 0);
    assert_eq!(report.converted, 1);
    assert_eq!(report.inserted, 0);
    assert!(calibre.annotations().is_empty());

    let report = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(report.unmatched, 1);
    assert_eq!(report.books, 1);
    assert_eq!(report.inserted, 1);
}

#[test]
fn test_snapshots_round_trip_through_serde() {
    let fixture = Fixture::new(serde_json::json!([]), Vec::new());
    let kobo: KoboSnapshot =
        serde_json::from_slice(&fs::read(JsonKoboStore::default_path(&fixture.volume)).unwrap()).unwrap();
    assert!(kobo.bookmarks.is_empty());
    let calibre: CalibreSnapshot =
        serde_json::from_slice(&fs::read(JsonCalibreStore::default_path(&fixture.library)).unwrap())
            .unwrap();
    assert_eq!(calibre.books[0].path, BOOK_DIR);
    assert_eq!(fixture.kobo().highlights_by_volume().len(), 0);
    assert_eq!(fixture.calibre().highlights_by_book().len(), 0);
}

#[test]
fn test_book_without_container_is_skipped() {
    let mut broken = bookmark("s", r"span#kobo\.1\.1", 0, r"span#kobo\.1\.1", 5, "Hello");
    broken["VolumeID"] = BROKEN_VOLUME_ID.into();
    broken["ContentID"] = BROKEN_CONTENT_ID.into();
    let fixture = Fixture::new(
        serde_json::json!([
            bookmark("a", r"span#kobo\.1\.2", 0, r"span#kobo\.1\.2", 4, "This"),
            broken,
        ]),
        Vec::new(),
    );
    let kobo = fixture.kobo();
    let mut calibre = fixture.calibre();

    let report = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(report.books, 1);
    assert_eq!(report.failed_books, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.inserted, 1);
    assert_eq!(calibre.annotations().len(), 1);
    assert_eq!(calibre.annotations()[0].book, 1);
}

#[test]
fn test_unreadable_archive_aborts_run() {
    let mut broken = bookmark("s", r"span#kobo\.1\.1", 0, r"span#kobo\.1\.1", 5, "Hello");
    broken["VolumeID"] = BROKEN_VOLUME_ID.into();
    broken["ContentID"] = BROKEN_CONTENT_ID.into();
    let fixture = Fixture::new(
        serde_json::json!([
            bookmark("a", r"span#kobo\.1\.2", 0, r"span#kobo\.1\.2", 4, "This"),
            broken,
        ]),
        Vec::new(),
    );
    fs::write(
        fixture
            .library
            .join(BROKEN_BOOK_DIR)
            .join("The Sign of Four - Arthur Conan Doyle.epub"),
        b"not a zip archive",
    )
    .unwrap();
    let kobo = fixture.kobo();
    let mut calibre = fixture.calibre();

    let err = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap_err();
    assert!(!err.is_skippable());
    assert!(matches!(err, Error::Zip(_)));
    assert!(calibre.annotations().is_empty());
}

const KOBO_SCHEMA: &str = "CREATE TABLE Bookmark (
    BookmarkID TEXT NOT NULL PRIMARY KEY, VolumeID TEXT NOT NULL, ContentID TEXT NOT NULL,
    StartContainerPath TEXT NOT NULL, StartContainerChildIndex INTEGER NOT NULL DEFAULT -99,
    StartOffset INTEGER NOT NULL, EndContainerPath TEXT NOT NULL,
    EndContainerChildIndex INTEGER NOT NULL DEFAULT -99, EndOffset INTEGER NOT NULL,
    Text TEXT, DateCreated TEXT, Hidden BOOL NOT NULL DEFAULT 0, DateModified TEXT,
    Type TEXT, Color INTEGER);";

const CALIBRE_SCHEMA: &str = "CREATE TABLE books (
    id INTEGER PRIMARY KEY, title TEXT NOT NULL DEFAULT 'Unknown', path TEXT NOT NULL DEFAULT '');
    CREATE TABLE annotations (
    id INTEGER PRIMARY KEY, book INTEGER NOT NULL, format TEXT NOT NULL,
    user_type TEXT NOT NULL, user TEXT NOT NULL, timestamp REAL NOT NULL,
    annot_id TEXT NOT NULL, annot_type TEXT NOT NULL, annot_data TEXT NOT NULL,
    searchable_text TEXT NOT NULL DEFAULT '',
    UNIQUE(book, user_type, user, format, annot_type, annot_id));";

#[test]
fn test_sync_through_databases() {
    let fixture = Fixture::new(serde_json::json!([]), Vec::new());

    let kobo_db = SqliteKoboStore::default_path(&fixture.volume);
    let conn = Connection::open(&kobo_db).unwrap();
    conn.execute_batch(KOBO_SCHEMA).unwrap();
    conn.execute(
        "INSERT INTO Bookmark (BookmarkID, VolumeID, ContentID, StartContainerPath, StartOffset,
            EndContainerPath, EndOffset, Text, Color, Type)
         VALUES ('a', ?1, ?2, ?3, 0, ?3, 4, 'This', 1, 'highlight')",
        params![VOLUME_ID, CONTENT_ID, r"span#kobo\.1\.2"],
    )
    .unwrap();
    drop(conn);

    let calibre_db = SqliteCalibreStore::default_path(&fixture.library);
    let conn = Connection::open(&calibre_db).unwrap();
    conn.execute_batch(CALIBRE_SCHEMA).unwrap();
    conn.execute(
        "INSERT INTO books (id, title, path) VALUES (1, 'A Study in Scarlet', ?1)",
        params![BOOK_DIR],
    )
    .unwrap();
    drop(conn);

    let kobo = SqliteKoboStore::open(&kobo_db).unwrap();
    let mut calibre = SqliteCalibreStore::open(&calibre_db).unwrap();
    let report = sync::kobo_to_calibre(
        &fixture.library,
        &kobo,
        &mut calibre,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(report.inserted, 1);
    drop(calibre);

    let conn = Connection::open(&calibre_db).unwrap();
    let (book, annot_id, data): (i64, String, String) = conn
        .query_row("SELECT book, annot_id, annot_data FROM annotations", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(book, 1);
    assert_eq!(
        annot_id,
        stable_id("/2/4/2/1:13", "/2/4/2/1:17", "This").simple().to_string()
    );
    let data: serde_json::Value = serde_json::from_str(&data).unwrap();
    assert_eq!(data["start_cfi"], "/2/4/2/1:13");
    drop(conn);

    // The highlight travels back to the device as the same row
    let calibre = SqliteCalibreStore::open(&calibre_db).unwrap();
    let mut kobo = SqliteKoboStore::open(&kobo_db).unwrap();
    let back = sync::calibre_to_kobo(
        &fixture.library,
        &calibre,
        &mut kobo,
        &fixture.metadata(),
        &Translator::default(),
        &options(),
        now(),
    )
    .unwrap();
    assert_eq!(back.converted, 1);
    assert_eq!(back.inserted, 1);
    assert_eq!(kobo.bookmarks().len(), 2);
}
