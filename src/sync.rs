//! Batch synchronization between a device volume and a desktop library.
//!
//! Books are matched through `metadata.calibre`, converted in parallel with
//! one archive and one document cache per book, and the resulting rows are
//! written to the sink store from the calling thread only.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use tracing::{debug, error, info, warn};

use crate::convert::{BookConversion, CalibreToKobo, KoboToCalibre, Translator};
use crate::device::{DeviceMetadata, volume_id};
use crate::epub::EpubArchive;
use crate::error::{Error, Result};
use crate::highlight::{CalibreHighlight, KoboHighlight};
use crate::store::{CalibreStore, InsertOutcome, KoboStore};

/// Options for one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Worker threads; 0 lets rayon decide.
    pub jobs: usize,
    /// Translate but do not write to the sink store.
    pub dry_run: bool,
    /// Only books whose device volume id contains this substring.
    pub filter_bookname: Option<String>,
    /// Prefix joining the device mount point to a book's device path.
    pub device_prefix: String,
}

impl SyncOptions {
    fn wants(&self, volume_id: &str) -> bool {
        self.filter_bookname
            .as_deref()
            .is_none_or(|needle| volume_id.contains(needle))
    }
}

/// Counts for a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Books that were matched and converted.
    pub books: usize,
    /// Books skipped because no counterpart was found.
    pub unmatched: usize,
    /// Highlights translated.
    pub converted: usize,
    /// Highlights skipped because they could not be translated.
    pub failed: usize,
    /// Matched books skipped because their EPUB could not be used.
    pub failed_books: usize,
    pub inserted: usize,
    pub duplicates: usize,
}

impl SyncReport {
    fn record<T>(&mut self, conversion: &BookConversion<T>) {
        self.books += 1;
        self.converted += conversion.rows.len();
        self.failed += conversion.failed;
    }

    fn skip_book(&mut self, highlights: usize) {
        self.failed_books += 1;
        self.failed += highlights;
    }

    fn add_outcome(&mut self, outcome: InsertOutcome) {
        self.inserted += outcome.inserted;
        self.duplicates += outcome.duplicates;
    }
}

/// Work for one matched book.
struct Job<H> {
    book_id: i64,
    volume_id: String,
    epub: PathBuf,
    highlights: Vec<H>,
}

/// Copy device highlights into the desktop store.
pub fn kobo_to_calibre<K, C>(
    library: &Path,
    kobo: &K,
    calibre: &mut C,
    metadata: &DeviceMetadata,
    translator: &Translator,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncReport>
where
    K: KoboStore + ?Sized,
    C: CalibreStore + ?Sized,
{
    let mut report = SyncReport::default();
    let mut jobs = Vec::new();

    for (volume, highlights) in kobo.highlights_by_volume() {
        if highlights.is_empty() || !options.wants(&volume) {
            continue;
        }
        let matched = metadata
            .book_id(&volume)
            .ok_or_else(|| Error::BookNotMatched(format!("device volume {volume}")))
            .and_then(|book_id| Ok((book_id, library_epub(library, &*calibre, book_id)?)));
        let (book_id, epub) = match matched {
            Ok(matched) => matched,
            Err(e) => {
                warn!(volume = %volume, highlights = highlights.len(), error = %e, "skipping book");
                report.unmatched += 1;
                continue;
            }
        };
        jobs.push(Job {
            book_id,
            volume_id: volume,
            epub,
            highlights,
        });
    }

    info!(books = jobs.len(), "converting device highlights");
    let results = run_jobs(&jobs, options.jobs, |job: &Job<KoboHighlight>| {
        let mut archive = EpubArchive::open(&job.epub)?;
        KoboToCalibre::new(translator, job.book_id, now).convert_book(&mut archive, &job.highlights)
    })?;

    for (job, conversion) in jobs.iter().zip(results) {
        let Some(conversion) = conversion else {
            report.skip_book(job.highlights.len());
            continue;
        };
        report.record(&conversion);
        let rows: Vec<_> = conversion
            .rows
            .into_iter()
            .filter(|row| !calibre.contains_annotation(&row.annot_id))
            .collect();
        let already = job.highlights.len() - conversion.failed - rows.len();
        report.duplicates += already;
        debug!(book = job.book_id, new = rows.len(), already, "converted book");
        if options.dry_run || rows.is_empty() {
            continue;
        }
        report.add_outcome(calibre.insert_annotations(rows)?);
    }

    info!(?report, dry_run = options.dry_run, "device to library sync finished");
    Ok(report)
}

/// Copy desktop highlights into the device store.
pub fn calibre_to_kobo<C, K>(
    library: &Path,
    calibre: &C,
    kobo: &mut K,
    metadata: &DeviceMetadata,
    translator: &Translator,
    options: &SyncOptions,
    now: DateTime<Utc>,
) -> Result<SyncReport>
where
    C: CalibreStore + ?Sized,
    K: KoboStore + ?Sized,
{
    let mut report = SyncReport::default();
    let mut jobs = Vec::new();

    for (book_id, highlights) in calibre.highlights_by_book() {
        let Some(lpath) = metadata.lpath(book_id) else {
            debug!(book = book_id, "book is not on the device, skipping");
            continue;
        };
        let volume = volume_id(&options.device_prefix, lpath);
        if highlights.is_empty() || !options.wants(&volume) {
            continue;
        }
        let epub = match library_epub(library, calibre, book_id) {
            Ok(epub) => epub,
            Err(e) => {
                warn!(book = book_id, highlights = highlights.len(), error = %e, "skipping book");
                report.unmatched += 1;
                continue;
            }
        };
        jobs.push(Job {
            book_id,
            volume_id: volume,
            epub,
            highlights,
        });
    }

    info!(books = jobs.len(), "converting library highlights");
    let results = run_jobs(&jobs, options.jobs, |job: &Job<CalibreHighlight>| {
        let mut archive = EpubArchive::open(&job.epub)?;
        CalibreToKobo::new(translator, &job.volume_id, now)
            .convert_book(&mut archive, &job.highlights)
    })?;

    for (job, conversion) in jobs.iter().zip(results) {
        let Some(conversion) = conversion else {
            report.skip_book(job.highlights.len());
            continue;
        };
        report.record(&conversion);
        let rows: Vec<_> = conversion
            .rows
            .into_iter()
            .filter(|row| !kobo.contains_bookmark(&row.bookmark_id))
            .collect();
        let already = job.highlights.len() - conversion.failed - rows.len();
        report.duplicates += already;
        debug!(volume = %job.volume_id, new = rows.len(), already, "converted book");
        if options.dry_run || rows.is_empty() {
            continue;
        }
        report.add_outcome(kobo.insert_bookmarks(rows)?);
    }

    info!(?report, dry_run = options.dry_run, "library to device sync finished");
    Ok(report)
}

/// Convert every job on a dedicated pool, keeping job order.
///
/// A book whose failure is skippable (a missing content file, say) comes
/// back as `None` and the others are still converted. Any other failure,
/// such as an archive that is not a ZIP, aborts the run.
fn run_jobs<H, T, F>(
    jobs: &[Job<H>],
    threads: usize,
    convert: F,
) -> Result<Vec<Option<BookConversion<T>>>>
where
    H: Sync,
    T: Send,
    F: Fn(&Job<H>) -> Result<BookConversion<T>> + Sync,
{
    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let results: Vec<Result<BookConversion<T>>> =
        pool.install(|| jobs.par_iter().map(&convert).collect());

    jobs.iter()
        .zip(results)
        .map(|(job, result)| match result {
            Ok(conversion) => Ok(Some(conversion)),
            Err(e) if e.is_skippable() => {
                warn!(
                    book = job.book_id,
                    volume = %job.volume_id,
                    epub = %job.epub.display(),
                    highlights = job.highlights.len(),
                    error = %e,
                    "skipping book"
                );
                Ok(None)
            }
            Err(e) => {
                error!(
                    book = job.book_id,
                    volume = %job.volume_id,
                    epub = %job.epub.display(),
                    error = %e,
                    "book conversion failed"
                );
                Err(e)
            }
        })
        .collect()
}

/// The EPUB of a library book: the first `*.epub` in its directory.
fn library_epub<C: CalibreStore + ?Sized>(library: &Path, calibre: &C, book_id: i64) -> Result<PathBuf> {
    let book_path = calibre
        .book_path(book_id)
        .ok_or_else(|| Error::BookNotMatched(format!("library book {book_id} has no path")))?;
    let dir = library.join(book_path);
    find_epub(&dir).ok_or_else(|| Error::BookNotMatched(format!("no EPUB in {}", dir.display())))
}

fn find_epub(dir: &Path) -> Option<PathBuf> {
    let mut epubs: Vec<PathBuf> = fs::read_dir(dir)
        .ok()?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext.eq_ignore_ascii_case("epub"))
        })
        .collect();
    epubs.sort();
    epubs.into_iter().next()
}
