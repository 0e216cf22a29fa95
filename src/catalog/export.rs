//! Durable store writer and execution-history log.
//!
//! The store is a flat CSV file with a fixed column order. Export is atomic
//! from a reader's point of view: the full record set is written to a
//! temporary file in the destination directory and renamed into place in one
//! step, so the cache never observes a partially written store.
//!
//! The history log is a second CSV file, append-only, one row per finished
//! run. The header is written once when the file is created; rows are never
//! rewritten.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::scrape::{RunStatus, ScrapeRun, ScrapedBook};

/// Column order of the durable store.
pub const STORE_HEADERS: [&str; 7] = [
    "title",
    "price",
    "rating_text",
    "rating_numeric",
    "availability",
    "category",
    "image_url",
];

/// Column order of the execution-history log.
pub const HISTORY_HEADERS: [&str; 7] = [
    "run_id",
    "started_at",
    "finished_at",
    "status",
    "books_scraped",
    "categories_visited",
    "error_count",
];

/// Errors from store or history file operations.
#[derive(Debug, Error)]
pub enum ExportError {
    /// File system error (create, write, rename).
    #[error("IO error writing {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// CSV serialization or parsing error.
    #[error("CSV error on {path}: {source}")]
    Csv {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying CSV error.
        #[source]
        source: csv::Error,
    },
}

impl ExportError {
    fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    fn csv(path: impl Into<PathBuf>, source: csv::Error) -> Self {
        Self::Csv {
            path: path.into(),
            source,
        }
    }
}

/// Outcome of a successful export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Final store path.
    pub path: PathBuf,
    /// Number of records written.
    pub records_written: usize,
}

/// Writes a full record set to the durable store.
pub struct CatalogExporter;

impl CatalogExporter {
    /// Exports the record set to `destination`, replacing any previous store.
    ///
    /// The write goes to a temp file in the destination directory followed by
    /// a single rename, so concurrent readers see either the old store or the
    /// new one, never a torn file. Record IDs are the 1-based row ordinals
    /// and are not persisted as a column.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] on any IO or CSV failure; the previous store
    /// is left untouched in that case.
    #[instrument(skip(records), fields(records = records.len()))]
    pub fn export(records: &[ScrapedBook], destination: &Path) -> Result<ExportResult, ExportError> {
        let dir = destination.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| ExportError::io(dir, e))?;

        let temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ExportError::io(dir, e))?;
        let mut writer = csv::Writer::from_writer(temp);

        writer
            .write_record(STORE_HEADERS)
            .map_err(|e| ExportError::csv(destination, e))?;
        for record in records {
            writer
                .write_record([
                    record.title.as_str(),
                    record.price_display.as_str(),
                    record.rating.as_str(),
                    &record.rating.as_numeric().to_string(),
                    record.availability.as_str(),
                    record.category.as_str(),
                    record.image_url.as_str(),
                ])
                .map_err(|e| ExportError::csv(destination, e))?;
        }

        writer
            .flush()
            .map_err(|e| ExportError::io(destination, e))?;
        let temp = writer
            .into_inner()
            .map_err(|e| ExportError::io(destination, std::io::Error::other(e.to_string())))?;
        temp.persist(destination)
            .map_err(|e| ExportError::io(destination, e.error))?;

        info!(path = %destination.display(), records = records.len(), "store written");
        Ok(ExportResult {
            path: destination.to_path_buf(),
            records_written: records.len(),
        })
    }
}

/// One row of the execution-history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    /// Short run identifier.
    pub run_id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished.
    pub finished_at: Option<DateTime<Utc>>,
    /// Final status.
    pub status: RunStatus,
    /// Books scraped.
    pub books_scraped: u64,
    /// Categories visited.
    pub categories_visited: u64,
    /// Page-level errors recorded.
    pub error_count: u64,
}

impl From<&ScrapeRun> for RunSummary {
    fn from(run: &ScrapeRun) -> Self {
        Self {
            run_id: run.id.clone(),
            started_at: run.started_at,
            finished_at: run.finished_at,
            status: run.status,
            books_scraped: run.books_scraped,
            categories_visited: run.categories_visited,
            error_count: run.errors.len() as u64,
        }
    }
}

/// Aggregate over the whole history log.
#[derive(Debug, Clone, Default, Serialize)]
pub struct HistorySummary {
    /// Total runs recorded.
    pub total_runs: usize,
    /// Runs that finished `Completed`.
    pub completed_runs: usize,
    /// Runs that finished `Failed`.
    pub failed_runs: usize,
    /// Books scraped across all runs.
    pub total_books_scraped: u64,
    /// The most recent run, when any exist.
    pub latest: Option<RunSummary>,
}

/// Append-only execution-history log.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    path: PathBuf,
}

impl HistoryLog {
    /// Creates a handle for the history file at `path`. The file itself is
    /// created lazily on first append.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the history file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one finished run to the log, creating the file (and writing
    /// the header) if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] on any IO or CSV failure.
    pub fn append(&self, run: &ScrapeRun) -> Result<(), ExportError> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir).map_err(|e| ExportError::io(dir, e))?;
        }

        let needs_header = fs::metadata(&self.path).map(|m| m.len() == 0).unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| ExportError::io(&self.path, e))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);

        if needs_header {
            writer
                .write_record(HISTORY_HEADERS)
                .map_err(|e| ExportError::csv(&self.path, e))?;
        }

        let summary = RunSummary::from(run);
        writer
            .write_record([
                summary.run_id.as_str(),
                &summary.started_at.to_rfc3339(),
                &summary
                    .finished_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_default(),
                summary.status.as_str(),
                &summary.books_scraped.to_string(),
                &summary.categories_visited.to_string(),
                &summary.error_count.to_string(),
            ])
            .map_err(|e| ExportError::csv(&self.path, e))?;
        writer.flush().map_err(|e| ExportError::io(&self.path, e))?;

        info!(run_id = %summary.run_id, status = %summary.status, "run appended to history");
        Ok(())
    }

    /// Reads all recorded runs in append order.
    ///
    /// Returns an empty list when the log does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the file exists but cannot be read or
    /// contains a row that does not parse.
    pub fn read_all(&self) -> Result<Vec<RunSummary>, ExportError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let mut reader =
            csv::Reader::from_path(&self.path).map_err(|e| ExportError::csv(&self.path, e))?;
        let mut runs = Vec::new();
        for row in reader.records() {
            let row = row.map_err(|e| ExportError::csv(&self.path, e))?;
            // A row without a readable start timestamp is damaged; skip it
            // rather than invent one.
            let Some(started_at) = parse_timestamp(row.get(1)) else {
                warn!(
                    path = %self.path.display(),
                    run_id = row.get(0).unwrap_or_default(),
                    "skipping history row with unparsable start timestamp"
                );
                continue;
            };
            runs.push(RunSummary {
                run_id: row.get(0).unwrap_or_default().to_string(),
                started_at,
                finished_at: row
                    .get(2)
                    .filter(|s| !s.is_empty())
                    .and_then(|s| parse_timestamp(Some(s))),
                status: row
                    .get(3)
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(RunStatus::Failed),
                books_scraped: parse_count(row.get(4)),
                categories_visited: parse_count(row.get(5)),
                error_count: parse_count(row.get(6)),
            });
        }
        Ok(runs)
    }

    /// Aggregates the whole log into a [`HistorySummary`].
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the log cannot be read.
    pub fn summary(&self) -> Result<HistorySummary, ExportError> {
        let runs = self.read_all()?;
        Ok(HistorySummary {
            total_runs: runs.len(),
            completed_runs: runs
                .iter()
                .filter(|r| r.status == RunStatus::Completed)
                .count(),
            failed_runs: runs.iter().filter(|r| r.status == RunStatus::Failed).count(),
            total_books_scraped: runs.iter().map(|r| r.books_scraped).sum(),
            latest: runs.last().cloned(),
        })
    }
}

fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

fn parse_count(value: Option<&str>) -> u64 {
    value.and_then(|s| s.parse().ok()).unwrap_or(0)
}
