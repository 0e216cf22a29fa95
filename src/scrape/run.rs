//! Scrape run lifecycle types.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Rating;

/// Status of a scrape run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The walker is still traversing the source.
    Running,
    /// The run finished; partial success (non-empty error list) still counts.
    Completed,
    /// The run failed structurally: index fetch failure, export failure, or
    /// cancellation.
    Failed,
}

impl RunStatus {
    /// Returns the history-file string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("invalid run status: {s}")),
        }
    }
}

/// One page that could not be fetched during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageError {
    /// The page URL.
    pub page: String,
    /// Why the page was given up on.
    pub reason: String,
}

/// One book scraped from a listing page, tagged with its category.
///
/// IDs are not assigned here; the exporter assigns ordinals when the record
/// set is written to the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedBook {
    /// Book title.
    pub title: String,
    /// Price as displayed, currency prefix included.
    pub price_display: String,
    /// Normalized non-negative price.
    pub price: f64,
    /// Star rating.
    pub rating: Rating,
    /// Availability text.
    pub availability: String,
    /// Category the book was listed under.
    pub category: String,
    /// Absolute URL of the cover image.
    pub image_url: String,
}

/// One execution of the ingestion pipeline.
///
/// Created `Running`, mutated only by the walker/exporter during the run, and
/// immutable once the status leaves `Running`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeRun {
    /// Short unique run identifier.
    pub id: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run finished, once it has.
    pub finished_at: Option<DateTime<Utc>>,
    /// Current status.
    pub status: RunStatus,
    /// Books successfully scraped so far.
    pub books_scraped: u64,
    /// Categories the walker entered.
    pub categories_visited: u64,
    /// Pages that were given up on, in the order they failed.
    pub errors: Vec<PageError>,
}

impl ScrapeRun {
    /// Creates a new run in the `Running` state with a fresh id.
    #[must_use]
    pub fn start() -> Self {
        Self {
            id: new_run_id(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            books_scraped: 0,
            categories_visited: 0,
            errors: Vec::new(),
        }
    }

    /// Finalizes the run as `Completed`. No-op if the run already finished.
    pub fn complete(&mut self, books_scraped: u64, categories_visited: u64, errors: Vec<PageError>) {
        if self.status != RunStatus::Running {
            return;
        }
        self.books_scraped = books_scraped;
        self.categories_visited = categories_visited;
        self.errors = errors;
        self.status = RunStatus::Completed;
        self.finished_at = Some(Utc::now());
    }

    /// Finalizes the run as `Failed`. No-op if the run already finished.
    pub fn fail(&mut self, errors: Vec<PageError>) {
        if self.status != RunStatus::Running {
            return;
        }
        self.errors = errors;
        self.status = RunStatus::Failed;
        self.finished_at = Some(Utc::now());
    }

    /// Whether the run is still in flight.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == RunStatus::Running
    }
}

/// Generates a short run identifier (first 8 hex chars of a v4 uuid).
#[must_use]
pub fn new_run_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string();
    id.truncate(8);
    id
}

/// Aggregate statistics over a finished run's record set.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatistics {
    /// Total books scraped.
    pub total_books: usize,
    /// Distinct categories with at least one book.
    pub total_categories: usize,
    /// Book count per category, sorted by descending count.
    pub categories_breakdown: Vec<(String, usize)>,
    /// Book count per rating text.
    pub ratings_breakdown: Vec<(String, usize)>,
}

impl RunStatistics {
    /// Computes statistics from a scraped record set.
    #[must_use]
    pub fn from_books(books: &[ScrapedBook]) -> Self {
        use std::collections::BTreeMap;

        let mut categories: BTreeMap<String, usize> = BTreeMap::new();
        let mut ratings: BTreeMap<String, usize> = BTreeMap::new();
        for book in books {
            *categories.entry(book.category.clone()).or_default() += 1;
            *ratings.entry(book.rating.to_string()).or_default() += 1;
        }

        let total_categories = categories.len();
        let mut categories_breakdown: Vec<(String, usize)> = categories.into_iter().collect();
        categories_breakdown.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

        Self {
            total_books: books.len(),
            total_categories,
            categories_breakdown,
            ratings_breakdown: ratings.into_iter().collect(),
        }
    }
}
