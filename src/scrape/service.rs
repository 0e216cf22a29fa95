//! Run orchestration: single-active-run guard, background execution, status,
//! cancellation, and history.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, instrument, warn};

use crate::catalog::{CatalogExporter, ExportError, HistoryLog, HistorySummary, RunSummary};
use crate::config::ScraperConfig;
use crate::fetch::{PageFetcher, RetryPolicy};

use super::run::{PageError, RunStatistics, ScrapeRun};
use super::walker::{CancelFlag, PaginationWalker, WalkProgress};

/// Errors surfaced by the orchestration layer.
#[derive(Debug, Error)]
pub enum ScrapeServiceError {
    /// Another run is still in progress; concurrent runs are rejected, never
    /// queued.
    #[error("scrape run '{active_run_id}' is already in progress")]
    AlreadyRunning {
        /// Id of the run currently executing.
        active_run_id: String,
    },

    /// No run with the given id is known to this service instance.
    #[error("no scrape run with id '{run_id}'")]
    UnknownRun {
        /// The id that was looked up.
        run_id: String,
    },
}

/// Per-run overrides supplied by the trigger. Unset fields fall back to the
/// service configuration.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Politeness delay between page fetches for this run.
    pub page_delay: Option<Duration>,
    /// Store filename inside the data directory for this run's export.
    pub store_filename: Option<String>,
}

/// Per-run bookkeeping kept while the service remembers the run.
struct RunEntry {
    run: ScrapeRun,
    cancel: CancelFlag,
    progress: Arc<WalkProgress>,
}

/// Coordinates scrape runs: at most one active at a time, each executed on a
/// background task, with status and cancellation keyed by run id.
pub struct ScrapeService {
    fetcher: Arc<dyn PageFetcher>,
    config: ScraperConfig,
    history: HistoryLog,
    runs: Mutex<HashMap<String, RunEntry>>,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
}

impl ScrapeService {
    /// Creates a service over the given fetcher and settings.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, config: ScraperConfig) -> Arc<Self> {
        let history = HistoryLog::new(config.history_path());
        Arc::new(Self {
            fetcher,
            config,
            history,
            runs: Mutex::new(HashMap::new()),
            handles: Mutex::new(HashMap::new()),
        })
    }

    /// Starts a new run in the background and returns its id immediately.
    ///
    /// `options` carries per-run overrides for the page delay and store
    /// filename; unset fields use the service configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeServiceError::AlreadyRunning`] when a run is still in
    /// progress. The caller must retry later; requests are never queued.
    pub fn start_scrape(
        self: &Arc<Self>,
        options: RunOptions,
    ) -> Result<String, ScrapeServiceError> {
        let run_id;
        let cancel;
        let progress;
        {
            // The guard check and the insert happen under one lock so two
            // concurrent starts cannot both pass.
            let mut runs = lock_unpoisoned(&self.runs);
            if let Some(active) = runs.values().find(|entry| entry.run.is_running()) {
                return Err(ScrapeServiceError::AlreadyRunning {
                    active_run_id: active.run.id.clone(),
                });
            }

            let run = ScrapeRun::start();
            run_id = run.id.clone();
            cancel = CancelFlag::new();
            progress = Arc::new(WalkProgress::default());
            runs.insert(
                run_id.clone(),
                RunEntry {
                    run,
                    cancel: cancel.clone(),
                    progress: Arc::clone(&progress),
                },
            );
        }

        info!(run_id = %run_id, base_url = %self.config.base_url, "scrape run started");
        let service = Arc::clone(self);
        let handle = tokio::spawn({
            let run_id = run_id.clone();
            async move {
                // A task that unwinds before finalizing must not leave the
                // run `Running`, or the single-run guard would reject every
                // later start.
                let guard = FinalizeGuard {
                    service: Arc::clone(&service),
                    run_id: run_id.clone(),
                    armed: true,
                };
                service.execute(run_id, cancel, progress, options).await;
                guard.disarm();
            }
        });
        lock_unpoisoned(&self.handles).insert(run_id.clone(), handle);

        Ok(run_id)
    }

    /// Starts a run and waits for it to finish. Used by the CLI, where there
    /// is nothing to do but watch the run.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeServiceError::AlreadyRunning`] when a run is still in
    /// progress.
    pub async fn run_to_completion(
        self: &Arc<Self>,
        options: RunOptions,
    ) -> Result<ScrapeRun, ScrapeServiceError> {
        let run_id = self.start_scrape(options)?;
        self.wait(&run_id).await
    }

    /// Waits for the given run's background task to finish, then returns its
    /// final state.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeServiceError::UnknownRun`] when the id was never
    /// started on this service.
    pub async fn wait(&self, run_id: &str) -> Result<ScrapeRun, ScrapeServiceError> {
        let handle = lock_unpoisoned(&self.handles).remove(run_id);
        if let Some(handle) = handle {
            if let Err(join_error) = handle.await {
                error!(run_id, %join_error, "scrape task aborted");
            }
        }
        self.get_status(run_id)
    }

    /// Returns the current state of a run.
    ///
    /// While the run is in progress the book and category counters reflect
    /// live walker progress, not the zeros recorded at start.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeServiceError::UnknownRun`] for ids this service never
    /// started.
    pub fn get_status(&self, run_id: &str) -> Result<ScrapeRun, ScrapeServiceError> {
        let runs = lock_unpoisoned(&self.runs);
        let entry = runs
            .get(run_id)
            .ok_or_else(|| ScrapeServiceError::UnknownRun {
                run_id: run_id.to_string(),
            })?;

        let mut run = entry.run.clone();
        if run.is_running() {
            run.books_scraped = entry.progress.books_scraped.load(Ordering::Relaxed);
            run.categories_visited = entry.progress.categories_visited.load(Ordering::Relaxed);
        }
        Ok(run)
    }

    /// Requests cancellation of a run. The walker observes the flag between
    /// page fetches, so the run winds down at the next boundary. Cancelling a
    /// finished run is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ScrapeServiceError::UnknownRun`] for ids this service never
    /// started.
    pub fn cancel(&self, run_id: &str) -> Result<(), ScrapeServiceError> {
        let runs = lock_unpoisoned(&self.runs);
        let entry = runs
            .get(run_id)
            .ok_or_else(|| ScrapeServiceError::UnknownRun {
                run_id: run_id.to_string(),
            })?;
        entry.cancel.cancel();
        info!(run_id, "cancellation requested");
        Ok(())
    }

    /// Returns all runs this service instance has started, newest first.
    #[must_use]
    pub fn list_runs(&self) -> Vec<ScrapeRun> {
        let runs = lock_unpoisoned(&self.runs);
        let mut all: Vec<ScrapeRun> = runs.values().map(|entry| entry.run.clone()).collect();
        all.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        all
    }

    /// Reads the full durable history, oldest first.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the history file cannot be read.
    pub fn list_history(&self) -> Result<Vec<RunSummary>, ExportError> {
        self.history.read_all()
    }

    /// Aggregates the durable history.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError`] when the history file cannot be read.
    pub fn history_summary(&self) -> Result<HistorySummary, ExportError> {
        self.history.summary()
    }

    /// Drives one run to its terminal state, then records it in the registry
    /// and the history log.
    #[instrument(skip_all, fields(run_id = %run_id))]
    async fn execute(
        &self,
        run_id: String,
        cancel: CancelFlag,
        progress: Arc<WalkProgress>,
        options: RunOptions,
    ) {
        let page_delay = options
            .page_delay
            .unwrap_or_else(|| self.config.page_delay());
        let store_path: PathBuf = match &options.store_filename {
            Some(name) => self.config.data_dir.join(name),
            None => self.config.store_path(),
        };

        let policy = RetryPolicy::with_max_retries(self.config.max_retries);
        let walker = PaginationWalker::new(Arc::clone(&self.fetcher), policy, page_delay)
            .with_progress(progress);

        let mut run = match self.get_status(&run_id) {
            Ok(run) => run,
            Err(err) => {
                error!(%err, "run disappeared from registry before execution");
                return;
            }
        };

        match walker.walk(&self.config.base_url, &cancel).await {
            Err(index_failure) => {
                warn!(%index_failure, "run failed before any category was visited");
                run.fail(vec![PageError {
                    page: self.config.base_url.clone(),
                    reason: index_failure.to_string(),
                }]);
            }
            Ok(outcome) if outcome.cancelled => {
                // Cancelled runs never touch the store; partial records are
                // discarded.
                info!(
                    books_discarded = outcome.books.len(),
                    "run cancelled, discarding partial records"
                );
                run.fail(outcome.errors);
            }
            Ok(outcome) => {
                let stats = RunStatistics::from_books(&outcome.books);
                match CatalogExporter::export(&outcome.books, &store_path) {
                    Ok(result) => {
                        info!(
                            books = result.records_written,
                            categories = stats.total_categories,
                            page_errors = outcome.errors.len(),
                            parse_warnings = outcome.parse_warnings,
                            "run completed"
                        );
                        for (category, count) in &stats.categories_breakdown {
                            tracing::debug!(category = %category, count = *count, "category breakdown");
                        }
                        run.complete(
                            result.records_written as u64,
                            outcome.categories_visited,
                            outcome.errors,
                        );
                    }
                    Err(export_error) => {
                        error!(%export_error, "store export failed");
                        let mut errors = outcome.errors;
                        errors.push(PageError {
                            page: store_path.display().to_string(),
                            reason: export_error.to_string(),
                        });
                        run.fail(errors);
                    }
                }
            }
        }

        if let Err(history_error) = self.history.append(&run) {
            // The run outcome stands even when the audit write fails.
            warn!(%history_error, "failed to append run to history log");
        }

        let mut runs = lock_unpoisoned(&self.runs);
        if let Some(entry) = runs.get_mut(&run_id) {
            entry.run = run;
        }
    }
}

/// Marks a run `Failed` if its task unwinds without reaching the normal
/// finalization path.
struct FinalizeGuard {
    service: Arc<ScrapeService>,
    run_id: String,
    armed: bool,
}

impl FinalizeGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FinalizeGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut runs = lock_unpoisoned(&self.service.runs);
        if let Some(entry) = runs.get_mut(&self.run_id)
            && entry.run.is_running()
        {
            error!(run_id = %self.run_id, "scrape task exited abnormally, marking run failed");
            entry.run.fail(vec![PageError {
                page: self.service.config.base_url.clone(),
                reason: "scrape task exited abnormally".to_string(),
            }]);
        }
    }
}

impl std::fmt::Debug for ScrapeService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScrapeService")
            .field("base_url", &self.config.base_url)
            .field("history", &self.history.path())
            .finish_non_exhaustive()
    }
}

fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
