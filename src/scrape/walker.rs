//! Pagination walker: drives fetch + parse across categories and pages.
//!
//! The walker is a three-state machine: discover the category index, walk
//! each category's page chain, done. It is deliberately sequential (one
//! request in flight at a time) so the politeness delay and the cycle guard
//! stay deterministic.
//!
//! Failure policy: a page that exhausts its retries is recorded in the error
//! list and the walk continues with the next category; a category-index fetch
//! failure is fatal to the whole run.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::catalog::normalize_category;
use crate::fetch::{PageFetchFailed, PageFetcher, RetryPolicy, fetch_with_retry};

use super::parser::{parse_category_index, parse_listing_page};
use super::run::{PageError, ScrapedBook};

/// Default politeness delay between successive page fetches (1 second).
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

/// Cooperative cancellation flag, checked between page fetches.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates a flag in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Live progress counters shared with a status observer.
#[derive(Debug, Default)]
pub struct WalkProgress {
    /// Books scraped so far.
    pub books_scraped: AtomicU64,
    /// Categories entered so far.
    pub categories_visited: AtomicU64,
}

/// The finite record sequence and error list a walk produced.
#[derive(Debug)]
pub struct WalkOutcome {
    /// All successfully scraped books, in traversal order.
    pub books: Vec<ScrapedBook>,
    /// Pages that were given up on.
    pub errors: Vec<PageError>,
    /// Entries skipped as malformed across all parsed pages.
    pub parse_warnings: u64,
    /// Categories the walker entered.
    pub categories_visited: u64,
    /// Whether the walk stopped early on a cancellation request.
    pub cancelled: bool,
}

/// The category index could not be fetched; no work is possible.
#[derive(Debug, Error)]
#[error("category index fetch failed: {source}")]
pub struct IndexFetchFailed {
    /// The terminal page failure.
    #[source]
    pub source: PageFetchFailed,
}

/// Sequential category/page traversal over a [`PageFetcher`].
pub struct PaginationWalker {
    fetcher: Arc<dyn PageFetcher>,
    policy: RetryPolicy,
    page_delay: Duration,
    progress: Option<Arc<WalkProgress>>,
}

impl PaginationWalker {
    /// Creates a walker over the given fetcher.
    #[must_use]
    pub fn new(fetcher: Arc<dyn PageFetcher>, policy: RetryPolicy, page_delay: Duration) -> Self {
        Self {
            fetcher,
            policy,
            page_delay,
            progress: None,
        }
    }

    /// Attaches live progress counters for an external status observer.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<WalkProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Walks the whole catalog starting from the index page.
    ///
    /// Fetches the category index once, then each category's page chain. A
    /// malformed "next" link pointing at an already-visited URL within the
    /// same category terminates that category (cycle guard). The cancellation
    /// flag is checked between page fetches, never mid-fetch.
    ///
    /// # Errors
    ///
    /// Returns [`IndexFetchFailed`] when the index page cannot be fetched;
    /// every other failure is recorded in the outcome's error list instead.
    #[instrument(skip(self, cancel))]
    pub async fn walk(
        &self,
        index_url: &str,
        cancel: &CancelFlag,
    ) -> Result<WalkOutcome, IndexFetchFailed> {
        let index_page = fetch_with_retry(self.fetcher.as_ref(), &self.policy, index_url)
            .await
            .map_err(|source| IndexFetchFailed { source })?;

        let categories = parse_category_index(&index_page.body, &index_page.url);
        info!(categories = categories.len(), "discovered category index");

        let mut books: Vec<ScrapedBook> = Vec::new();
        let mut errors: Vec<PageError> = Vec::new();
        let mut parse_warnings: u64 = 0;
        let mut categories_visited: u64 = 0;
        // Keys of the category index are unique; a duplicate name keeps the
        // first start URL.
        let mut seen_names: HashSet<String> = HashSet::new();

        for category in categories {
            if !seen_names.insert(category.name.clone()) {
                debug!(category = %category.name, "duplicate category name, keeping first");
                continue;
            }

            if cancel.is_cancelled() {
                warn!("cancellation requested, stopping walk");
                return Ok(self.cancelled_outcome(books, errors, parse_warnings, categories_visited));
            }

            categories_visited += 1;
            if let Some(progress) = &self.progress {
                progress.categories_visited.fetch_add(1, Ordering::Relaxed);
            }

            let category_name = normalize_category(&category.name);
            let mut visited: HashSet<String> = HashSet::new();
            let mut current = Some(category.url);
            let mut page_num = 1u32;

            while let Some(url) = current.take() {
                if cancel.is_cancelled() {
                    warn!("cancellation requested, stopping walk");
                    return Ok(self.cancelled_outcome(books, errors, parse_warnings, categories_visited));
                }

                // Cycle guard: a malformed next link must never loop forever.
                if !visited.insert(url.clone()) {
                    warn!(category = %category_name, url, "next link revisits a walked page, ending category");
                    break;
                }

                tokio::time::sleep(self.page_delay).await;

                debug!(category = %category_name, page = page_num, url, "fetching listing page");
                match fetch_with_retry(self.fetcher.as_ref(), &self.policy, &url).await {
                    Ok(page) => {
                        let parsed = parse_listing_page(&page.body, &page.url);
                        parse_warnings += parsed.warnings.len() as u64;
                        if let Some(progress) = &self.progress {
                            progress
                                .books_scraped
                                .fetch_add(parsed.books.len() as u64, Ordering::Relaxed);
                        }
                        books.extend(parsed.books.into_iter().map(|fields| ScrapedBook {
                            title: fields.title,
                            price_display: fields.price_display,
                            price: fields.price,
                            rating: fields.rating,
                            availability: fields.availability,
                            category: category_name.clone(),
                            image_url: fields.image_url,
                        }));
                        current = parsed.next_page;
                        page_num += 1;
                    }
                    Err(failed) => {
                        // Without this page there is no next link either;
                        // record the failure and move to the next category.
                        errors.push(PageError {
                            page: failed.url.clone(),
                            reason: failed.to_string(),
                        });
                        break;
                    }
                }
            }

            debug!(category = %category_name, total = books.len(), "category done");
        }

        info!(
            books = books.len(),
            errors = errors.len(),
            parse_warnings,
            categories = categories_visited,
            "walk complete"
        );
        Ok(WalkOutcome {
            books,
            errors,
            parse_warnings,
            categories_visited,
            cancelled: false,
        })
    }

    fn cancelled_outcome(
        &self,
        books: Vec<ScrapedBook>,
        errors: Vec<PageError>,
        parse_warnings: u64,
        categories_visited: u64,
    ) -> WalkOutcome {
        WalkOutcome {
            books,
            errors,
            parse_warnings,
            categories_visited,
            cancelled: true,
        }
    }
}
