//! Bookdex Core Library
//!
//! This library provides the core functionality for the bookdex tool, which
//! crawls a paginated book catalog site, persists the extracted records as a
//! CSV store with a per-run history log, and serves the records back through
//! a cached query layer.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - HTTP page fetching with retry and backoff
//! - [`scrape`] - HTML extraction, pagination walking, run orchestration
//! - [`catalog`] - Durable store, history log, cache, and queries
//! - [`config`] - Defaults and optional config-file loading

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod catalog;
pub mod config;
pub mod fetch;
pub mod scrape;

// Re-export commonly used types
pub use catalog::{
    BookRecord, CacheError, CatalogCache, CatalogExporter, CatalogQuery, CatalogQueryService,
    HistoryLog, Page, QueryFilters, Rating, SortField, SortOrder,
};
pub use config::{ScraperConfig, load_config};
pub use fetch::{
    DEFAULT_MAX_RETRIES, FailureType, FetchError, HttpFetcher, PageFetcher, RetryDecision,
    RetryPolicy, classify_error,
};
pub use scrape::{
    CancelFlag, PaginationWalker, RunOptions, RunStatus, ScrapeRun, ScrapeService,
    ScrapeServiceError,
};
