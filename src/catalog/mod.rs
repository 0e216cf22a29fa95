//! Durable catalog store, history log, in-memory cache, and read queries.
//!
//! The write side ([`CatalogExporter`], [`HistoryLog`]) persists scrape output
//! as CSV; the read side ([`CatalogCache`], [`CatalogQueryService`]) serves it
//! back without re-reading the store on every request.

pub mod cache;
pub mod export;
pub mod query;
pub mod record;

pub use cache::{CacheError, CacheSnapshot, CatalogCache, Fingerprint};
pub use export::{
    CatalogExporter, ExportError, ExportResult, HistoryLog, HistorySummary, RunSummary,
    HISTORY_HEADERS, STORE_HEADERS,
};
pub use query::{
    CatalogQuery, CatalogQueryService, Page, QueryFilters, SortField, SortOrder,
    DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use record::{normalize_category, parse_price, BookRecord, Rating, DEFAULT_CATEGORY};
