//! Scrape pipeline: HTML extraction, category/pagination walking, run state,
//! and run orchestration.

pub mod parser;
pub mod run;
pub mod service;
pub mod walker;

pub use parser::{
    parse_category_index, parse_listing_page, CategoryLink, ParseWarning, ParsedListing,
    RawBookFields,
};
pub use run::{
    new_run_id, PageError, RunStatistics, RunStatus, ScrapeRun, ScrapedBook,
};
pub use service::{RunOptions, ScrapeService, ScrapeServiceError};
pub use walker::{
    CancelFlag, IndexFetchFailed, PaginationWalker, WalkOutcome, WalkProgress, DEFAULT_PAGE_DELAY,
};
