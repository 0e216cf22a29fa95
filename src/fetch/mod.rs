//! HTTP page fetching with classified failures and bounded retry.
//!
//! This module provides the network leaf of the ingestion pipeline:
//!
//! - [`PageFetcher`] / [`HttpFetcher`] - one request per call, timeouts
//!   configured at client build time
//! - [`FetchError`] - structured errors distinguishing transient from fatal
//!   conditions
//! - [`RetryPolicy`] / [`fetch_with_retry`] - bounded exponential backoff
//!   over a fetcher
//!
//! # Example
//!
//! ```no_run
//! use bookdex::fetch::{HttpFetcher, RetryPolicy, fetch_with_retry};
//!
//! # async fn example() {
//! let fetcher = HttpFetcher::new();
//! let policy = RetryPolicy::default();
//! match fetch_with_retry(&fetcher, &policy, "https://books.toscrape.com/").await {
//!     Ok(page) => println!("{} bytes", page.body.len()),
//!     Err(failed) => println!("gave up: {failed}"),
//! }
//! # }
//! ```

mod client;
mod error;
mod retry;

pub use client::{HttpFetcher, PageFetcher, RawPage, USER_AGENT};
pub use error::FetchError;
pub use retry::{
    DEFAULT_MAX_RETRIES, FailureType, PageFetchFailed, RetryDecision, RetryPolicy, classify_error,
    fetch_with_retry,
};
