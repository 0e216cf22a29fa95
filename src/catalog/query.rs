//! Read-side query service over the cached catalog.
//!
//! Filtering, sorting, and pagination happen against the current cache
//! snapshot; every query transparently revalidates the cache first, so read
//! clients always see the latest exported store.

use std::cmp::Ordering;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::cache::{CacheError, CatalogCache};
use super::record::BookRecord;

/// Hard ceiling on page size, to bound response size.
pub const MAX_PAGE_LIMIT: usize = 100;

/// Page size used when the caller does not specify one.
pub const DEFAULT_PAGE_LIMIT: usize = 20;

/// Field to sort by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    /// Case-insensitive title.
    #[default]
    Title,
    /// Numeric price.
    Price,
    /// Numeric rating.
    Rating,
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    /// Ascending.
    #[default]
    Asc,
    /// Descending.
    Desc,
}

/// Record filters; all present filters must match (conjunction).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    /// Exact category match, case-insensitive.
    pub category: Option<String>,
    /// Title substring match, case-insensitive.
    pub title_contains: Option<String>,
    /// Inclusive lower price bound.
    pub min_price: Option<f64>,
    /// Inclusive upper price bound.
    pub max_price: Option<f64>,
    /// Minimum rating (1-5).
    pub min_rating: Option<u8>,
}

/// One catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogQuery {
    /// Filters to apply.
    pub filters: QueryFilters,
    /// Sort field.
    pub sort: SortField,
    /// Sort direction.
    pub order: SortOrder,
    /// 1-indexed page number.
    pub page: usize,
    /// Page size; clamped to [`MAX_PAGE_LIMIT`].
    pub limit: usize,
}

impl Default for CatalogQuery {
    fn default() -> Self {
        Self {
            filters: QueryFilters::default(),
            sort: SortField::default(),
            order: SortOrder::default(),
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

/// One page of query results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    /// The records on this page.
    pub items: Vec<T>,
    /// Total records matching the filters, across all pages.
    pub total_count: usize,
    /// The (clamped) page number that was served.
    pub page: usize,
    /// The (clamped) page size that was applied.
    pub limit: usize,
    /// Whether another page follows this one.
    pub has_next: bool,
}

/// Filters, sorts, and paginates the cached catalog for read clients.
#[derive(Debug, Clone)]
pub struct CatalogQueryService {
    cache: Arc<CatalogCache>,
}

impl CatalogQueryService {
    /// Creates a query service over the given cache.
    #[must_use]
    pub fn new(cache: Arc<CatalogCache>) -> Self {
        Self { cache }
    }

    /// Runs one query against the current snapshot.
    ///
    /// Results are deterministic across calls: the sort is stable with an
    /// ascending-id tiebreak, so paging through equal primary keys never
    /// reshuffles.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DataUnavailable`] when the durable store is
    /// missing or unreadable. An empty result set is NOT an error.
    pub fn query(&self, query: &CatalogQuery) -> Result<Page<BookRecord>, CacheError> {
        let snapshot = self.cache.get()?;

        let mut matches: Vec<&BookRecord> = snapshot
            .records()
            .iter()
            .filter(|record| matches_filters(record, &query.filters))
            .collect();

        matches.sort_by(|a, b| compare(a, b, query.sort, query.order));

        let page = query.page.max(1);
        let limit = query.limit.clamp(1, MAX_PAGE_LIMIT);
        let total_count = matches.len();
        let start = (page - 1).saturating_mul(limit);

        let items: Vec<BookRecord> = matches
            .into_iter()
            .skip(start)
            .take(limit)
            .cloned()
            .collect();
        let has_next = start.saturating_add(limit) < total_count;

        Ok(Page {
            items,
            total_count,
            page,
            limit,
            has_next,
        })
    }
}

fn matches_filters(record: &BookRecord, filters: &QueryFilters) -> bool {
    if let Some(category) = &filters.category
        && !record.category.eq_ignore_ascii_case(category)
    {
        return false;
    }
    if let Some(needle) = &filters.title_contains
        && !record
            .title
            .to_lowercase()
            .contains(&needle.to_lowercase())
    {
        return false;
    }
    if let Some(min) = filters.min_price
        && record.price < min
    {
        return false;
    }
    if let Some(max) = filters.max_price
        && record.price > max
    {
        return false;
    }
    if let Some(min) = filters.min_rating
        && record.rating.as_numeric() < min
    {
        return false;
    }
    true
}

fn compare(a: &BookRecord, b: &BookRecord, sort: SortField, order: SortOrder) -> Ordering {
    let primary = match sort {
        SortField::Title => a.title.to_lowercase().cmp(&b.title.to_lowercase()),
        SortField::Price => a.price.total_cmp(&b.price),
        SortField::Rating => a.rating.cmp(&b.rating),
    };
    let primary = match order {
        SortOrder::Asc => primary,
        SortOrder::Desc => primary.reverse(),
    };
    // Ascending id tiebreak keeps paging deterministic regardless of the
    // primary direction.
    primary.then_with(|| a.id.cmp(&b.id))
}
