//! Listing-page and category-index parsing.
//!
//! This module turns one fetched page's markup into structured data:
//!
//! - [`parse_listing_page`] extracts book entries (`article.product_pod`) and
//!   the "next page" link when present
//! - [`parse_category_index`] extracts the category navigation from the site
//!   index page
//!
//! Parsing is best-effort per record: a structurally malformed entry is
//! skipped and counted as a soft warning so one bad entry never aborts its
//! page.

use scraper::{ElementRef, Html, Selector};
use tracing::warn;
use url::Url;

use crate::catalog::Rating;

/// Raw fields extracted from one book entry, before category tagging.
#[derive(Debug, Clone, PartialEq)]
pub struct RawBookFields {
    /// Book title from the anchor's `title` attribute.
    pub title: String,
    /// Price as displayed, currency prefix included.
    pub price_display: String,
    /// Normalized non-negative price.
    pub price: f64,
    /// Star rating.
    pub rating: Rating,
    /// Availability text (e.g. "In stock").
    pub availability: String,
    /// Absolute URL of the cover image.
    pub image_url: String,
}

/// A soft warning for one malformed entry on an otherwise good page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    /// The page the entry was found on.
    pub page_url: String,
    /// What was wrong with the entry.
    pub reason: String,
}

/// Result of parsing one listing page.
#[derive(Debug, Clone)]
pub struct ParsedListing {
    /// Successfully parsed book entries in page order.
    pub books: Vec<RawBookFields>,
    /// Absolute URL of the next page in this category, when one exists.
    pub next_page: Option<String>,
    /// Entries skipped because a required field was missing or malformed.
    pub warnings: Vec<ParseWarning>,
}

/// One entry of the category index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryLink {
    /// Trimmed category name.
    pub name: String,
    /// Absolute URL of the category's first listing page.
    pub url: String,
}

/// Parses a selector that is a compile-time constant.
///
/// All selectors in this module are string literals; a parse failure is a
/// programming error, not an input condition.
#[allow(clippy::expect_used)]
fn selector(s: &'static str) -> Selector {
    Selector::parse(s).expect("static selector must parse")
}

/// Parses one listing page into book entries and the next-page link.
///
/// `page_url` is the URL the page was fetched from; relative links (the next
/// page, cover images) are joined against it. Entries that are missing a
/// title, price, or rating are skipped with a warning.
#[must_use]
pub fn parse_listing_page(body: &str, page_url: &str) -> ParsedListing {
    let document = Html::parse_document(body);
    let base = Url::parse(page_url).ok();

    let mut books = Vec::new();
    let mut warnings = Vec::new();

    for entry in document.select(&selector("article.product_pod")) {
        match extract_book(entry, base.as_ref()) {
            Ok(fields) => books.push(fields),
            Err(reason) => {
                warn!(page = page_url, %reason, "skipping malformed book entry");
                warnings.push(ParseWarning {
                    page_url: page_url.to_string(),
                    reason,
                });
            }
        }
    }

    let next_page = document
        .select(&selector("li.next a[href]"))
        .next()
        .and_then(|a| a.value().attr("href"))
        .and_then(|href| resolve(href, base.as_ref()));

    ParsedListing {
        books,
        next_page,
        warnings,
    }
}

/// Parses the category navigation of the site index page.
///
/// The first anchor in the navigation is the "Books" self-link and is skipped.
/// Anchors with empty text or an unresolvable href are dropped.
#[must_use]
pub fn parse_category_index(body: &str, index_url: &str) -> Vec<CategoryLink> {
    let document = Html::parse_document(body);
    let base = Url::parse(index_url).ok();

    document
        .select(&selector("ul.nav.nav-list a[href]"))
        .skip(1)
        .filter_map(|a| {
            let name = a.text().collect::<String>().trim().to_string();
            let url = a
                .value()
                .attr("href")
                .and_then(|href| resolve(href, base.as_ref()))?;
            if name.is_empty() {
                return None;
            }
            Some(CategoryLink { name, url })
        })
        .collect()
}

/// Extracts the fields of one `article.product_pod` entry.
fn extract_book(entry: ElementRef<'_>, base: Option<&Url>) -> Result<RawBookFields, String> {
    let title = entry
        .select(&selector("h3 a"))
        .next()
        .and_then(|a| a.value().attr("title"))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| "missing title".to_string())?
        .to_string();

    let price_display = entry
        .select(&selector("p.price_color"))
        .next()
        .map(|p| p.text().collect::<String>().trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| format!("missing price for '{title}'"))?;

    let price = crate::catalog::parse_price(&price_display)
        .ok_or_else(|| format!("unparsable price '{price_display}' for '{title}'"))?;

    let rating = extract_rating(entry)
        .ok_or_else(|| format!("missing or unknown star rating for '{title}'"))?;

    let availability = entry
        .select(&selector("p.instock.availability"))
        .next()
        .map(|p| p.text().collect::<String>().trim().to_string())
        .unwrap_or_default();

    let image_url = entry
        .select(&selector("div.image_container img[src]"))
        .next()
        .and_then(|img| img.value().attr("src"))
        .and_then(|src| resolve(src, base))
        .unwrap_or_default();

    Ok(RawBookFields {
        title,
        price_display,
        price,
        rating,
        availability,
        image_url,
    })
}

/// Reads the rating from the second class of the `star-rating` element.
fn extract_rating(entry: ElementRef<'_>) -> Option<Rating> {
    let element = entry.select(&selector("p.star-rating")).next()?;
    element
        .value()
        .classes()
        .find(|class| *class != "star-rating")
        .and_then(|class| class.parse().ok())
}

/// Joins a possibly-relative href against the page URL.
fn resolve(href: &str, base: Option<&Url>) -> Option<String> {
    match base {
        Some(base) => base.join(href).ok().map(Into::into),
        None => Url::parse(href).ok().map(Into::into),
    }
}
