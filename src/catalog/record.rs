//! Catalog record types and field normalization.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel category for records whose category could not be determined.
pub const DEFAULT_CATEGORY: &str = "Default";

/// Star rating of a book, as the source renders it.
///
/// The textual and numeric forms are a total bijection: every variant maps to
/// exactly one value in 1..=5 and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Rating {
    /// One star.
    One,
    /// Two stars.
    Two,
    /// Three stars.
    Three,
    /// Four stars.
    Four,
    /// Five stars.
    Five,
}

impl Rating {
    /// Returns the numeric value (1-5).
    #[must_use]
    pub fn as_numeric(self) -> u8 {
        match self {
            Self::One => 1,
            Self::Two => 2,
            Self::Three => 3,
            Self::Four => 4,
            Self::Five => 5,
        }
    }

    /// Returns the textual form as the source writes it.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::One => "One",
            Self::Two => "Two",
            Self::Three => "Three",
            Self::Four => "Four",
            Self::Five => "Five",
        }
    }

    /// Converts a numeric value (1-5) back to a rating.
    #[must_use]
    pub fn from_numeric(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::One),
            2 => Some(Self::Two),
            3 => Some(Self::Three),
            4 => Some(Self::Four),
            5 => Some(Self::Five),
            _ => None,
        }
    }
}

impl fmt::Display for Rating {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Rating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "One" => Ok(Self::One),
            "Two" => Ok(Self::Two),
            "Three" => Ok(Self::Three),
            "Four" => Ok(Self::Four),
            "Five" => Ok(Self::Five),
            _ => Err(format!("invalid rating: {s}")),
        }
    }
}

/// One normalized catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookRecord {
    /// 1-based ordinal position within the store. Assigned at export,
    /// reconstructed from the row index at load; not stable across runs.
    pub id: u64,
    /// Book title (never empty).
    pub title: String,
    /// Normalized non-negative price.
    pub price: f64,
    /// Price as the source displays it, currency prefix included.
    pub price_display: String,
    /// Star rating.
    pub rating: Rating,
    /// Stock availability, free text (e.g. "In stock").
    pub availability: String,
    /// Category name; `Default` when the source gave none.
    pub category: String,
    /// Absolute URL of the cover image.
    pub image_url: String,
}

/// Parses a displayed price ("£51.77", "£1,234.56") into a non-negative float.
///
/// Strips the currency symbol and thousands separators. Returns `None` for
/// unparsable or negative values; zero is accepted.
#[must_use]
pub fn parse_price(display: &str) -> Option<f64> {
    let cleaned: String = display
        .trim()
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    let price: f64 = cleaned.parse().ok()?;
    if price >= 0.0 { Some(price) } else { None }
}

/// Normalizes a category name, substituting the sentinel for empty input.
#[must_use]
pub fn normalize_category(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        DEFAULT_CATEGORY.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_rating_mapping_is_total_and_bijective() {
        let all = [
            Rating::One,
            Rating::Two,
            Rating::Three,
            Rating::Four,
            Rating::Five,
        ];
        for (i, rating) in all.iter().enumerate() {
            let numeric = u8::try_from(i).unwrap() + 1;
            assert_eq!(rating.as_numeric(), numeric);
            assert_eq!(Rating::from_numeric(numeric), Some(*rating));
            assert_eq!(rating.as_str().parse::<Rating>().unwrap(), *rating);
        }
        assert_eq!(Rating::from_numeric(0), None);
        assert_eq!(Rating::from_numeric(6), None);
    }

    #[test]
    fn test_rating_rejects_unknown_text() {
        assert!("Six".parse::<Rating>().is_err());
        assert!("one".parse::<Rating>().is_err());
        assert!("".parse::<Rating>().is_err());
    }

    #[test]
    fn test_parse_price_strips_currency_prefix() {
        assert_eq!(parse_price("£51.77"), Some(51.77));
        assert_eq!(parse_price("£1,234.56"), Some(1234.56));
        assert_eq!(parse_price("  £0.00 "), Some(0.0));
    }

    #[test]
    fn test_parse_price_rejects_garbage_and_negatives() {
        assert_eq!(parse_price("invalid"), None);
        assert_eq!(parse_price(""), None);
        assert_eq!(parse_price("£-3.50"), None);
    }

    #[test]
    fn test_normalize_category_substitutes_sentinel() {
        assert_eq!(normalize_category("Fiction"), "Fiction");
        assert_eq!(normalize_category("  Poetry "), "Poetry");
        assert_eq!(normalize_category(""), DEFAULT_CATEGORY);
        assert_eq!(normalize_category("   "), DEFAULT_CATEGORY);
    }
}
