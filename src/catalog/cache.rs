//! Fingerprinted in-memory view of the durable store.
//!
//! [`CatalogCache`] holds at most one [`CacheSnapshot`]. Every [`get`]
//! revalidates the store's fingerprint (modification time + size) and reloads
//! on mismatch. Readers share the current snapshot through an `Arc` and are
//! never blocked for the duration of a reload: the new snapshot is parsed off
//! the read/write lock and swapped in under a short exclusive section, with a
//! separate reload mutex so concurrent stale readers trigger exactly one
//! reload.
//!
//! [`get`]: CatalogCache::get

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::SystemTime;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::record::{BookRecord, Rating, parse_price};

/// Cheap change detector for the durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    mtime: SystemTime,
    size: u64,
}

impl Fingerprint {
    /// Stats the store file.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DataUnavailable`] when the file is missing or
    /// cannot be statted.
    pub fn of(path: &Path) -> Result<Self, CacheError> {
        let meta = fs::metadata(path).map_err(|e| CacheError::unavailable(path, e.to_string()))?;
        let mtime = meta
            .modified()
            .map_err(|e| CacheError::unavailable(path, e.to_string()))?;
        Ok(Self {
            mtime,
            size: meta.len(),
        })
    }
}

/// Errors from the read path of the catalog.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The durable store is missing or unreadable. Distinct from an empty
    /// result set, which is a normal query outcome.
    #[error("catalog store unavailable at {path}: {reason}")]
    DataUnavailable {
        /// The store path.
        path: PathBuf,
        /// Why it could not be read.
        reason: String,
    },
}

impl CacheError {
    fn unavailable(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::DataUnavailable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Immutable in-memory projection of the durable store.
///
/// Owned by the cache; callers only ever see it behind an `Arc`.
#[derive(Debug)]
pub struct CacheSnapshot {
    records: Vec<BookRecord>,
    fingerprint: Fingerprint,
}

impl CacheSnapshot {
    /// The records, in store order.
    #[must_use]
    pub fn records(&self) -> &[BookRecord] {
        &self.records
    }

    /// The store fingerprint this snapshot was loaded from.
    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }
}

/// Process-wide, lazily populated view of the durable store.
///
/// Construct once and share by reference (or `Arc`) with the query service.
#[derive(Debug)]
pub struct CatalogCache {
    store_path: PathBuf,
    snapshot: RwLock<Option<Arc<CacheSnapshot>>>,
    // Serializes reloads so concurrent stale readers parse the store once.
    reload: Mutex<()>,
}

impl CatalogCache {
    /// Creates an empty cache over the store at `store_path`.
    #[must_use]
    pub fn new(store_path: impl Into<PathBuf>) -> Self {
        Self {
            store_path: store_path.into(),
            snapshot: RwLock::new(None),
            reload: Mutex::new(()),
        }
    }

    /// Returns the store path this cache watches.
    #[must_use]
    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    /// Returns the current snapshot, reloading first if the store changed.
    ///
    /// Two consecutive calls with an unchanged store return the same snapshot
    /// instance (no redundant reload).
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::DataUnavailable`] when the store is missing or
    /// unreadable; a stale or empty snapshot is never silently returned.
    pub fn get(&self) -> Result<Arc<CacheSnapshot>, CacheError> {
        let current = Fingerprint::of(&self.store_path)?;

        if let Some(snapshot) = self.read_snapshot()
            && snapshot.fingerprint() == current
        {
            return Ok(snapshot);
        }

        // Stale or empty: take the reload lock, re-check (another caller may
        // have just reloaded), then parse off the RwLock and swap.
        let _reload_guard = lock_unpoisoned(&self.reload);

        let current = Fingerprint::of(&self.store_path)?;
        if let Some(snapshot) = self.read_snapshot()
            && snapshot.fingerprint() == current
        {
            return Ok(snapshot);
        }

        debug!(path = %self.store_path.display(), "store fingerprint changed, reloading");
        let records = load_store(&self.store_path)?;
        let snapshot = Arc::new(CacheSnapshot {
            records,
            fingerprint: current,
        });

        {
            let mut slot = self
                .snapshot
                .write()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            *slot = Some(Arc::clone(&snapshot));
        }

        info!(
            path = %self.store_path.display(),
            records = snapshot.records().len(),
            "catalog snapshot loaded"
        );
        Ok(snapshot)
    }

    fn read_snapshot(&self) -> Option<Arc<CacheSnapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

fn lock_unpoisoned<'a, T>(mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
    mutex
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Parses the store CSV into records.
///
/// Rows with an unparsable rating or price are skipped with a warning, the
/// way malformed entries are skipped at scrape time. IDs are the 1-based
/// positions of the surviving rows.
fn load_store(path: &Path) -> Result<Vec<BookRecord>, CacheError> {
    let mut reader =
        csv::Reader::from_path(path).map_err(|e| CacheError::unavailable(path, e.to_string()))?;

    let mut records = Vec::new();
    for (row_index, row) in reader.records().enumerate() {
        let row = row.map_err(|e| CacheError::unavailable(path, e.to_string()))?;

        let title = row.get(0).unwrap_or_default().trim().to_string();
        let price_display = row.get(1).unwrap_or_default().trim().to_string();
        let rating_text = row.get(2).unwrap_or_default().trim();
        let availability = row.get(4).unwrap_or_default().trim().to_string();
        let category = super::record::normalize_category(row.get(5).unwrap_or_default());
        let image_url = row.get(6).unwrap_or_default().trim().to_string();

        let Ok(rating) = rating_text.parse::<Rating>() else {
            warn!(row = row_index + 2, rating = rating_text, "skipping row with invalid rating");
            continue;
        };
        let Some(price) = parse_price(&price_display) else {
            warn!(row = row_index + 2, price = %price_display, "skipping row with invalid price");
            continue;
        };
        if title.is_empty() {
            warn!(row = row_index + 2, "skipping row with empty title");
            continue;
        }

        records.push(BookRecord {
            id: records.len() as u64 + 1,
            title,
            price,
            price_display,
            rating,
            availability,
            category,
            image_url,
        });
    }

    Ok(records)
}
