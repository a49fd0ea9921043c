use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::model::{
    changelog_url, EntryRecord, EntrySource, EntryStatus, Upsert, INDEXER_CURSOR_KEY,
    INDEXER_LAST_RUN_KEY,
};
use crate::traits::{RegistryClient, StoreError, TrackerStore};

/// Incrementally mirrors the registry catalog, one page per call.
///
/// The page cursor lives in the store, so indexing resumes where it left off
/// across restarts. A short page marks the end of the catalog and wraps the
/// cursor back to page 1.
pub struct CatalogIndexer {
    store: Arc<dyn TrackerStore>,
    registry: Arc<dyn RegistryClient>,
    site_base: String,
    page_size: u32,
}

/// Result of one page that was actually fetched.
struct Batch {
    inserted: usize,
    next_page: u32,
}

impl CatalogIndexer {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        registry: Arc<dyn RegistryClient>,
        site_base: impl Into<String>,
        page_size: u32,
    ) -> Self {
        Self {
            store,
            registry,
            site_base: site_base.into(),
            page_size: page_size.max(1),
        }
    }

    /// Next page to fetch; 1 when unset or unreadable.
    pub async fn cursor(&self) -> Result<u32, StoreError> {
        let raw = self.store.get_state(INDEXER_CURSOR_KEY).await?;
        Ok(match raw.as_deref().map(str::parse::<u32>) {
            Some(Ok(page)) if page >= 1 => page,
            Some(_) => {
                warn!(value = ?raw, "Ignoring invalid catalog cursor");
                1
            }
            None => 1,
        })
    }

    /// Fetches the page at the cursor and upserts its items.
    ///
    /// Returns the number of newly inserted entries. A registry failure
    /// yields `Ok(0)` and leaves the cursor where it was.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the store is unavailable or the cursor cannot
    /// be saved.
    pub async fn index_next_batch(&self) -> Result<usize, StoreError> {
        Ok(self.fetch_batch().await?.map_or(0, |batch| batch.inserted))
    }

    /// Runs up to `batches` consecutive batches, stopping early when the
    /// registry fails or the catalog wraps around.
    pub async fn index_batches(&self, batches: u32) -> Result<usize, StoreError> {
        let mut inserted = 0;
        for _ in 0..batches {
            match self.fetch_batch().await? {
                Some(batch) => {
                    inserted += batch.inserted;
                    if batch.next_page == 1 {
                        break;
                    }
                }
                None => break,
            }
        }
        Ok(inserted)
    }

    /// Seeds a sparse catalog: indexes `batches` pages while fewer than
    /// `threshold` entries exist, otherwise does nothing.
    pub async fn warm_up(&self, threshold: u64, batches: u32) -> Result<usize, StoreError> {
        let existing = self.store.count_entries().await?;
        if existing >= threshold {
            debug!(existing, threshold, "Catalog already populated; skipping warm-up");
            return Ok(0);
        }
        info!(existing, threshold, batches, "Warming up catalog");
        self.index_batches(batches).await
    }

    async fn fetch_batch(&self) -> Result<Option<Batch>, StoreError> {
        let start = std::time::Instant::now();
        let page = self.cursor().await?;

        let items = match self.registry.list_page(page, self.page_size).await {
            Ok(items) => items,
            Err(e) => {
                warn!(page, error = %e, "Catalog page fetch failed; cursor unchanged");
                return Ok(None);
            }
        };

        let checked_at = Utc::now();
        let mut inserted = 0;
        for item in &items {
            if item.key.is_empty() {
                warn!(page, "Skipping catalog item without a key");
                continue;
            }
            let record = EntryRecord {
                key: item.key.clone(),
                display_name: item.display_name.clone(),
                changelog_url: changelog_url(&self.site_base, &item.key),
                last_version: item.version.clone(),
                source: EntrySource::Registry,
                status: EntryStatus::Discovered,
                checked_at,
            };
            match self.store.upsert_entry(&record).await {
                Ok(Upsert::Inserted) => inserted += 1,
                Ok(Upsert::Updated) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => warn!(key = %item.key, error = %e, "Skipping catalog item"),
            }
        }

        let next_page = if items.len() < self.page_size as usize {
            1
        } else {
            page + 1
        };
        self.store
            .set_state(INDEXER_CURSOR_KEY, &next_page.to_string())
            .await?;
        self.store
            .set_state(INDEXER_LAST_RUN_KEY, &checked_at.timestamp().to_string())
            .await?;

        info!(
            page,
            fetched = items.len(),
            inserted,
            next_page,
            duration_ms = start.elapsed().as_millis() as u64,
            "Indexed catalog page"
        );
        Ok(Some(Batch {
            inserted,
            next_page,
        }))
    }
}
