use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::model::{EntrySource, LinkedComponent, Lookup};
use crate::traits::{RegistryClient, StoreError, TrackerStore};

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    /// Linked registry components examined
    pub checked: usize,
    /// Components newly flagged with an available update
    pub updated: usize,
    /// Components whose lookup failed, returned nothing usable, or could not be saved
    pub skipped: usize,
}

/// Detects catalog version changes for linked registry components.
pub struct UpdateChecker {
    store: Arc<dyn TrackerStore>,
    registry: Arc<dyn RegistryClient>,
}

impl UpdateChecker {
    pub fn new(store: Arc<dyn TrackerStore>, registry: Arc<dyn RegistryClient>) -> Self {
        Self { store, registry }
    }

    /// Looks up each linked registry entry and records version drift.
    ///
    /// A changed version updates the entry and flags the component. An
    /// unchanged version mutates nothing, so repeated runs are stable.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the store is unavailable.
    pub async fn check_for_updates(&self) -> Result<UpdateReport, StoreError> {
        let start = std::time::Instant::now();
        let linked = self.store.list_linked(Some(EntrySource::Registry)).await?;
        let mut report = UpdateReport::default();

        for LinkedComponent { component, entry } in linked {
            report.checked += 1;

            let remote = match self.registry.lookup_by_key(&entry.key).await {
                Ok(Lookup::Found(item)) => item.version,
                Ok(Lookup::NotFound) => {
                    debug!(key = %entry.key, "Linked entry no longer in registry");
                    None
                }
                Err(e) => {
                    warn!(key = %entry.key, error = %e, "Update lookup failed");
                    None
                }
            };
            let Some(remote) = remote else {
                report.skipped += 1;
                continue;
            };

            if entry.last_version.as_deref() == Some(remote.as_str()) {
                continue;
            }

            match self
                .store
                .record_drift(&entry.key, &component.slug, &remote, Utc::now())
                .await
            {
                Ok(()) => {
                    report.updated += 1;
                    info!(
                        slug = %component.slug,
                        key = %entry.key,
                        from = ?entry.last_version,
                        to = %remote,
                        "Update available"
                    );
                }
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    warn!(slug = %component.slug, error = %e, "Failed to record update");
                    report.skipped += 1;
                }
            }
        }

        info!(
            checked = report.checked,
            updated = report.updated,
            skipped = report.skipped,
            duration_ms = start.elapsed().as_millis() as u64,
            "Update check completed"
        );
        Ok(report)
    }
}
