use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::model::{changelog_url, EntryRecord, EntrySource, EntryStatus, LinkOutcome, Lookup, MatchTier};
use crate::traits::{RegistryClient, StoreError, TrackerStore};

/// Summary of a linking pass over unlinked components.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct LinkReport {
    pub attempted: usize,
    pub linked: usize,
    pub unlinked: usize,
    /// Components skipped because of a row-level store error
    pub failed: usize,
}

/// Associates monitored components with catalog entries.
///
/// Resolution order, first hit wins:
/// 1. an entry whose key equals the slug,
/// 2. the first entry (by key) whose display name contains the component's
///    display name,
/// 3. a registry lookup of the slug, inserting the entry it returns.
///
/// Not finding a match is a normal outcome, not an error.
#[derive(Clone)]
pub struct Linker {
    store: Arc<dyn TrackerStore>,
    registry: Arc<dyn RegistryClient>,
    site_base: String,
}

impl Linker {
    pub fn new(
        store: Arc<dyn TrackerStore>,
        registry: Arc<dyn RegistryClient>,
        site_base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            site_base: site_base.into(),
        }
    }

    /// Links one component. Safe to repeat: an existing link is simply re-confirmed.
    ///
    /// # Errors
    ///
    /// Only store failures are returned; registry failures leave the
    /// component unlinked.
    #[instrument(skip(self, display_name))]
    pub async fn link(&self, slug: &str, display_name: &str) -> Result<LinkOutcome, StoreError> {
        if let Some(entry) = self.store.find_entry(slug).await? {
            return self.confirm(slug, entry.key, MatchTier::Exact).await;
        }

        if !display_name.is_empty() {
            if let Some(entry) = self.store.find_entry_by_name_containing(display_name).await? {
                return self.confirm(slug, entry.key, MatchTier::Fuzzy).await;
            }
        }

        match self.registry.lookup_by_key(slug).await {
            Ok(Lookup::Found(item)) => {
                let record = EntryRecord {
                    changelog_url: changelog_url(&self.site_base, &item.key),
                    key: item.key,
                    display_name: item.display_name,
                    last_version: item.version,
                    source: EntrySource::Registry,
                    status: EntryStatus::Discovered,
                    checked_at: Utc::now(),
                };
                if self.store.insert_entry_if_absent(&record).await? {
                    info!(key = %record.key, "Discovered catalog entry through registry lookup");
                }
                self.confirm(slug, record.key, MatchTier::Remote).await
            }
            Ok(Lookup::NotFound) => {
                debug!("Component not present in registry");
                Ok(LinkOutcome::Unlinked)
            }
            Err(e) => {
                warn!(error = %e, "Registry lookup failed; leaving component unlinked");
                Ok(LinkOutcome::Unlinked)
            }
        }
    }

    async fn confirm(
        &self,
        slug: &str,
        key: String,
        tier: MatchTier,
    ) -> Result<LinkOutcome, StoreError> {
        self.store.set_component_link(slug, &key).await?;
        debug!(key = %key, ?tier, "Linked component");
        Ok(LinkOutcome::Linked { key, tier })
    }

    /// Runs [`Linker::link`] for every component that has no link yet.
    pub async fn link_unlinked(&self) -> Result<LinkReport, StoreError> {
        let pending = self.store.list_unlinked_components().await?;
        let mut report = LinkReport::default();

        for component in pending {
            report.attempted += 1;
            match self.link(&component.slug, &component.display_name).await {
                Ok(LinkOutcome::Linked { .. }) => report.linked += 1,
                Ok(LinkOutcome::Unlinked) => report.unlinked += 1,
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => {
                    warn!(slug = %component.slug, error = %e, "Failed to link component");
                    report.failed += 1;
                }
            }
        }

        info!(
            attempted = report.attempted,
            linked = report.linked,
            unlinked = report.unlinked,
            "Linking pass completed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        catalog_item, entry_record, observation, registry_down, temp_store, MockRegistry,
        MockStore, SITE,
    };

    fn never_called() -> MockRegistry {
        let mut registry = MockRegistry::new();
        registry.expect_lookup_by_key().never();
        registry
    }

    #[tokio::test]
    async fn exact_key_match_skips_the_registry() {
        let (_dir, store) = temp_store();
        store
            .upsert_component(&observation("alpha-seo", "Alpha SEO", Some("1.0")))
            .await
            .unwrap();
        store
            .upsert_entry(&entry_record("alpha-seo", "Alpha SEO", Some("1.0")))
            .await
            .unwrap();

        let linker = Linker::new(store.clone(), Arc::new(never_called()), SITE);
        let outcome = linker.link("alpha-seo", "Alpha SEO").await.unwrap();

        assert_eq!(
            outcome,
            LinkOutcome::Linked {
                key: "alpha-seo".into(),
                tier: MatchTier::Exact
            }
        );
        let component = store.find_component("alpha-seo").await.unwrap().unwrap();
        assert_eq!(component.linked_entry_key.as_deref(), Some("alpha-seo"));
    }

    #[tokio::test]
    async fn fuzzy_name_match_when_no_exact_key() {
        let (_dir, store) = temp_store();
        store
            .upsert_component(&observation("seo-booster", "SEO Booster", Some("2.0")))
            .await
            .unwrap();
        store
            .upsert_entry(&entry_record("alpha-seo-booster", "Alpha SEO Booster", Some("2.1")))
            .await
            .unwrap();

        let linker = Linker::new(store.clone(), Arc::new(never_called()), SITE);
        let outcome = linker.link("seo-booster", "SEO Booster").await.unwrap();

        assert_eq!(
            outcome,
            LinkOutcome::Linked {
                key: "alpha-seo-booster".into(),
                tier: MatchTier::Fuzzy
            }
        );
    }

    #[tokio::test]
    async fn remote_lookup_creates_and_links_entry() {
        let (_dir, store) = temp_store();
        store
            .upsert_component(&observation("gamma", "Gamma", Some("0.9")))
            .await
            .unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_lookup_by_key()
            .withf(|key: &str| key == "gamma")
            .times(1)
            .returning(|_| Ok(Lookup::Found(catalog_item("gamma", "Gamma", "1.0"))));

        let linker = Linker::new(store.clone(), Arc::new(registry), SITE);
        let outcome = linker.link("gamma", "Gamma").await.unwrap();

        assert_eq!(outcome.key(), Some("gamma"));
        let entry = store.find_entry("gamma").await.unwrap().unwrap();
        assert_eq!(entry.source, EntrySource::Registry);
        assert_eq!(entry.status, EntryStatus::Discovered);
        assert_eq!(entry.last_version.as_deref(), Some("1.0"));
        assert_eq!(entry.changelog_url, "https://wordpress.org/plugins/gamma/#developers");
    }

    #[tokio::test]
    async fn not_found_and_transport_failure_leave_component_unlinked() {
        let (_dir, store) = temp_store();
        store
            .upsert_component(&observation("ghost", "Ghost", None))
            .await
            .unwrap();
        store
            .upsert_component(&observation("flaky", "Flaky", None))
            .await
            .unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_lookup_by_key()
            .returning(|key: &str| match key {
                "ghost" => Ok(Lookup::NotFound),
                _ => Err(registry_down()),
            });

        let linker = Linker::new(store.clone(), Arc::new(registry), SITE);
        assert_eq!(linker.link("ghost", "Ghost").await.unwrap(), LinkOutcome::Unlinked);
        assert_eq!(linker.link("flaky", "Flaky").await.unwrap(), LinkOutcome::Unlinked);

        assert_eq!(store.count_entries().await.unwrap(), 0);
        let report = linker.link_unlinked().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.unlinked, 2);
    }

    #[tokio::test]
    async fn relinking_is_idempotent() {
        let (_dir, store) = temp_store();
        store
            .upsert_component(&observation("gamma", "Gamma", Some("1.0")))
            .await
            .unwrap();

        let mut registry = MockRegistry::new();
        registry
            .expect_lookup_by_key()
            .times(1)
            .returning(|_| Ok(Lookup::Found(catalog_item("gamma", "Gamma", "1.0"))));

        let linker = Linker::new(store.clone(), Arc::new(registry), SITE);
        linker.link("gamma", "Gamma").await.unwrap();
        // Second call resolves through the exact tier without another lookup.
        let again = linker.link("gamma", "Gamma").await.unwrap();

        assert_eq!(
            again,
            LinkOutcome::Linked {
                key: "gamma".into(),
                tier: MatchTier::Exact
            }
        );
        assert_eq!(store.count_entries().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn unavailable_store_aborts_linking_pass() {
        let mut store = MockStore::new();
        store
            .expect_list_unlinked_components()
            .returning(|| Err(StoreError::Unavailable("pool timed out".into())));

        let linker = Linker::new(Arc::new(store), Arc::new(never_called()), SITE);
        let err = linker.link_unlinked().await.unwrap_err();
        assert!(err.is_unavailable());
    }
}
