use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::engine::linker::Linker;
use crate::manifest::derive_slug;
use crate::model::{ComponentObservation, HostManifest, Upsert};
use crate::traits::{StoreError, TrackerStore};

/// Mirrors the host's installed components into the store.
///
/// Newly seen components are linked immediately; components already known
/// only get their name, version and active flag refreshed.
pub struct Scanner {
    store: Arc<dyn TrackerStore>,
    linker: Linker,
}

impl Scanner {
    pub fn new(store: Arc<dyn TrackerStore>, linker: Linker) -> Self {
        Self { store, linker }
    }

    /// Upserts one monitored component per manifest and returns how many were new.
    ///
    /// Manifests without a derivable slug are skipped. When two manifests map
    /// to the same slug the first one wins.
    ///
    /// # Errors
    ///
    /// Returns `Err` only when the store becomes unavailable; per-component
    /// failures are logged and skipped.
    pub async fn scan(&self, manifests: &[HostManifest]) -> Result<usize, StoreError> {
        let mut seen = HashSet::new();
        let mut new_components = 0;

        for manifest in manifests {
            let Some(slug) = derive_slug(&manifest.manifest_path) else {
                warn!(path = %manifest.manifest_path, "Skipping manifest without a usable slug");
                continue;
            };
            if !seen.insert(slug.clone()) {
                debug!(slug = %slug, path = %manifest.manifest_path, "Duplicate slug in scan batch");
                continue;
            }

            let observation = ComponentObservation {
                slug,
                display_name: manifest.display_name.clone(),
                manifest_path: manifest.manifest_path.clone(),
                current_version: manifest.version.clone(),
                is_active: manifest.is_active,
                observed_at: Utc::now(),
            };

            match self.store.upsert_component(&observation).await {
                Ok(Upsert::Inserted) => {
                    new_components += 1;
                    info!(slug = %observation.slug, "Monitoring new component");
                    self.link_new(&observation).await?;
                }
                Ok(Upsert::Updated) => {}
                Err(e) if e.is_unavailable() => return Err(e),
                Err(e) => warn!(slug = %observation.slug, error = %e, "Failed to record component"),
            }
        }

        info!(
            manifests = manifests.len(),
            new_components, "Component scan completed"
        );
        Ok(new_components)
    }

    async fn link_new(&self, observation: &ComponentObservation) -> Result<(), StoreError> {
        match self
            .linker
            .link(&observation.slug, &observation.display_name)
            .await
        {
            Ok(_) => Ok(()),
            Err(e) if e.is_unavailable() => Err(e),
            Err(e) => {
                warn!(slug = %observation.slug, error = %e, "Failed to link new component");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ComponentFilter, Lookup, MonitorStatus};
    use crate::testing::{entry_record, manifest, temp_store, MockRegistry, MockStore, SITE};

    fn not_found_registry() -> Arc<MockRegistry> {
        let mut registry = MockRegistry::new();
        registry
            .expect_lookup_by_key()
            .returning(|_| Ok(Lookup::NotFound));
        Arc::new(registry)
    }

    fn scanner(store: Arc<dyn TrackerStore>, registry: Arc<MockRegistry>) -> Scanner {
        let linker = Linker::new(store.clone(), registry, SITE);
        Scanner::new(store, linker)
    }

    #[tokio::test]
    async fn new_components_are_recorded_and_linked() {
        let (_dir, store) = temp_store();
        store
            .upsert_entry(&entry_record("akismet", "Akismet Anti-Spam", Some("5.3")))
            .await
            .unwrap();

        let scanner = scanner(store.clone(), not_found_registry());
        let new = scanner
            .scan(&[
                manifest("akismet/akismet.php", "Akismet", "5.2", true),
                manifest("hello.php", "Hello Dolly", "1.7", false),
            ])
            .await
            .unwrap();

        assert_eq!(new, 2);
        let akismet = store.find_component("akismet").await.unwrap().unwrap();
        assert_eq!(akismet.status, MonitorStatus::Monitoring);
        assert!(akismet.is_active);
        assert!(akismet.notifications_enabled);
        assert!(!akismet.has_update);
        assert_eq!(akismet.linked_entry_key.as_deref(), Some("akismet"));

        let hello = store.find_component("hello").await.unwrap().unwrap();
        assert_eq!(hello.linked_entry_key, None);
    }

    #[tokio::test]
    async fn rescanning_only_refreshes_mutable_fields() {
        let (_dir, store) = temp_store();
        let scanner = scanner(store.clone(), not_found_registry());

        scanner
            .scan(&[manifest("beta/beta.php", "Beta", "1.0", false)])
            .await
            .unwrap();
        let first = store.find_component("beta").await.unwrap().unwrap();

        let new = scanner
            .scan(&[manifest("beta/beta.php", "Beta Pro", "1.1", true)])
            .await
            .unwrap();

        assert_eq!(new, 0);
        let second = store.find_component("beta").await.unwrap().unwrap();
        assert_eq!(second.display_name, "Beta Pro");
        assert_eq!(second.current_version.as_deref(), Some("1.1"));
        assert!(second.is_active);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(store.list_components(ComponentFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn malformed_and_duplicate_manifests_are_skipped() {
        let (_dir, store) = temp_store();
        let scanner = scanner(store.clone(), not_found_registry());

        let new = scanner
            .scan(&[
                manifest("", "Nameless", "1.0", false),
                manifest("../outside/evil.php", "Evil", "1.0", false),
                manifest("dup/first.php", "First", "1.0", false),
                manifest("dup/second.php", "Second", "2.0", false),
            ])
            .await
            .unwrap();

        assert_eq!(new, 1);
        let dup = store.find_component("dup").await.unwrap().unwrap();
        assert_eq!(dup.display_name, "First");
        assert_eq!(dup.manifest_path, "dup/first.php");
    }

    #[tokio::test]
    async fn empty_manifest_list_changes_nothing() {
        let (_dir, store) = temp_store();
        let scanner = scanner(store.clone(), not_found_registry());

        assert_eq!(scanner.scan(&[]).await.unwrap(), 0);
        assert!(store.list_components(ComponentFilter::All).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_scans_create_a_single_row() {
        let (_dir, store) = temp_store();
        let registry = not_found_registry();
        let a = scanner(store.clone(), registry.clone());
        let b = scanner(store.clone(), registry);
        let manifests = [manifest("racy/racy.php", "Racy", "1.0", false)];

        let (left, right) = tokio::join!(a.scan(&manifests), b.scan(&manifests));

        assert_eq!(left.unwrap() + right.unwrap(), 1);
        assert_eq!(store.list_components(ComponentFilter::All).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn row_errors_are_skipped_but_unavailable_store_aborts() {
        let mut store = MockStore::new();
        store.expect_upsert_component().returning(|obs| {
            if obs.slug == "broken" {
                Err(StoreError::Corrupt("bad row".into()))
            } else {
                Err(StoreError::Unavailable("pool exhausted".into()))
            }
        });
        let store: Arc<dyn TrackerStore> = Arc::new(store);
        let scanner = scanner(store, not_found_registry());

        let err = scanner
            .scan(&[
                manifest("broken/broken.php", "Broken", "1.0", false),
                manifest("next/next.php", "Next", "1.0", false),
            ])
            .await
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
