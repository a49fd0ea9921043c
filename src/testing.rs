//! Test doubles and fixtures shared by the unit tests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mockall::mock;
use tempfile::TempDir;

use crate::model::{
    changelog_url, CatalogItem, ChangelogEntry, ComponentFilter, ComponentObservation,
    EntryRecord, EntrySource, EntryStatus, HostManifest, LinkedComponent, Lookup,
    MonitoredComponent, TrackerStats, UpdateNotice, Upsert,
};
use crate::store::SqliteStore;
use crate::traits::{RegistryClient, RegistryError, StoreError, TrackerStore};

pub const SITE: &str = "https://wordpress.org";

mock! {
    pub Registry {}

    #[async_trait]
    impl RegistryClient for Registry {
        async fn list_page(&self, page: u32, page_size: u32)
            -> Result<Vec<CatalogItem>, RegistryError>;
        async fn lookup_by_key(&self, key: &str) -> Result<Lookup, RegistryError>;
    }
}

mock! {
    pub Store {}

    #[async_trait]
    impl TrackerStore for Store {
        async fn find_entry(&self, key: &str) -> Result<Option<ChangelogEntry>, StoreError>;
        async fn find_entry_by_name_containing(&self, fragment: &str)
            -> Result<Option<ChangelogEntry>, StoreError>;
        async fn list_entries(&self, source: Option<EntrySource>)
            -> Result<Vec<ChangelogEntry>, StoreError>;
        async fn upsert_entry(&self, record: &EntryRecord) -> Result<Upsert, StoreError>;
        async fn insert_entry_if_absent(&self, record: &EntryRecord) -> Result<bool, StoreError>;
        async fn count_entries(&self) -> Result<u64, StoreError>;
        async fn search_entries(&self, term: &str, source: Option<EntrySource>, limit: u32)
            -> Result<Vec<ChangelogEntry>, StoreError>;
        async fn recent_updates(&self, limit: u32) -> Result<Vec<ChangelogEntry>, StoreError>;
        async fn find_component(&self, slug: &str)
            -> Result<Option<MonitoredComponent>, StoreError>;
        async fn list_components(&self, filter: ComponentFilter)
            -> Result<Vec<MonitoredComponent>, StoreError>;
        async fn list_unlinked_components(&self) -> Result<Vec<MonitoredComponent>, StoreError>;
        async fn upsert_component(&self, observation: &ComponentObservation)
            -> Result<Upsert, StoreError>;
        async fn set_component_link(&self, slug: &str, entry_key: &str) -> Result<(), StoreError>;
        async fn record_drift(&self, entry_key: &str, slug: &str, version: &str, at: DateTime<Utc>)
            -> Result<(), StoreError>;
        async fn list_linked(&self, source: Option<EntrySource>)
            -> Result<Vec<LinkedComponent>, StoreError>;
        async fn update_notices(&self, active_only: bool) -> Result<Vec<UpdateNotice>, StoreError>;
        async fn stats(&self) -> Result<TrackerStats, StoreError>;
        async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError>;
        async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError>;
    }
}

/// Fresh migrated database in a temp directory. Keep the `TempDir` alive for
/// the duration of the test.
pub fn temp_store() -> (TempDir, Arc<SqliteStore>) {
    let dir = tempfile::tempdir().expect("create temp dir");
    let store = SqliteStore::open(&dir.path().join("tracker.db")).expect("open test store");
    (dir, Arc::new(store))
}

pub fn entry_record(key: &str, name: &str, version: Option<&str>) -> EntryRecord {
    EntryRecord {
        key: key.to_string(),
        display_name: name.to_string(),
        changelog_url: changelog_url(SITE, key),
        last_version: version.map(str::to_string),
        source: EntrySource::Registry,
        status: EntryStatus::Discovered,
        checked_at: Utc::now(),
    }
}

pub fn observation(slug: &str, name: &str, version: Option<&str>) -> ComponentObservation {
    ComponentObservation {
        slug: slug.to_string(),
        display_name: name.to_string(),
        manifest_path: format!("{slug}/{slug}.php"),
        current_version: version.map(str::to_string),
        is_active: false,
        observed_at: Utc::now(),
    }
}

pub fn manifest(path: &str, name: &str, version: &str, active: bool) -> HostManifest {
    HostManifest {
        manifest_path: path.to_string(),
        display_name: name.to_string(),
        version: Some(version.to_string()),
        is_active: active,
    }
}

pub fn catalog_item(key: &str, name: &str, version: &str) -> CatalogItem {
    CatalogItem {
        key: key.to_string(),
        display_name: name.to_string(),
        version: Some(version.to_string()),
    }
}

/// A transport-class failure, as produced by an unreachable registry.
pub fn registry_down() -> RegistryError {
    RegistryError::Status {
        status: 503,
        url: "https://registry.test/info".to_string(),
    }
}
