use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A persisted enum column held a value this build does not know.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Where a catalog entry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntrySource {
    /// Ingested from or discovered through the registry API
    Registry,
    /// Tracked outside the registry (commercial or self-hosted components)
    External,
    /// Added by hand
    Manual,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntrySource::Registry => "registry",
            EntrySource::External => "external",
            EntrySource::Manual => "manual",
        }
    }
}

impl FromStr for EntrySource {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "registry" => Ok(EntrySource::Registry),
            "external" => Ok(EntrySource::External),
            "manual" => Ok(EntrySource::Manual),
            other => Err(UnknownVariant {
                kind: "entry source",
                value: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for EntrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Active,
    Discovered,
    Error,
}

impl EntryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryStatus::Active => "active",
            EntryStatus::Discovered => "discovered",
            EntryStatus::Error => "error",
        }
    }
}

impl FromStr for EntryStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(EntryStatus::Active),
            "discovered" => Ok(EntryStatus::Discovered),
            "error" => Ok(EntryStatus::Error),
            other => Err(UnknownVariant {
                kind: "entry status",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    Monitoring,
    Paused,
    Error,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Monitoring => "monitoring",
            MonitorStatus::Paused => "paused",
            MonitorStatus::Error => "error",
        }
    }
}

impl FromStr for MonitorStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "monitoring" => Ok(MonitorStatus::Monitoring),
            "paused" => Ok(MonitorStatus::Paused),
            "error" => Ok(MonitorStatus::Error),
            other => Err(UnknownVariant {
                kind: "monitor status",
                value: other.to_string(),
            }),
        }
    }
}

/// Catalog-cached record for one external component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangelogEntry {
    /// Canonical catalog identifier, immutable once assigned
    pub key: String,
    pub display_name: String,
    /// Always derived from `key`, see [`changelog_url`]
    pub changelog_url: String,
    pub last_version: Option<String>,
    pub last_checked_at: Option<DateTime<Utc>>,
    pub last_updated_at: Option<DateTime<Utc>>,
    pub source: EntrySource,
    pub status: EntryStatus,
    pub created_at: DateTime<Utc>,
}

/// Local watch-list entry for one host-installed component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredComponent {
    pub slug: String,
    pub display_name: String,
    pub manifest_path: String,
    pub current_version: Option<String>,
    pub available_version: Option<String>,
    pub is_active: bool,
    pub has_update: bool,
    pub notifications_enabled: bool,
    /// Weak reference to [`ChangelogEntry::key`]; may dangle
    pub linked_entry_key: Option<String>,
    pub status: MonitorStatus,
    pub last_checked_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// A monitored component together with the entry its link resolves to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkedComponent {
    pub component: MonitoredComponent,
    pub entry: ChangelogEntry,
}

/// One installed component as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostManifest {
    /// Manifest file path relative to the host's component root,
    /// e.g. `"akismet/akismet.php"` or `"hello.php"`
    pub manifest_path: String,
    pub display_name: String,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub is_active: bool,
}

/// Scanner-side view of a manifest, ready to upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentObservation {
    pub slug: String,
    pub display_name: String,
    pub manifest_path: String,
    pub current_version: Option<String>,
    pub is_active: bool,
    pub observed_at: DateTime<Utc>,
}

/// One catalog item as returned by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub key: String,
    pub display_name: String,
    pub version: Option<String>,
}

/// Outcome of a single-key registry lookup that reached the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup {
    Found(CatalogItem),
    /// The registry authoritatively has no such key
    NotFound,
}

/// Entry fields written by ingestion paths.
///
/// On insert every field is stored; on update only `display_name`,
/// `last_version` and `last_checked_at` are refreshed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub key: String,
    pub display_name: String,
    pub changelog_url: String,
    pub last_version: Option<String>,
    pub source: EntrySource,
    pub status: EntryStatus,
    pub checked_at: DateTime<Utc>,
}

/// Whether an upsert created a row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Which tier of the linker resolved a component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    Exact,
    Fuzzy,
    Remote,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkOutcome {
    Linked { key: String, tier: MatchTier },
    Unlinked,
}

impl LinkOutcome {
    pub fn key(&self) -> Option<&str> {
        match self {
            LinkOutcome::Linked { key, .. } => Some(key),
            LinkOutcome::Unlinked => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ComponentFilter {
    #[default]
    All,
    ActiveOnly,
    UpdatesOnly,
}

/// A pending update for a monitored component, as shown to notifiers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateNotice {
    pub slug: String,
    pub display_name: String,
    pub current_version: Option<String>,
    pub available_version: Option<String>,
    pub changelog_url: String,
    pub source: EntrySource,
    pub is_active: bool,
    pub last_checked_at: DateTime<Utc>,
}

/// Aggregate counts over both collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrackerStats {
    pub total_entries: u64,
    pub registry_entries: u64,
    pub external_entries: u64,
    pub manual_entries: u64,
    pub monitored: u64,
    pub active: u64,
    pub updates_available: u64,
    /// Most recent `last_checked_at` across catalog entries
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// `tracker_state` key holding the next catalog page to fetch.
pub const INDEXER_CURSOR_KEY: &str = "indexer.cursor";
/// `tracker_state` key holding the unix time of the last successful catalog page fetch.
pub const INDEXER_LAST_RUN_KEY: &str = "indexer.last_run_at";
/// `tracker_state` key holding the unix time of the last completed reconciliation.
pub const RECONCILE_LAST_RUN_KEY: &str = "reconcile.last_run_at";

/// Changelog page for a catalog key. Never taken from registry payloads.
pub fn changelog_url(site_base: &str, key: &str) -> String {
    format!("{}/plugins/{}/#developers", site_base.trim_end_matches('/'), key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn changelog_url_is_derived_from_key() {
        assert_eq!(
            changelog_url("https://wordpress.org/", "akismet"),
            "https://wordpress.org/plugins/akismet/#developers"
        );
    }

    #[test]
    fn enum_columns_round_trip_through_text() {
        for source in [EntrySource::Registry, EntrySource::External, EntrySource::Manual] {
            assert_eq!(source.as_str().parse::<EntrySource>(), Ok(source));
        }
        assert_eq!("paused".parse::<MonitorStatus>(), Ok(MonitorStatus::Paused));
        let err = "wordpress_org".parse::<EntrySource>().unwrap_err();
        assert_eq!(err.value, "wordpress_org");
    }

    #[test]
    fn host_manifest_defaults_optional_fields() {
        let manifest: HostManifest =
            serde_json::from_str(r#"{"manifest_path":"hello.php","display_name":"Hello"}"#)
                .unwrap();
        assert_eq!(manifest.version, None);
        assert!(!manifest.is_active);
    }
}
