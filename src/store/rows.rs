use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::model::{ChangelogEntry, ComponentObservation, EntryRecord, MonitorStatus, MonitoredComponent};
use crate::store::schema::{changelog_entries, monitored_components, tracker_state};
use crate::traits::StoreError;

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = changelog_entries)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct EntryRow {
    pub entry_key: String,
    pub display_name: String,
    pub changelog_url: String,
    pub last_version: Option<String>,
    pub last_checked_at: Option<i64>,
    pub last_updated_at: Option<i64>,
    pub source: String,
    pub status: String,
    pub created_at: i64,
}

impl From<&EntryRecord> for EntryRow {
    fn from(record: &EntryRecord) -> Self {
        let at = record.checked_at.timestamp();
        Self {
            entry_key: record.key.clone(),
            display_name: record.display_name.clone(),
            changelog_url: record.changelog_url.clone(),
            last_version: record.last_version.clone(),
            last_checked_at: Some(at),
            last_updated_at: None,
            source: record.source.as_str().to_string(),
            status: record.status.as_str().to_string(),
            created_at: at,
        }
    }
}

impl TryFrom<EntryRow> for ChangelogEntry {
    type Error = StoreError;

    fn try_from(row: EntryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            source: row.source.parse().map_err(corrupt)?,
            status: row.status.parse().map_err(corrupt)?,
            last_checked_at: row.last_checked_at.map(from_unix).transpose()?,
            last_updated_at: row.last_updated_at.map(from_unix).transpose()?,
            created_at: from_unix(row.created_at)?,
            key: row.entry_key,
            display_name: row.display_name,
            changelog_url: row.changelog_url,
            last_version: row.last_version,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = monitored_components)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ComponentRow {
    pub slug: String,
    pub display_name: String,
    pub manifest_path: String,
    pub current_version: Option<String>,
    pub available_version: Option<String>,
    pub is_active: bool,
    pub has_update: bool,
    pub notifications_enabled: bool,
    pub linked_entry_key: Option<String>,
    pub status: String,
    pub last_checked_at: i64,
    pub created_at: i64,
}

impl From<&ComponentObservation> for ComponentRow {
    fn from(observation: &ComponentObservation) -> Self {
        let at = observation.observed_at.timestamp();
        Self {
            slug: observation.slug.clone(),
            display_name: observation.display_name.clone(),
            manifest_path: observation.manifest_path.clone(),
            current_version: observation.current_version.clone(),
            available_version: None,
            is_active: observation.is_active,
            has_update: false,
            notifications_enabled: true,
            linked_entry_key: None,
            status: MonitorStatus::Monitoring.as_str().to_string(),
            last_checked_at: at,
            created_at: at,
        }
    }
}

impl TryFrom<ComponentRow> for MonitoredComponent {
    type Error = StoreError;

    fn try_from(row: ComponentRow) -> Result<Self, Self::Error> {
        Ok(Self {
            status: row.status.parse().map_err(corrupt)?,
            last_checked_at: from_unix(row.last_checked_at)?,
            created_at: from_unix(row.created_at)?,
            slug: row.slug,
            display_name: row.display_name,
            manifest_path: row.manifest_path,
            current_version: row.current_version,
            available_version: row.available_version,
            is_active: row.is_active,
            has_update: row.has_update,
            notifications_enabled: row.notifications_enabled,
            linked_entry_key: row.linked_entry_key,
        })
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = tracker_state)]
pub struct NewStateRow<'a> {
    pub state_key: &'a str,
    pub state_value: &'a str,
    pub updated_at: i64,
}

pub fn from_unix(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Corrupt(format!("timestamp out of range: {secs}")))
}

fn corrupt(err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(err.to_string())
}
