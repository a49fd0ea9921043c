use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::expression_methods::EscapeExpressionMethods;
use diesel::prelude::*;
use diesel::sql_types::{Integer, Text};
use diesel::sqlite::SqliteConnection;

use crate::model::{
    ChangelogEntry, ComponentFilter, ComponentObservation, EntryRecord, EntrySource,
    LinkedComponent, MonitoredComponent, TrackerStats, UpdateNotice, Upsert,
    INDEXER_LAST_RUN_KEY,
};
use crate::store::pool::{init_db_pool, DbPool};
use crate::store::rows::{from_unix, ComponentRow, EntryRow, NewStateRow};
use crate::store::schema::{changelog_entries, monitored_components, tracker_state};
use crate::traits::{StoreError, TrackerStore};

diesel::define_sql_function! {
    /// SQLite `instr`: 1-based byte position of `needle` in `haystack`, 0 when absent.
    /// Unlike `LIKE`, it is case-sensitive.
    fn instr(haystack: Text, needle: Text) -> Integer;
}

/// Diesel/SQLite implementation of [`TrackerStore`].
///
/// Queries run on tokio's blocking pool so a slow disk never stalls the
/// async callers.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Opens (creating if needed) the database file and migrates it.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let url = path.to_string_lossy();
        Ok(Self::new(init_db_pool(&url, 8)?))
    }

    async fn run<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut SqliteConnection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool
                .get()
                .map_err(|e| StoreError::Unavailable(e.to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    /// Runs raw SQL on a pooled connection. Tests use it to install triggers.
    #[cfg(test)]
    pub(crate) fn execute_sql(&self, sql: &str) -> Result<(), StoreError> {
        let mut conn = self
            .pool
            .get()
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        diesel::sql_query(sql).execute(&mut conn)?;
        Ok(())
    }
}

fn load_entries(rows: Vec<EntryRow>) -> Result<Vec<ChangelogEntry>, StoreError> {
    rows.into_iter().map(ChangelogEntry::try_from).collect()
}

fn load_components(rows: Vec<ComponentRow>) -> Result<Vec<MonitoredComponent>, StoreError> {
    rows.into_iter().map(MonitoredComponent::try_from).collect()
}

fn count_source(conn: &mut SqliteConnection, source: EntrySource) -> Result<u64, StoreError> {
    let n = changelog_entries::table
        .filter(changelog_entries::source.eq(source.as_str()))
        .count()
        .get_result::<i64>(conn)?;
    Ok(n as u64)
}

/// Escapes `LIKE` wildcards so the term matches literally.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[async_trait]
impl TrackerStore for SqliteStore {
    async fn find_entry(&self, key: &str) -> Result<Option<ChangelogEntry>, StoreError> {
        let key = key.to_string();
        self.run(move |conn| {
            changelog_entries::table
                .filter(changelog_entries::entry_key.eq(&key))
                .select(EntryRow::as_select())
                .first::<EntryRow>(conn)
                .optional()?
                .map(ChangelogEntry::try_from)
                .transpose()
        })
        .await
    }

    async fn find_entry_by_name_containing(
        &self,
        fragment: &str,
    ) -> Result<Option<ChangelogEntry>, StoreError> {
        let fragment = fragment.to_string();
        self.run(move |conn| {
            changelog_entries::table
                .filter(instr(changelog_entries::display_name, fragment).gt(0))
                .order(changelog_entries::entry_key.asc())
                .select(EntryRow::as_select())
                .first::<EntryRow>(conn)
                .optional()?
                .map(ChangelogEntry::try_from)
                .transpose()
        })
        .await
    }

    async fn list_entries(
        &self,
        source: Option<EntrySource>,
    ) -> Result<Vec<ChangelogEntry>, StoreError> {
        self.run(move |conn| {
            let mut query = changelog_entries::table
                .select(EntryRow::as_select())
                .order(changelog_entries::display_name.asc())
                .into_boxed();
            if let Some(source) = source {
                query = query.filter(changelog_entries::source.eq(source.as_str()));
            }
            load_entries(query.load(conn)?)
        })
        .await
    }

    async fn upsert_entry(&self, record: &EntryRecord) -> Result<Upsert, StoreError> {
        let row = EntryRow::from(record);
        self.run(move |conn| {
            conn.immediate_transaction(|conn| {
                let inserted = diesel::insert_into(changelog_entries::table)
                    .values(&row)
                    .on_conflict(changelog_entries::entry_key)
                    .do_nothing()
                    .execute(conn)?;
                if inserted == 1 {
                    return Ok(Upsert::Inserted);
                }

                diesel::update(
                    changelog_entries::table
                        .filter(changelog_entries::entry_key.eq(row.entry_key.as_str())),
                )
                .set((
                    changelog_entries::display_name.eq(row.display_name.as_str()),
                    changelog_entries::last_version.eq(row.last_version.as_deref()),
                    changelog_entries::last_checked_at.eq(row.last_checked_at),
                ))
                .execute(conn)?;
                Ok(Upsert::Updated)
            })
        })
        .await
    }

    async fn insert_entry_if_absent(&self, record: &EntryRecord) -> Result<bool, StoreError> {
        let row = EntryRow::from(record);
        self.run(move |conn| {
            let inserted = diesel::insert_into(changelog_entries::table)
                .values(&row)
                .on_conflict(changelog_entries::entry_key)
                .do_nothing()
                .execute(conn)?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn count_entries(&self) -> Result<u64, StoreError> {
        self.run(|conn| {
            let n = changelog_entries::table.count().get_result::<i64>(conn)?;
            Ok(n as u64)
        })
        .await
    }

    async fn search_entries(
        &self,
        term: &str,
        source: Option<EntrySource>,
        limit: u32,
    ) -> Result<Vec<ChangelogEntry>, StoreError> {
        let pattern = like_pattern(term);
        self.run(move |conn| {
            let mut query = changelog_entries::table
                .select(EntryRow::as_select())
                .filter(
                    changelog_entries::display_name
                        .like(pattern.clone())
                        .escape('\\')
                        .or(changelog_entries::entry_key.like(pattern).escape('\\')),
                )
                .into_boxed();
            if let Some(source) = source {
                query = query.filter(changelog_entries::source.eq(source.as_str()));
            }
            let rows = query
                .order(changelog_entries::display_name.asc())
                .limit(i64::from(limit))
                .load(conn)?;
            load_entries(rows)
        })
        .await
    }

    async fn recent_updates(&self, limit: u32) -> Result<Vec<ChangelogEntry>, StoreError> {
        self.run(move |conn| {
            let rows = changelog_entries::table
                .filter(changelog_entries::last_updated_at.is_not_null())
                .order(changelog_entries::last_updated_at.desc())
                .limit(i64::from(limit))
                .select(EntryRow::as_select())
                .load(conn)?;
            load_entries(rows)
        })
        .await
    }

    async fn find_component(&self, slug: &str) -> Result<Option<MonitoredComponent>, StoreError> {
        let slug = slug.to_string();
        self.run(move |conn| {
            monitored_components::table
                .filter(monitored_components::slug.eq(&slug))
                .select(ComponentRow::as_select())
                .first::<ComponentRow>(conn)
                .optional()?
                .map(MonitoredComponent::try_from)
                .transpose()
        })
        .await
    }

    async fn list_components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Vec<MonitoredComponent>, StoreError> {
        self.run(move |conn| {
            let mut query = monitored_components::table
                .select(ComponentRow::as_select())
                .order(monitored_components::display_name.asc())
                .into_boxed();
            query = match filter {
                ComponentFilter::All => query,
                ComponentFilter::ActiveOnly => query.filter(monitored_components::is_active.eq(true)),
                ComponentFilter::UpdatesOnly => {
                    query.filter(monitored_components::has_update.eq(true))
                }
            };
            load_components(query.load(conn)?)
        })
        .await
    }

    async fn list_unlinked_components(&self) -> Result<Vec<MonitoredComponent>, StoreError> {
        self.run(|conn| {
            let rows = monitored_components::table
                .filter(monitored_components::linked_entry_key.is_null())
                .order(monitored_components::slug.asc())
                .select(ComponentRow::as_select())
                .load(conn)?;
            load_components(rows)
        })
        .await
    }

    async fn upsert_component(
        &self,
        observation: &ComponentObservation,
    ) -> Result<Upsert, StoreError> {
        let row = ComponentRow::from(observation);
        self.run(move |conn| {
            conn.immediate_transaction(|conn| {
                let inserted = diesel::insert_into(monitored_components::table)
                    .values(&row)
                    .on_conflict(monitored_components::slug)
                    .do_nothing()
                    .execute(conn)?;
                if inserted == 1 {
                    return Ok(Upsert::Inserted);
                }

                diesel::update(
                    monitored_components::table
                        .filter(monitored_components::slug.eq(row.slug.as_str())),
                )
                .set((
                    monitored_components::display_name.eq(row.display_name.as_str()),
                    monitored_components::current_version.eq(row.current_version.as_deref()),
                    monitored_components::is_active.eq(row.is_active),
                    monitored_components::last_checked_at.eq(row.last_checked_at),
                ))
                .execute(conn)?;
                Ok(Upsert::Updated)
            })
        })
        .await
    }

    async fn set_component_link(&self, slug: &str, entry_key: &str) -> Result<(), StoreError> {
        let slug = slug.to_string();
        let entry_key = entry_key.to_string();
        self.run(move |conn| {
            let affected = diesel::update(
                monitored_components::table.filter(monitored_components::slug.eq(&slug)),
            )
            .set(monitored_components::linked_entry_key.eq(Some(entry_key)))
            .execute(conn)?;
            if affected == 0 {
                return Err(StoreError::Query(diesel::result::Error::NotFound));
            }
            Ok(())
        })
        .await
    }

    async fn record_drift(
        &self,
        entry_key: &str,
        slug: &str,
        version: &str,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let entry_key = entry_key.to_string();
        let slug = slug.to_string();
        let version = version.to_string();
        let ts = at.timestamp();
        self.run(move |conn| {
            conn.immediate_transaction(|conn| {
                let entries = diesel::update(
                    changelog_entries::table.filter(changelog_entries::entry_key.eq(&entry_key)),
                )
                .set((
                    changelog_entries::last_version.eq(Some(version.as_str())),
                    changelog_entries::last_updated_at.eq(Some(ts)),
                    changelog_entries::last_checked_at.eq(Some(ts)),
                ))
                .execute(conn)?;
                let components = diesel::update(
                    monitored_components::table.filter(monitored_components::slug.eq(&slug)),
                )
                .set((
                    monitored_components::has_update.eq(true),
                    monitored_components::available_version.eq(Some(version.as_str())),
                    monitored_components::last_checked_at.eq(ts),
                ))
                .execute(conn)?;
                // Both rows or neither: a missing side rolls the other back.
                if entries == 0 || components == 0 {
                    return Err(StoreError::Query(diesel::result::Error::NotFound));
                }
                Ok(())
            })
        })
        .await
    }

    async fn list_linked(
        &self,
        source: Option<EntrySource>,
    ) -> Result<Vec<LinkedComponent>, StoreError> {
        self.run(move |conn| {
            let mut query = monitored_components::table
                .inner_join(
                    changelog_entries::table.on(monitored_components::linked_entry_key
                        .eq(changelog_entries::entry_key.nullable())),
                )
                .select((ComponentRow::as_select(), EntryRow::as_select()))
                .order(monitored_components::slug.asc())
                .into_boxed();
            if let Some(source) = source {
                query = query.filter(changelog_entries::source.eq(source.as_str()));
            }
            let rows: Vec<(ComponentRow, EntryRow)> = query.load(conn)?;
            rows.into_iter()
                .map(|(component, entry)| {
                    Ok(LinkedComponent {
                        component: component.try_into()?,
                        entry: entry.try_into()?,
                    })
                })
                .collect()
        })
        .await
    }

    async fn update_notices(&self, active_only: bool) -> Result<Vec<UpdateNotice>, StoreError> {
        self.run(move |conn| {
            let mut query = monitored_components::table
                .inner_join(
                    changelog_entries::table.on(monitored_components::linked_entry_key
                        .eq(changelog_entries::entry_key.nullable())),
                )
                .filter(monitored_components::has_update.eq(true))
                .select((ComponentRow::as_select(), EntryRow::as_select()))
                .order(monitored_components::last_checked_at.desc())
                .into_boxed();
            if active_only {
                query = query.filter(monitored_components::is_active.eq(true));
            }
            let rows: Vec<(ComponentRow, EntryRow)> = query.load(conn)?;
            rows.into_iter()
                .map(|(component, entry)| {
                    let component = MonitoredComponent::try_from(component)?;
                    let entry = ChangelogEntry::try_from(entry)?;
                    Ok(UpdateNotice {
                        slug: component.slug,
                        display_name: component.display_name,
                        current_version: component.current_version,
                        available_version: component.available_version,
                        changelog_url: entry.changelog_url,
                        source: entry.source,
                        is_active: component.is_active,
                        last_checked_at: component.last_checked_at,
                    })
                })
                .collect()
        })
        .await
    }

    async fn stats(&self) -> Result<TrackerStats, StoreError> {
        self.run(|conn| {
            let total_entries = changelog_entries::table.count().get_result::<i64>(conn)?;
            let monitored = monitored_components::table
                .count()
                .get_result::<i64>(conn)?;
            let active = monitored_components::table
                .filter(monitored_components::is_active.eq(true))
                .count()
                .get_result::<i64>(conn)?;
            let updates_available = monitored_components::table
                .filter(monitored_components::has_update.eq(true))
                .count()
                .get_result::<i64>(conn)?;
            let last_indexed = tracker_state::table
                .filter(tracker_state::state_key.eq(INDEXER_LAST_RUN_KEY))
                .select(tracker_state::state_value)
                .first::<String>(conn)
                .optional()?
                .and_then(|raw| raw.parse::<i64>().ok());

            Ok(TrackerStats {
                total_entries: total_entries as u64,
                registry_entries: count_source(conn, EntrySource::Registry)?,
                external_entries: count_source(conn, EntrySource::External)?,
                manual_entries: count_source(conn, EntrySource::Manual)?,
                monitored: monitored as u64,
                active: active as u64,
                updates_available: updates_available as u64,
                last_indexed_at: last_indexed.map(from_unix).transpose()?,
            })
        })
        .await
    }

    async fn get_state(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.run(move |conn| {
            let value = tracker_state::table
                .filter(tracker_state::state_key.eq(&key))
                .select(tracker_state::state_value)
                .first::<String>(conn)
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set_state(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let key = key.to_string();
        let value = value.to_string();
        let now = Utc::now().timestamp();
        self.run(move |conn| {
            diesel::insert_into(tracker_state::table)
                .values(&NewStateRow {
                    state_key: &key,
                    state_value: &value,
                    updated_at: now,
                })
                .on_conflict(tracker_state::state_key)
                .do_update()
                .set((
                    tracker_state::state_value.eq(&value),
                    tracker_state::updated_at.eq(now),
                ))
                .execute(conn)?;
            Ok(())
        })
        .await
    }
}
