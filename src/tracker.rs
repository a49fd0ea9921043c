//! Public facade wiring the store, registry client and host manifest source
//! into the engine components.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::info;

use crate::config::TrackerConfig;
use crate::engine::{
    CatalogIndexer, Linker, ReconcileReport, Reconciler, Scanner, UpdateChecker, UpdateReport,
};
use crate::error::TrackerError;
use crate::model::{
    changelog_url, ChangelogEntry, ComponentFilter, EntryRecord, EntrySource, EntryStatus,
    LinkOutcome, MonitoredComponent, TrackerStats, UpdateNotice, Upsert,
};
use crate::registry::HttpRegistryClient;
use crate::store::SqliteStore;
use crate::traits::{ManifestSource, RegistryClient, TrackerStore};

const MAX_SEARCH_RESULTS: u32 = 50;
const MAX_RECENT_UPDATES: u32 = 100;

/// Entry point for embedding hosts and the CLI.
///
/// Queries read straight from the store. Triggers run one engine operation
/// and report counts; partial failures inside them are logged, not returned.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use changelog_tracker::{JsonManifestSource, Tracker, TrackerConfig};
///
/// # async fn demo() -> Result<(), changelog_tracker::TrackerError> {
/// let config = TrackerConfig::default();
/// let manifests = Arc::new(JsonManifestSource::new("installed.json"));
/// let tracker = Tracker::open(config, manifests)?;
///
/// let report = tracker.reconcile().await?;
/// println!("{} new components", report.scanned_new);
/// # Ok(())
/// # }
/// ```
pub struct Tracker {
    config: TrackerConfig,
    store: Arc<dyn TrackerStore>,
    manifests: Arc<dyn ManifestSource>,
    indexer: CatalogIndexer,
    /// Owns the scanner, linker and checker that the standalone triggers reuse.
    reconciler: Reconciler,
}

impl Tracker {
    /// Opens the SQLite store and HTTP registry client described by `config`.
    ///
    /// # Errors
    ///
    /// Returns `Err` if the database cannot be opened or migrated, or the
    /// HTTP client cannot be built.
    pub fn open(
        config: TrackerConfig,
        manifests: Arc<dyn ManifestSource>,
    ) -> Result<Self, TrackerError> {
        let store = Arc::new(SqliteStore::open(&config.database_path)?);
        let registry = Arc::new(HttpRegistryClient::new(&config.registry)?);
        info!(database = %config.database_path.display(), "Tracker opened");
        Ok(Self::new(config, store, registry, manifests))
    }

    /// Builds a tracker over explicit collaborators.
    pub fn new(
        config: TrackerConfig,
        store: Arc<dyn TrackerStore>,
        registry: Arc<dyn RegistryClient>,
        manifests: Arc<dyn ManifestSource>,
    ) -> Self {
        let site_base = config.registry.site_base.clone();
        let linker = Linker::new(store.clone(), registry.clone(), site_base.clone());
        let scanner = Scanner::new(store.clone(), linker.clone());
        let indexer = CatalogIndexer::new(
            store.clone(),
            registry.clone(),
            site_base,
            config.indexer.page_size,
        );
        let checker = UpdateChecker::new(store.clone(), registry);
        let reconciler =
            Reconciler::new(manifests.clone(), store.clone(), scanner, linker, checker)
                .with_phase_timeout(Duration::from_secs(config.reconcile.phase_timeout_secs));

        Self {
            config,
            store,
            manifests,
            indexer,
            reconciler,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub async fn component(&self, slug: &str) -> Result<Option<MonitoredComponent>, TrackerError> {
        Ok(self.store.find_component(slug).await?)
    }

    pub async fn entry(&self, key: &str) -> Result<Option<ChangelogEntry>, TrackerError> {
        Ok(self.store.find_entry(key).await?)
    }

    pub async fn components(
        &self,
        filter: ComponentFilter,
    ) -> Result<Vec<MonitoredComponent>, TrackerError> {
        Ok(self.store.list_components(filter).await?)
    }

    pub async fn entries(
        &self,
        source: Option<EntrySource>,
    ) -> Result<Vec<ChangelogEntry>, TrackerError> {
        Ok(self.store.list_entries(source).await?)
    }

    /// Case-insensitive search over entry names and keys.
    ///
    /// `limit` is clamped to `1..=50`.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] for a blank term.
    pub async fn search(
        &self,
        term: &str,
        source: Option<EntrySource>,
        limit: u32,
    ) -> Result<Vec<ChangelogEntry>, TrackerError> {
        let term = term.trim();
        if term.is_empty() {
            return Err(TrackerError::InvalidInput(
                "search term must not be empty".to_string(),
            ));
        }
        let limit = limit.clamp(1, MAX_SEARCH_RESULTS);
        Ok(self.store.search_entries(term, source, limit).await?)
    }

    /// Entries with a recorded catalog update, newest first. `limit` is
    /// clamped to `1..=100`.
    pub async fn recent_updates(&self, limit: u32) -> Result<Vec<ChangelogEntry>, TrackerError> {
        let limit = limit.clamp(1, MAX_RECENT_UPDATES);
        Ok(self.store.recent_updates(limit).await?)
    }

    pub async fn update_notices(&self, active_only: bool) -> Result<Vec<UpdateNotice>, TrackerError> {
        Ok(self.store.update_notices(active_only).await?)
    }

    pub async fn stats(&self) -> Result<TrackerStats, TrackerError> {
        Ok(self.store.stats().await?)
    }

    // ------------------------------------------------------------------------
    // Triggers
    // ------------------------------------------------------------------------

    /// Scans the host's installed list; returns the number of new components.
    pub async fn scan(&self) -> Result<usize, TrackerError> {
        let manifests = self.manifests.list_installed().await?;
        Ok(self.reconciler.scanner().scan(&manifests).await?)
    }

    /// Links one component on demand.
    pub async fn link(&self, slug: &str) -> Result<LinkOutcome, TrackerError> {
        let component = self
            .store
            .find_component(slug)
            .await?
            .ok_or_else(|| TrackerError::InvalidInput(format!("unknown component '{slug}'")))?;
        Ok(self
            .reconciler
            .linker()
            .link(&component.slug, &component.display_name)
            .await?)
    }

    pub async fn index_next_batch(&self) -> Result<usize, TrackerError> {
        Ok(self.indexer.index_next_batch().await?)
    }

    pub async fn index_batches(&self, batches: u32) -> Result<usize, TrackerError> {
        Ok(self.indexer.index_batches(batches).await?)
    }

    /// Indexes the configured number of warm-up batches if the catalog is sparse.
    pub async fn warm_up(&self) -> Result<usize, TrackerError> {
        let indexer = &self.config.indexer;
        Ok(self
            .indexer
            .warm_up(indexer.warm_up_threshold, indexer.warm_up_batches)
            .await?)
    }

    pub async fn check_for_updates(&self) -> Result<UpdateReport, TrackerError> {
        Ok(self.reconciler.checker().check_for_updates().await?)
    }

    pub async fn reconcile(&self) -> Result<ReconcileReport, TrackerError> {
        Ok(self.reconciler.run().await?)
    }

    /// Reconciles only when the configured interval has elapsed since the last run.
    pub async fn reconcile_if_due(&self) -> Result<Option<ReconcileReport>, TrackerError> {
        let interval = Duration::from_secs(self.config.reconcile.interval_secs);
        Ok(self.reconciler.run_if_due(interval).await?)
    }

    /// Adds an entry that does not come from registry indexing, or refreshes
    /// the name and version of an existing one. Its changelog URL is derived
    /// from the key like every other entry.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::InvalidInput`] for a blank key or name, or a
    /// `registry` source.
    pub async fn add_entry(
        &self,
        key: &str,
        display_name: &str,
        version: Option<&str>,
        source: EntrySource,
    ) -> Result<Upsert, TrackerError> {
        let key = key.trim();
        let display_name = display_name.trim();
        if key.is_empty() || display_name.is_empty() {
            return Err(TrackerError::InvalidInput(
                "entry key and name are required".to_string(),
            ));
        }
        if source == EntrySource::Registry {
            return Err(TrackerError::InvalidInput(
                "registry entries are created by indexing".to_string(),
            ));
        }

        let record = EntryRecord {
            key: key.to_string(),
            display_name: display_name.to_string(),
            changelog_url: changelog_url(&self.config.registry.site_base, key),
            last_version: version.map(str::to_string),
            source,
            status: EntryStatus::Active,
            checked_at: Utc::now(),
        };
        let outcome = self.store.upsert_entry(&record).await?;
        info!(key, %source, ?outcome, "Entry added");
        Ok(outcome)
    }
}
