//! Command-line driver for the changelog tracker.
//!
//! Usage:
//!   changelog-tracker --config tracker.toml --manifests installed.json reconcile
//!   changelog-tracker index --batches 5
//!   changelog-tracker search "seo" --source registry --limit 10
//!   changelog-tracker updates --active-only
//!
//! Results are printed to stdout as JSON; logs go to stderr.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use changelog_tracker::{
    logging, ComponentFilter, EntrySource, JsonManifestSource, ManifestSource,
    StaticManifestSource, Tracker, TrackerConfig,
};

#[derive(Parser, Debug)]
#[command(name = "changelog-tracker")]
#[command(about = "Track changelogs of installed components against a registry catalog")]
struct Cli {
    /// TOML configuration file; built-in defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Overrides the configured database path.
    #[arg(long)]
    database: Option<PathBuf>,
    /// JSON array of installed component manifests; an empty list when omitted.
    #[arg(long)]
    manifests: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Mirror the installed list into the store and link new components.
    Scan,
    /// Index catalog pages starting at the stored cursor.
    Index {
        #[arg(long, default_value_t = 1)]
        batches: u32,
    },
    /// Index a few pages if the catalog is still sparse.
    WarmUp,
    /// Run a full reconciliation tick.
    Reconcile {
        /// Skip the run when the configured interval has not elapsed.
        #[arg(long)]
        if_due: bool,
    },
    /// Check linked registry components for newer versions.
    Check,
    /// Link one monitored component to a catalog entry.
    Link { slug: String },
    /// Print aggregate counts.
    Stats,
    /// Search catalog entries by name or key.
    Search {
        term: String,
        #[arg(long)]
        source: Option<EntrySource>,
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Show one monitored component and its linked entry.
    Show { slug: String },
    /// List monitored components.
    Components {
        #[arg(long, conflicts_with = "with_updates")]
        active_only: bool,
        #[arg(long)]
        with_updates: bool,
    },
    /// List pending update notices.
    Updates {
        #[arg(long)]
        active_only: bool,
    },
    /// List entries with the most recent catalog updates.
    Recent {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Add or refresh an entry tracked outside the registry.
    AddEntry {
        key: String,
        name: String,
        #[arg(long)]
        version: Option<String>,
        #[arg(long, default_value = "manual")]
        source: EntrySource,
    },
}

#[derive(Serialize)]
struct Count {
    count: usize,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("serializing output")?
    );
    Ok(())
}

fn load_config(cli: &Cli) -> Result<TrackerConfig> {
    let mut config = match &cli.config {
        Some(path) => TrackerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => TrackerConfig::default(),
    };
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init("info").map_err(|e| anyhow!(e))?;
    let cli = Cli::parse();

    let config = load_config(&cli)?;
    let manifests: Arc<dyn ManifestSource> = match &cli.manifests {
        Some(path) => Arc::new(JsonManifestSource::new(path)),
        None => Arc::new(StaticManifestSource::default()),
    };
    let tracker = Tracker::open(config, manifests).context("opening tracker")?;

    match cli.command {
        Command::Scan => print_json(&Count {
            count: tracker.scan().await?,
        }),
        Command::Index { batches } => print_json(&Count {
            count: tracker.index_batches(batches).await?,
        }),
        Command::WarmUp => print_json(&Count {
            count: tracker.warm_up().await?,
        }),
        Command::Reconcile { if_due: true } => print_json(&tracker.reconcile_if_due().await?),
        Command::Reconcile { if_due: false } => print_json(&tracker.reconcile().await?),
        Command::Check => print_json(&tracker.check_for_updates().await?),
        Command::Link { slug } => {
            let outcome = tracker.link(&slug).await?;
            print_json(&serde_json::json!({ "slug": slug, "linked_entry_key": outcome.key() }))
        }
        Command::Stats => print_json(&tracker.stats().await?),
        Command::Search {
            term,
            source,
            limit,
        } => print_json(&tracker.search(&term, source, limit).await?),
        Command::Show { slug } => {
            let component = tracker
                .component(&slug)
                .await?
                .ok_or_else(|| anyhow!("no monitored component '{slug}'"))?;
            let entry = match &component.linked_entry_key {
                Some(key) => tracker.entry(key).await?,
                None => None,
            };
            print_json(&serde_json::json!({ "component": component, "entry": entry }))
        }
        Command::Components {
            active_only,
            with_updates,
        } => {
            let filter = if active_only {
                ComponentFilter::ActiveOnly
            } else if with_updates {
                ComponentFilter::UpdatesOnly
            } else {
                ComponentFilter::All
            };
            print_json(&tracker.components(filter).await?)
        }
        Command::Updates { active_only } => print_json(&tracker.update_notices(active_only).await?),
        Command::Recent { limit } => print_json(&tracker.recent_updates(limit).await?),
        Command::AddEntry {
            key,
            name,
            version,
            source,
        } => {
            let outcome = tracker
                .add_entry(&key, &name, version.as_deref(), source)
                .await?;
            print_json(&serde_json::json!({ "key": key, "outcome": format!("{outcome:?}").to_lowercase() }))
        }
    }
}
