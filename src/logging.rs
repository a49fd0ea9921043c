//! `tracing` subscriber setup for binaries embedding the tracker.

use tracing_subscriber::EnvFilter;

/// Installs a formatted stderr subscriber.
///
/// `RUST_LOG` wins when set; otherwise `default_directives` applies
/// (e.g. `"info"` or `"changelog_tracker=debug"`).
///
/// # Errors
///
/// Fails if a global subscriber is already installed or the directives do
/// not parse.
pub fn init(default_directives: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(default_directives)?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
}
