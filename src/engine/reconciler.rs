//! Reconciliation driver.
//!
//! Runs one full tick as a fixed sequence of phases:
//!
//! ```text
//! idle → scanning → linking-unlinked → checking-updates → idle
//! ```
//!
//! Each phase runs under its own timeout. A phase that times out is
//! abandoned and reported, and the run moves on to the next phase; writes
//! the abandoned phase already committed stay in place. Only an unavailable
//! store aborts the run.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::engine::checker::{UpdateChecker, UpdateReport};
use crate::engine::linker::{LinkReport, Linker};
use crate::engine::scanner::Scanner;
use crate::model::RECONCILE_LAST_RUN_KEY;
use crate::traits::{ManifestSource, StoreError, TrackerStore};

// ============================================================================
// Reconcile Types
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcilePhase {
    Idle,
    Scanning,
    LinkingUnlinked,
    CheckingUpdates,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReconcilePhase::Idle => "idle",
            ReconcilePhase::Scanning => "scanning",
            ReconcilePhase::LinkingUnlinked => "linking-unlinked",
            ReconcilePhase::CheckingUpdates => "checking-updates",
        })
    }
}

/// What one reconciliation run did.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct ReconcileReport {
    /// Manifests reported by the host
    pub manifests_seen: usize,
    /// Components seen for the first time
    pub scanned_new: usize,
    pub linking: LinkReport,
    pub updates: UpdateReport,
    /// Phases abandoned after exceeding the phase timeout
    pub timed_out: Vec<ReconcilePhase>,
    /// Host listing failure; the scan phase was skipped
    pub manifest_error: Option<String>,
    pub duration_ms: u64,
}

// ============================================================================
// Reconciler
// ============================================================================

pub struct Reconciler {
    manifests: Arc<dyn ManifestSource>,
    store: Arc<dyn TrackerStore>,
    scanner: Scanner,
    linker: Linker,
    checker: UpdateChecker,
    phase_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        manifests: Arc<dyn ManifestSource>,
        store: Arc<dyn TrackerStore>,
        scanner: Scanner,
        linker: Linker,
        checker: UpdateChecker,
    ) -> Self {
        Self {
            manifests,
            store,
            scanner,
            linker,
            checker,
            phase_timeout: Duration::from_secs(300),
        }
    }

    pub fn scanner(&self) -> &Scanner {
        &self.scanner
    }

    pub fn linker(&self) -> &Linker {
        &self.linker
    }

    pub fn checker(&self) -> &UpdateChecker {
        &self.checker
    }

    /// Sets the upper bound for each phase.
    pub fn with_phase_timeout(mut self, phase_timeout: Duration) -> Self {
        self.phase_timeout = phase_timeout;
        self
    }

    /// Executes one full reconciliation tick.
    ///
    /// # Errors
    ///
    /// Returns `Err` when the store becomes unavailable. Registry and host
    /// failures are absorbed into the report.
    pub async fn run(&self) -> Result<ReconcileReport, StoreError> {
        let start = std::time::Instant::now();
        let mut report = ReconcileReport::default();
        info!(phase = %ReconcilePhase::Idle, "Starting reconciliation");

        // Phase 1: mirror the host's installed list
        let scanned = self
            .phase(ReconcilePhase::Scanning, &mut report, async {
                match self.manifests.list_installed().await {
                    Ok(manifests) => {
                        let new = self.scanner.scan(&manifests).await?;
                        Ok::<_, StoreError>(Ok((manifests.len(), new)))
                    }
                    Err(e) => Ok::<_, StoreError>(Err(e.to_string())),
                }
            })
            .await?;
        match scanned {
            Some(Ok((seen, new))) => {
                report.manifests_seen = seen;
                report.scanned_new = new;
            }
            Some(Err(message)) => {
                warn!(error = %message, "Host manifest listing failed; scan skipped");
                report.manifest_error = Some(message);
            }
            None => {}
        }

        // Phase 2: retry components that are still unlinked
        if let Some(linking) = self
            .phase(
                ReconcilePhase::LinkingUnlinked,
                &mut report,
                self.linker.link_unlinked(),
            )
            .await?
        {
            report.linking = linking;
        }

        // Phase 3: detect catalog version changes
        if let Some(updates) = self
            .phase(
                ReconcilePhase::CheckingUpdates,
                &mut report,
                self.checker.check_for_updates(),
            )
            .await?
        {
            report.updates = updates;
        }

        self.store
            .set_state(RECONCILE_LAST_RUN_KEY, &Utc::now().timestamp().to_string())
            .await?;

        report.duration_ms = start.elapsed().as_millis() as u64;
        info!(
            phase = %ReconcilePhase::Idle,
            scanned_new = report.scanned_new,
            linked = report.linking.linked,
            updates = report.updates.updated,
            timed_out = report.timed_out.len(),
            duration_ms = report.duration_ms,
            "Reconciliation completed"
        );
        Ok(report)
    }

    /// Runs only when no run was recorded or the last one is at least
    /// `interval` old. Returns `None` when the run was not due.
    pub async fn run_if_due(
        &self,
        interval: Duration,
    ) -> Result<Option<ReconcileReport>, StoreError> {
        if let Some(last) = self.last_run().await? {
            let elapsed = Utc::now().signed_duration_since(last);
            if elapsed.num_seconds() < interval.as_secs() as i64 {
                debug!(last_run = %last, "Reconciliation not due yet");
                return Ok(None);
            }
        }
        self.run().await.map(Some)
    }

    /// Time of the last completed run, if any was recorded.
    pub async fn last_run(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let Some(raw) = self.store.get_state(RECONCILE_LAST_RUN_KEY).await? else {
            return Ok(None);
        };
        let parsed = raw
            .parse::<i64>()
            .ok()
            .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));
        if parsed.is_none() {
            warn!(value = %raw, "Ignoring invalid last-run timestamp");
        }
        Ok(parsed)
    }

    async fn phase<T, F>(
        &self,
        phase: ReconcilePhase,
        report: &mut ReconcileReport,
        work: F,
    ) -> Result<Option<T>, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        info!(phase = %phase, "Entering phase");
        let phase_start = std::time::Instant::now();

        let outcome = timeout(self.phase_timeout, work).await;
        let duration_ms = phase_start.elapsed().as_millis() as u64;
        match outcome {
            Ok(result) => {
                let value = result?;
                info!(phase = %phase, duration_ms, "Phase completed");
                Ok(Some(value))
            }
            Err(_) => {
                warn!(
                    phase = %phase,
                    timeout_secs = self.phase_timeout.as_secs(),
                    "Phase timed out; continuing with next phase"
                );
                report.timed_out.push(phase);
                Ok(None)
            }
        }
    }
}
