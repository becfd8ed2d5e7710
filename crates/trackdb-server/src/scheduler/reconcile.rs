//! One reconciliation pass over stale tracked records.
//!
//! A pass lists stale keys from the store, re-tracks each one through its
//! carrier adapter in sequence, and writes the outcome back through the
//! store. At most one pass runs at a time per [`Reconciler`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use trackdb_carriers::CarrierRegistry;
use trackdb_core::{AppConfig, ResponseStatus, TrackOptions, TrackRequest};
use trackdb_db::{StaleKey, TrackingStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassState {
    Idle,
    Running,
}

/// Tunables for a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconcileSettings {
    pub stale_after_minutes: i64,
    /// Pause between consecutive carrier calls.
    pub inter_call_delay: Duration,
}

impl ReconcileSettings {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            stale_after_minutes: config.stale_after_minutes,
            inter_call_delay: Duration::from_millis(config.inter_call_delay_ms),
        }
    }
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            stale_after_minutes: 15,
            inter_call_delay: Duration::from_millis(1000),
        }
    }
}

/// Counters for one completed pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PassSummary {
    /// Stale keys the pass looked at, including skipped ones.
    pub checked: usize,
    pub refreshed: usize,
    pub failed: usize,
    /// Keys whose carrier has no registered adapter.
    pub skipped: usize,
}

/// Marks a pass as running for as long as it is alive.
///
/// Dropping the guard returns the reconciler to [`PassState::Idle`], which
/// also happens while unwinding from a panic inside the pass.
#[derive(Debug)]
pub struct PassGuard<'a> {
    state: &'a Mutex<PassState>,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        *lock_state(self.state) = PassState::Idle;
    }
}

fn lock_state(state: &Mutex<PassState>) -> MutexGuard<'_, PassState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Reconciler {
    store: Arc<dyn TrackingStore>,
    registry: Arc<CarrierRegistry>,
    settings: ReconcileSettings,
    state: Mutex<PassState>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("settings", &self.settings)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    #[must_use]
    pub fn new(
        store: Arc<dyn TrackingStore>,
        registry: Arc<CarrierRegistry>,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
            state: Mutex::new(PassState::Idle),
        }
    }

    #[must_use]
    pub fn state(&self) -> PassState {
        *lock_state(&self.state)
    }

    #[must_use]
    pub fn pass_in_progress(&self) -> bool {
        self.state() == PassState::Running
    }

    /// Moves `Idle -> Running`. Returns `None` if a pass is already running.
    pub fn try_begin(&self) -> Option<PassGuard<'_>> {
        let mut state = lock_state(&self.state);
        if *state == PassState::Running {
            return None;
        }
        *state = PassState::Running;
        drop(state);
        Some(PassGuard { state: &self.state })
    }

    /// Runs one pass. Returns `None` without doing anything when another pass
    /// is still running.
    pub async fn run_pass(&self) -> Option<PassSummary> {
        let Some(_guard) = self.try_begin() else {
            tracing::info!("reconcile: pass already in progress; skipping");
            return None;
        };

        let started = std::time::Instant::now();
        let summary = self.sweep().await;
        tracing::info!(
            checked = summary.checked,
            refreshed = summary.refreshed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "reconcile: pass complete"
        );
        Some(summary)
    }

    async fn sweep(&self) -> PassSummary {
        let mut summary = PassSummary::default();

        let stale = match self.store.list_stale(self.settings.stale_after_minutes).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "reconcile: failed to list stale records");
                return summary;
            }
        };

        if stale.is_empty() {
            tracing::debug!("reconcile: no stale records");
            return summary;
        }

        tracing::info!(count = stale.len(), "reconcile: refreshing stale records");

        let mut called_carrier = false;
        for key in &stale {
            summary.checked += 1;

            let adapter = match self.registry.resolve(&key.carrier) {
                Ok(adapter) => adapter,
                Err(e) => {
                    tracing::info!(
                        carrier = %key.carrier,
                        tracking_number = %key.tracking_number,
                        reason = %e,
                        "reconcile: skipping record for unsupported carrier"
                    );
                    summary.skipped += 1;
                    continue;
                }
            };

            if called_carrier && !self.settings.inter_call_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_call_delay).await;
            }
            called_carrier = true;

            let request =
                TrackRequest::single(key.tracking_number.clone(), TrackOptions::default());
            let outcome = match adapter.track(&request).await {
                Ok(response) if response.status == ResponseStatus::Error => {
                    Err(response.error_summary())
                }
                Ok(response) => Ok(response),
                Err(e) => Err(e.to_string()),
            };

            if self.apply(key, outcome).await {
                summary.refreshed += 1;
            } else {
                summary.failed += 1;
            }
        }

        summary
    }

    /// Writes one outcome back. Returns `true` if the record was refreshed.
    async fn apply(
        &self,
        key: &StaleKey,
        outcome: Result<trackdb_core::CanonicalResponse, String>,
    ) -> bool {
        match outcome {
            Ok(response) => {
                match self
                    .store
                    .upsert(&key.tracking_number, &key.carrier, &response)
                    .await
                {
                    Ok(record) => {
                        tracing::debug!(
                            carrier = %key.carrier,
                            tracking_number = %key.tracking_number,
                            status = %response.status,
                            is_delivered = record.is_delivered,
                            "reconcile: record refreshed"
                        );
                        true
                    }
                    Err(e) => {
                        tracing::error!(
                            carrier = %key.carrier,
                            tracking_number = %key.tracking_number,
                            error = %e,
                            "reconcile: failed to store refreshed record"
                        );
                        false
                    }
                }
            }
            Err(message) => {
                tracing::warn!(
                    carrier = %key.carrier,
                    tracking_number = %key.tracking_number,
                    error = %message,
                    "reconcile: carrier lookup failed"
                );
                match self
                    .store
                    .record_error(&key.tracking_number, &key.carrier, &message)
                    .await
                {
                    Ok(Some(record)) if !record.is_active => {
                        tracing::warn!(
                            carrier = %key.carrier,
                            tracking_number = %key.tracking_number,
                            error_count = record.error_count,
                            "reconcile: record deactivated after repeated errors"
                        );
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(
                            carrier = %key.carrier,
                            tracking_number = %key.tracking_number,
                            error = %e,
                            "reconcile: failed to record carrier error"
                        );
                    }
                }
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "reconcile_test.rs"]
mod tests;
