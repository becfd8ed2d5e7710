//! Background reconciliation scheduler.
//!
//! Registers a repeated [`JobScheduler`] job that runs a reconciliation pass
//! every `reconcile_interval_minutes`, and spawns one pass immediately at
//! startup.

mod reconcile;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

pub use reconcile::{PassGuard, PassState, PassSummary, ReconcileSettings, Reconciler};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchedulerStatus {
    /// The periodic job is registered and the scheduler has not been shut down.
    pub running: bool,
    pub pass_in_progress: bool,
}

/// Shared control surface over the reconciler and its periodic job.
pub struct SchedulerHandle {
    reconciler: Arc<Reconciler>,
    scheduler: Mutex<Option<JobScheduler>>,
    running: AtomicBool,
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchedulerHandle")
            .field("reconciler", &self.reconciler)
            .field("running", &self.running.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl SchedulerHandle {
    /// A handle with no periodic job. Passes only run through [`Self::trigger`].
    #[must_use]
    pub fn manual(reconciler: Arc<Reconciler>) -> Self {
        Self {
            reconciler,
            scheduler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    #[must_use]
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            running: self.running.load(Ordering::SeqCst),
            pass_in_progress: self.reconciler.pass_in_progress(),
        }
    }

    /// Starts a pass in the background and returns immediately.
    ///
    /// If a pass is already running the spawned task exits without work.
    pub fn trigger(&self) {
        let reconciler = Arc::clone(&self.reconciler);
        tokio::spawn(async move {
            tracing::info!("scheduler: manual reconciliation pass requested");
            reconciler.run_pass().await;
        });
    }

    /// Stops the periodic job. A pass already in flight is left to finish.
    ///
    /// # Errors
    ///
    /// Returns [`JobSchedulerError`] if the scheduler fails to shut down.
    pub async fn shutdown(&self) -> Result<(), JobSchedulerError> {
        self.running.store(false, Ordering::SeqCst);
        let scheduler = self.scheduler.lock().await.take();
        if let Some(mut scheduler) = scheduler {
            scheduler.shutdown().await?;
            tracing::info!("scheduler: stopped");
        }
        Ok(())
    }
}

/// Builds and starts the reconciliation scheduler.
///
/// The returned handle owns the running [`JobScheduler`]; call
/// [`SchedulerHandle::shutdown`] to stop it.
///
/// # Errors
///
/// Returns [`JobSchedulerError`] if the scheduler cannot be initialised, the
/// job cannot be registered, or the scheduler fails to start.
pub async fn build_scheduler(
    reconciler: Arc<Reconciler>,
    interval_minutes: u64,
) -> Result<SchedulerHandle, JobSchedulerError> {
    let scheduler = JobScheduler::new().await?;
    register_reconcile_job(&scheduler, Arc::clone(&reconciler), interval_minutes).await?;
    scheduler.start().await?;

    tracing::info!(interval_minutes, "scheduler: reconciliation job registered");

    let handle = SchedulerHandle {
        reconciler,
        scheduler: Mutex::new(Some(scheduler)),
        running: AtomicBool::new(true),
    };
    handle.trigger();
    Ok(handle)
}

async fn register_reconcile_job(
    scheduler: &JobScheduler,
    reconciler: Arc<Reconciler>,
    interval_minutes: u64,
) -> Result<(), JobSchedulerError> {
    let interval = Duration::from_secs(interval_minutes.max(1) * 60);

    let job = Job::new_repeated_async(interval, move |_uuid, _lock| {
        let reconciler = Arc::clone(&reconciler);

        Box::pin(async move {
            tracing::info!("scheduler: starting scheduled reconciliation pass");
            reconciler.run_pass().await;
        })
    })?;

    scheduler.add(job).await?;
    Ok(())
}
