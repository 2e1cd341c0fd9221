//! Report job management: submission, background execution and polling.

mod worker;

pub use worker::*;

use crate::db::{DbError, ReportJob, ReportStatus, Store};

use chrono_tz::Tz;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use uuid::Uuid;

/// Report error types.
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("report {0} not found")]
    NotFound(String),
    #[error("report artifact missing at {0}")]
    ArtifactMissing(PathBuf),
    #[error("report manager is not accepting work")]
    Unavailable,
    #[error("report timed out after {0:?}")]
    Timeout(Duration),
    #[error("report computation cancelled")]
    Cancelled,
    #[error("report worker failed: {0}")]
    Worker(String),
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Settings for report execution.
#[derive(Debug, Clone)]
pub struct ReportSettings {
    pub report_dir: PathBuf,
    pub default_timezone: Tz,
    pub timeout: Duration,
    pub max_concurrent: usize,
}

/// What a poll found for an existing report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportPoll {
    Running,
    Complete(PathBuf),
    Failed,
}

/// Owns the report queue and runs one background worker per submitted report.
pub struct ReportManager {
    store: Arc<Store>,
    settings: Arc<ReportSettings>,
    queue_tx: mpsc::UnboundedSender<String>,
    queue_rx: Mutex<Option<mpsc::UnboundedReceiver<String>>>,
    stop: Mutex<Option<broadcast::Sender<()>>>,
    permits: Arc<Semaphore>,
}

impl ReportManager {
    /// Create a new manager. Reports are queued until `start` is called.
    pub fn new(store: Arc<Store>, settings: ReportSettings) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));

        Self {
            store,
            settings: Arc::new(settings),
            queue_tx: tx,
            queue_rx: Mutex::new(Some(rx)),
            stop: Mutex::new(None),
            permits,
        }
    }

    /// Start dispatching queued reports to workers.
    pub async fn start(&self) -> Result<(), ReportError> {
        std::fs::create_dir_all(&self.settings.report_dir)?;

        let Some(mut rx) = self.queue_rx.lock().await.take() else {
            tracing::warn!("ReportManager: already started");
            return Ok(());
        };

        let (stop_tx, mut stop_rx) = broadcast::channel(1);
        *self.stop.lock().await = Some(stop_tx);

        let store = self.store.clone();
        let settings = self.settings.clone();
        let permits = self.permits.clone();

        tracing::info!(
            "ReportManager: started (max {} concurrent, timeout {:?})",
            settings.max_concurrent,
            settings.timeout
        );

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop_rx.recv() => break,
                    next = rx.recv() => match next {
                        Some(report_id) => {
                            let store = store.clone();
                            let settings = settings.clone();
                            let permits = permits.clone();
                            tokio::spawn(async move {
                                let Ok(_permit) = permits.acquire_owned().await else {
                                    return;
                                };
                                run_report(&store, &settings, &report_id).await;
                            });
                        }
                        None => break,
                    },
                }
            }

            // Reports still queued will never run
            rx.close();
            while let Ok(report_id) = rx.try_recv() {
                match store.fail_report(&report_id) {
                    Ok(_) => tracing::warn!("ReportManager: dropped queued report {}", report_id),
                    Err(e) => tracing::error!(
                        "ReportManager: failed to mark queued report {} as failed: {}",
                        report_id,
                        e
                    ),
                }
            }
            tracing::info!("ReportManager: stopped");
        });

        Ok(())
    }

    /// Stop dispatching. Reports already running are left to finish.
    pub async fn stop(&self) {
        let stop = self.stop.lock().await;
        if let Some(tx) = stop.as_ref() {
            let _ = tx.send(());
        }
    }

    /// Create a report and queue its computation, returning the new report ID.
    pub fn submit(&self) -> Result<String, ReportError> {
        let report_id = Uuid::new_v4().to_string();
        self.store.create_report(&report_id)?;

        if self.queue_tx.send(report_id.clone()).is_err() {
            self.store.fail_report(&report_id)?;
            return Err(ReportError::Unavailable);
        }

        tracing::info!("ReportManager: queued report {}", report_id);
        Ok(report_id)
    }

    /// Look up the state of a report.
    pub fn poll(&self, report_id: &str) -> Result<ReportPoll, ReportError> {
        let job = self.job(report_id)?;

        match job.status {
            ReportStatus::Running => Ok(ReportPoll::Running),
            ReportStatus::Failed => Ok(ReportPoll::Failed),
            ReportStatus::Complete => {
                let path = job.csv_path.map(PathBuf::from).unwrap_or_default();
                if path.is_file() {
                    Ok(ReportPoll::Complete(path))
                } else {
                    Err(ReportError::ArtifactMissing(path))
                }
            }
        }
    }

    /// The stored job record for a report.
    pub fn job(&self, report_id: &str) -> Result<ReportJob, ReportError> {
        self.store
            .get_report(report_id)?
            .ok_or_else(|| ReportError::NotFound(report_id.to_string()))
    }

    /// Where the artifact for a report is written.
    #[cfg(test)]
    pub fn artifact_path(&self, report_id: &str) -> PathBuf {
        artifact_path(&self.settings, report_id)
    }
}

fn artifact_path(settings: &ReportSettings, report_id: &str) -> PathBuf {
    settings.report_dir.join(format!("report_{}.csv", report_id))
}

/// Run one report to completion and record its terminal state.
///
/// On timeout the job is failed at the deadline, but this does not return
/// until the blocking computation has noticed the cancel flag and exited, so
/// the caller's concurrency permit covers all of the work.
async fn run_report(store: &Arc<Store>, settings: &ReportSettings, report_id: &str) {
    tracing::info!("ReportManager: generating report {}", report_id);

    let cancel = Arc::new(AtomicBool::new(false));
    let compute_store = store.clone();
    let compute_cancel = cancel.clone();
    let tz = settings.default_timezone;
    let mut task =
        tokio::task::spawn_blocking(move || build_report(&compute_store, tz, &compute_cancel));

    let (outcome, timed_out) = match tokio::time::timeout(settings.timeout, &mut task).await {
        Ok(joined) => (publish_report(settings, report_id, joined).await, false),
        Err(_) => {
            cancel.store(true, Ordering::Relaxed);
            (Err(ReportError::Timeout(settings.timeout)), true)
        }
    };

    let finalized = match outcome {
        Ok(path) => store.complete_report(report_id, &path.to_string_lossy()),
        Err(e) => {
            tracing::error!("Error generating report {}: {}", report_id, e);
            store.fail_report(report_id)
        }
    };

    match finalized {
        Ok(true) => {}
        Ok(false) => tracing::warn!(
            "ReportManager: report {} was already finalized",
            report_id
        ),
        Err(e) => tracing::error!(
            "ReportManager: failed to record outcome of report {}: {}",
            report_id,
            e
        ),
    }

    if timed_out {
        match task.await {
            Ok(Err(ReportError::Cancelled)) => {
                tracing::debug!("ReportManager: report {} computation cancelled", report_id)
            }
            Ok(_) => tracing::debug!(
                "ReportManager: discarded late result of report {}",
                report_id
            ),
            Err(e) => tracing::error!(
                "ReportManager: report {} worker failed after timeout: {}",
                report_id,
                e
            ),
        }
    }
}

/// Turn a finished computation into a published artifact.
async fn publish_report(
    settings: &ReportSettings,
    report_id: &str,
    joined: Result<Result<ReportSummary, ReportError>, tokio::task::JoinError>,
) -> Result<PathBuf, ReportError> {
    let summary = joined.map_err(|e| ReportError::Worker(e.to_string()))??;

    match summary.anchor {
        Some(anchor) => tracing::info!(
            "Report {}: {} stores computed, {} failed, anchored at {}",
            report_id,
            summary.rows.len(),
            summary.failures.len(),
            anchor
        ),
        None => tracing::info!("Report {}: no observations", report_id),
    }

    let path = artifact_path(settings, report_id);
    let out = path.clone();
    tokio::task::spawn_blocking(move || write_artifact(&out, &summary.rows))
        .await
        .map_err(|e| ReportError::Worker(e.to_string()))??;

    Ok(path)
}
