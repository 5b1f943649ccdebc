// src/scan/lifecycle.rs
//! Job lifecycle: create, start, cancel, restart and report.

use chrono::Utc;
use dashmap::DashMap;
use itertools::Itertools;
use log::{info, warn};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use super::dispatcher::{DispatcherConfig, DispatcherDeps, ScanDispatcher};
use super::failure::FailureRecord;
use super::job::{JobHandle, JobId, JobStatus, ScanJob, ScanSettings, ScanTarget};
use super::sources::{CatalogSource, ResultStore};
use crate::error::{Result, ScanError};
use crate::utils::Clock;

/// Targets a copy-only restart still has to scan: enabled targets that neither
/// succeeded nor failed permanently, deduplicated by ASIN.
pub fn resume_targets(
    all_enabled: &[ScanTarget],
    succeeded: &HashSet<String>,
    permanently_failed: &HashSet<String>,
) -> Vec<ScanTarget> {
    all_enabled
        .iter()
        .filter(|t| !succeeded.contains(&t.asin) && !permanently_failed.contains(&t.asin))
        .unique_by(|t| t.asin.clone())
        .cloned()
        .collect()
}

/// A job together with its failure ledger.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub job: ScanJob,
    pub failures: Vec<FailureRecord>,
}

pub struct JobManager {
    catalog: Arc<dyn CatalogSource>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    dispatcher: ScanDispatcher,
    cancel_poll_interval: Duration,
    running: DashMap<JobId, Arc<JobHandle>>,
}

impl JobManager {
    pub fn new(
        catalog: Arc<dyn CatalogSource>,
        deps: DispatcherDeps,
        config: DispatcherConfig,
        cancel_poll_interval: Duration,
    ) -> Self {
        Self {
            catalog,
            store: deps.store.clone(),
            clock: deps.clock.clone(),
            dispatcher: ScanDispatcher::new(deps, config),
            cancel_poll_interval,
            running: DashMap::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    pub async fn create_job(&self, targets: Vec<ScanTarget>, settings: ScanSettings) -> Result<JobId> {
        self.create_with_parent(targets, settings, None).await
    }

    /// Creates a job over every enabled catalog target.
    pub async fn create_job_from_catalog(&self, settings: ScanSettings) -> Result<JobId> {
        settings.validate()?;
        let targets = self.catalog.list_enabled_targets().await?;
        self.create_job(targets, settings).await
    }

    async fn create_with_parent(
        &self,
        targets: Vec<ScanTarget>,
        settings: ScanSettings,
        parent_job_id: Option<JobId>,
    ) -> Result<JobId> {
        settings.validate()?;
        if targets.is_empty() {
            return Err(ScanError::ConfigurationError("a scan job needs at least one target".to_string()));
        }

        let requested = targets.len();
        let targets: Vec<ScanTarget> = targets.into_iter().unique_by(|t| t.asin.clone()).collect();
        if targets.len() < requested {
            warn!("⚠️ Dropped {} duplicate ASINs from job targets", requested - targets.len());
        }

        let job = ScanJob::new(targets, settings, parent_job_id);
        self.store.save_job(&job).await?;

        match parent_job_id {
            Some(parent) => info!(
                "🆕 Created job {} with {} targets (restart of {})",
                job.id, job.counters.total, parent
            ),
            None => info!("🆕 Created job {} with {} targets", job.id, job.counters.total),
        }
        Ok(job.id)
    }

    async fn load(&self, job_id: JobId) -> Result<ScanJob> {
        self.store.get_job(job_id).await?.ok_or(ScanError::JobNotFound(job_id))
    }

    /// Runs a PENDING job to a terminal status and returns that status.
    /// A job already RUNNING is left alone and `Running` is returned.
    pub async fn start_job(&self, job_id: JobId) -> Result<JobStatus> {
        let mut job = self.load(job_id).await?;

        match job.status {
            JobStatus::Pending => {}
            JobStatus::Running => {
                info!("▶️ Job {} is already running", job_id);
                return Ok(JobStatus::Running);
            }
            status => {
                return Err(ScanError::InvalidState {
                    job_id,
                    status,
                    operation: "start",
                })
            }
        }

        if job.cancel_requested {
            info!("🛑 Job {} was cancelled before it started", job_id);
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
            self.store.save_job(&job).await?;
            return Ok(JobStatus::Cancelled);
        }

        job.status = JobStatus::Running;
        job.started_at = Some(Utc::now());
        self.store.save_job(&job).await?;

        let handle = Arc::new(JobHandle::new(job_id, job.counters.total));
        self.running.insert(job_id, handle.clone());
        let watcher = self.spawn_cancel_watcher(handle.clone());

        let outcome = self.dispatcher.run(&job, handle.clone()).await;

        watcher.abort();
        self.running.remove(&job_id);

        let counters = handle.counters.snapshot();
        job.counters = counters;
        job.completed_at = Some(Utc::now());

        match outcome {
            Ok(summary) => {
                job.status = ScanJob::final_status(&summary.counters, summary.cancelled);
                self.store.save_job(&job).await?;
                info!("🏁 Job {} finished {}", job_id, job.status);
                Ok(job.status)
            }
            Err(e) => {
                job.status = if counters.processed == 0 && e.is_job_fatal() {
                    JobStatus::Failed
                } else {
                    ScanJob::final_status(&counters, handle.is_cancelled())
                };
                e.log();
                if let Err(save_err) = self.store.save_job(&job).await {
                    warn!("⚠️ Job {}: could not persist {} status: {}", job_id, job.status, save_err);
                }
                info!("🏁 Job {} ended {}", job_id, job.status);
                Err(e)
            }
        }
    }

    /// Polls the store for a cancellation requested from elsewhere.
    fn spawn_cancel_watcher(&self, handle: Arc<JobHandle>) -> tokio::task::JoinHandle<()> {
        let store = self.store.clone();
        let clock = self.clock.clone();
        let interval = self.cancel_poll_interval;

        tokio::spawn(async move {
            loop {
                clock.sleep(interval).await;
                if handle.is_cancelled() {
                    break;
                }
                match store.is_cancel_requested(handle.job_id).await {
                    Ok(true) => {
                        info!("🛑 Cancellation requested for job {}", handle.job_id);
                        handle.cancel();
                        break;
                    }
                    Ok(false) => {}
                    Err(e) => warn!("⚠️ Cancel poll for job {} failed: {}", handle.job_id, e),
                }
            }
        })
    }

    /// Requests cooperative cancellation. PENDING jobs are cancelled at once,
    /// RUNNING jobs stop dispatching and end CANCELLED, terminal jobs are
    /// left as they are. Returns the status after the request.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<JobStatus> {
        let mut job = self.load(job_id).await?;

        match job.status {
            JobStatus::Pending => {
                job.status = JobStatus::Cancelled;
                job.cancel_requested = true;
                job.completed_at = Some(Utc::now());
                self.store.save_job(&job).await?;
                info!("🛑 Job {} cancelled before start", job_id);
                Ok(JobStatus::Cancelled)
            }
            JobStatus::Running => {
                self.store.request_cancel(job_id).await?;
                if let Some(handle) = self.running.get(&job_id) {
                    handle.cancel();
                }
                info!("🛑 Cancellation requested for running job {}", job_id);
                Ok(JobStatus::Running)
            }
            status => {
                info!("Job {} is already {}, nothing to cancel", job_id, status);
                Ok(status)
            }
        }
    }

    /// Creates a follow-up job for `source_job_id`.
    ///
    /// With `copy_only` the new job covers enabled catalog targets that no job
    /// in the source's lineage has either scanned successfully or failed
    /// permanently. Without it the new job covers the whole enabled catalog.
    pub async fn restart_job(&self, source_job_id: JobId, settings: ScanSettings, copy_only: bool) -> Result<JobId> {
        self.load(source_job_id).await?;
        settings.validate()?;

        let all_enabled = self.catalog.list_enabled_targets().await?;

        let targets = if copy_only {
            let (succeeded, permanently_failed) = self.lineage_outcomes(source_job_id).await?;
            let remaining = resume_targets(&all_enabled, &succeeded, &permanently_failed);
            info!(
                "🔁 Restart of {}: {} enabled, {} succeeded, {} failed permanently, {} remaining",
                source_job_id,
                all_enabled.len(),
                succeeded.len(),
                permanently_failed.len(),
                remaining.len()
            );
            remaining
        } else {
            all_enabled
        };

        if targets.is_empty() {
            let err = ScanError::NoWork(format!("restart of job {} has no targets left to scan", source_job_id));
            err.log();
            return Err(err);
        }

        self.create_with_parent(targets, settings, Some(source_job_id)).await
    }

    /// Succeeded and permanently failed ASINs across a job and its ancestors.
    async fn lineage_outcomes(&self, job_id: JobId) -> Result<(HashSet<String>, HashSet<String>)> {
        let mut succeeded = HashSet::new();
        let mut permanently_failed = HashSet::new();
        let mut seen = HashSet::new();
        let mut cursor = Some(job_id);

        while let Some(id) = cursor {
            if !seen.insert(id) {
                warn!("⚠️ Job lineage loops back to {}", id);
                break;
            }

            succeeded.extend(self.store.succeeded_asins(id).await?);
            permanently_failed.extend(
                self.store
                    .failures(id)
                    .await?
                    .into_iter()
                    .filter(|f| f.reason.is_permanent())
                    .map(|f| f.asin),
            );

            cursor = match self.store.get_job(id).await? {
                Some(job) => job.parent_job_id,
                None => None,
            };
        }

        Ok((succeeded, permanently_failed))
    }

    pub async fn job_report(&self, job_id: JobId) -> Result<JobReport> {
        let job = self.load(job_id).await?;
        let failures = self.store.failures(job_id).await?;
        Ok(JobReport { job, failures })
    }
}
