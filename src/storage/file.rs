// src/storage/file.rs
//! JSON-file result store.
//!
//! The store is held in memory and written back to disk as a whole (write to
//! `<path>.tmp`, then rename). Several processes may share one file: every
//! write happens under `<path>.lock`, re-reads the file first and merges it, so
//! jobs and outcomes written by other processes survive. Outcome writes are
//! flushed together with the counter update that follows them.
//! Cancellation requests are also dropped as marker files under
//! `<path>.cancel/` so a `cancel` issued from another process reaches a
//! running job between writes.

use async_trait::async_trait;
use dashmap::DashSet;
use log::{debug, info, warn};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use tokio::sync::Mutex;

use super::memory::{MemoryResultStore, StoreState};
use crate::error::{Result, ScanError};
use crate::pricing::types::ScanResult;
use crate::scan::failure::FailureRecord;
use crate::scan::job::{CounterDelta, JobId, ScanJob};
use crate::scan::sources::ResultStore;

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(20);
const LOCK_TIMEOUT: Duration = Duration::from_secs(10);
/// A lock file older than this is left over from a crashed process.
const LOCK_STALE_AFTER: Duration = Duration::from_secs(30);

async fn read_state(path: &Path) -> Result<StoreState> {
    match tokio::fs::read_to_string(path).await {
        Ok(raw) if !raw.trim().is_empty() => Ok(serde_json::from_str::<StoreState>(&raw)?),
        Ok(_) => Ok(StoreState::default()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(StoreState::default()),
        Err(e) => Err(e.into()),
    }
}

/// Exclusive lock file, removed on drop.
struct StoreLock {
    path: PathBuf,
}

impl StoreLock {
    async fn acquire(path: PathBuf) -> Result<Self> {
        let started = Instant::now();
        loop {
            let created = tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await;
            match created {
                Ok(_) => return Ok(Self { path }),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(&path).await {
                        warn!("⚠️ Removing stale store lock {}", path.display());
                        let _ = tokio::fs::remove_file(&path).await;
                        continue;
                    }
                    if started.elapsed() >= LOCK_TIMEOUT {
                        return Err(ScanError::StorageError(format!(
                            "timed out waiting for store lock {}",
                            path.display()
                        )));
                    }
                    tokio::time::sleep(LOCK_RETRY_INTERVAL).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn is_stale(path: &Path) -> bool {
        let modified = match tokio::fs::metadata(path).await.and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(_) => return false,
        };
        SystemTime::now()
            .duration_since(modified)
            .map(|age| age > LOCK_STALE_AFTER)
            .unwrap_or(false)
    }
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

pub struct JsonFileStore {
    path: PathBuf,
    lock_path: PathBuf,
    cancel_dir: PathBuf,
    inner: MemoryResultStore,
    owned_jobs: DashSet<JobId>,
    owned_outcomes: DashSet<(JobId, String)>,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let cancel_dir = PathBuf::from(format!("{}.cancel", path.display()));
        let lock_path = PathBuf::from(format!("{}.lock", path.display()));

        let state = read_state(&path).await?;

        info!(
            "💾 Opened result store {} ({} jobs, {} outcomes)",
            path.display(),
            state.jobs.len(),
            state.outcomes.len()
        );

        Ok(Self {
            path,
            lock_path,
            cancel_dir,
            inner: MemoryResultStore::restore(state),
            owned_jobs: DashSet::new(),
            owned_outcomes: DashSet::new(),
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Merges the file's current content and writes the result back.
    pub async fn flush(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let _file_lock = StoreLock::acquire(self.lock_path.clone()).await?;

        let on_disk = read_state(&self.path).await?;
        self.inner.merge_from(
            on_disk,
            |job_id| self.owned_jobs.contains(job_id),
            |key| self.owned_outcomes.contains(key),
        );

        let json = serde_json::to_vec(&self.inner.export())?;
        let tmp = PathBuf::from(format!("{}.tmp", self.path.display()));
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("💾 Store written to {}", self.path.display());
        Ok(())
    }

    fn cancel_marker(&self, job_id: JobId) -> PathBuf {
        self.cancel_dir.join(job_id.to_string())
    }

    async fn has_cancel_marker(&self, job_id: JobId) -> bool {
        tokio::fs::metadata(self.cancel_marker(job_id)).await.is_ok()
    }
}

#[async_trait]
impl ResultStore for JsonFileStore {
    async fn save_job(&self, job: &ScanJob) -> Result<()> {
        self.inner.save_job(job).await?;
        self.owned_jobs.insert(job.id);
        self.flush().await
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>> {
        let job = self.inner.get_job(job_id).await?;
        match job {
            Some(mut job) => {
                job.cancel_requested |= self.has_cancel_marker(job_id).await;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    async fn upsert_snapshot(&self, job_id: JobId, result: &ScanResult) -> Result<bool> {
        let first = self.inner.upsert_snapshot(job_id, result).await?;
        self.owned_outcomes.insert((job_id, result.snapshot.asin.clone()));
        if !first {
            // No counter update follows a replacement.
            self.flush().await?;
        }
        Ok(first)
    }

    async fn insert_failure(&self, record: &FailureRecord) -> Result<bool> {
        let first = self.inner.insert_failure(record).await?;
        if first {
            self.owned_outcomes.insert((record.job_id, record.asin.clone()));
        }
        Ok(first)
    }

    async fn update_job_counters(&self, job_id: JobId, delta: CounterDelta) -> Result<()> {
        self.inner.update_job_counters(job_id, delta).await?;
        self.owned_jobs.insert(job_id);
        self.flush().await
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<()> {
        self.inner.request_cancel(job_id).await?;
        tokio::fs::create_dir_all(&self.cancel_dir).await?;
        tokio::fs::write(self.cancel_marker(job_id), chrono::Utc::now().to_rfc3339()).await?;
        self.flush().await
    }

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool> {
        if self.inner.is_cancel_requested(job_id).await? {
            return Ok(true);
        }
        Ok(self.has_cancel_marker(job_id).await)
    }

    async fn succeeded_asins(&self, job_id: JobId) -> Result<HashSet<String>> {
        self.inner.succeeded_asins(job_id).await
    }

    async fn failures(&self, job_id: JobId) -> Result<Vec<FailureRecord>> {
        self.inner.failures(job_id).await
    }

    async fn latest_result(&self, asin: &str) -> Result<Option<ScanResult>> {
        self.inner.latest_result(asin).await
    }
}
