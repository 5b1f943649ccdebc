// src/scan/job.rs
//! Scan job records: identity, status, settings, targets and progress counters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use uuid::Uuid;

use crate::error::{Result, ScanError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for JobId {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self> {
        Uuid::parse_str(s.trim())
            .map(JobId)
            .map_err(|e| ScanError::ConfigurationError(format!("invalid job id '{}': {}", s, e)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Running => "RUNNING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Partial => "PARTIAL",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-job dispatch settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSettings {
    /// Steady dispatch rate; fractional values allowed (0.1 = one call per 10s).
    pub requests_per_second: f64,
    /// Extra random delay as a fraction of the dispatch interval, 0..=1.
    pub jitter_fraction: f64,
    pub max_retries: u32,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            requests_per_second: 0.5,
            jitter_fraction: 0.2,
            max_retries: 3,
        }
    }
}

impl ScanSettings {
    pub fn validate(&self) -> Result<()> {
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(ScanError::ConfigurationError(format!(
                "requestsPerSecond must be a positive number, got {}",
                self.requests_per_second
            )));
        }
        if !(0.0..=1.0).contains(&self.jitter_fraction) {
            return Err(ScanError::ConfigurationError(format!(
                "jitterFraction must be within 0..=1, got {}",
                self.jitter_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanTarget {
    pub sku: String,
    pub asin: String,
}

impl ScanTarget {
    pub fn new(sku: impl Into<String>, asin: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            asin: asin.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub total: u64,
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
}

impl CounterSnapshot {
    pub fn is_consistent(&self) -> bool {
        self.processed == self.successful + self.failed && self.processed <= self.total
    }
}

/// Increment applied to a persisted job's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterDelta {
    pub processed: u64,
    pub successful: u64,
    pub failed: u64,
}

impl CounterDelta {
    pub fn success() -> Self {
        Self {
            processed: 1,
            successful: 1,
            failed: 0,
        }
    }

    pub fn failure() -> Self {
        Self {
            processed: 1,
            successful: 0,
            failed: 1,
        }
    }
}

impl CounterSnapshot {
    pub fn apply(&mut self, delta: CounterDelta) {
        self.processed += delta.processed;
        self.successful += delta.successful;
        self.failed += delta.failed;
    }
}

/// Live job-scoped counters shared by all workers.
#[derive(Debug)]
pub struct JobCounters {
    total: AtomicU64,
    processed: AtomicU64,
    successful: AtomicU64,
    failed: AtomicU64,
}

impl JobCounters {
    pub fn new(total: u64) -> Self {
        Self {
            total: AtomicU64::new(total),
            processed: AtomicU64::new(0),
            successful: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Outcome counter first, then `processed`, so a concurrent reader never
    /// sees `processed` ahead of `successful + failed`.
    pub fn record_success(&self) {
        self.successful.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn record_failure(&self) {
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.processed.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let processed = self.processed.load(Ordering::SeqCst);
        CounterSnapshot {
            total: self.total.load(Ordering::SeqCst),
            processed,
            successful: self.successful.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        }
    }
}

/// Persisted job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanJob {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub settings: ScanSettings,
    pub counters: CounterSnapshot,
    pub targets: Vec<ScanTarget>,
    pub parent_job_id: Option<JobId>,
    #[serde(default)]
    pub cancel_requested: bool,
}

impl ScanJob {
    pub fn new(targets: Vec<ScanTarget>, settings: ScanSettings, parent_job_id: Option<JobId>) -> Self {
        let total = targets.len() as u64;
        Self {
            id: JobId::new(),
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            settings,
            counters: CounterSnapshot {
                total,
                ..CounterSnapshot::default()
            },
            targets,
            parent_job_id,
            cancel_requested: false,
        }
    }

    /// Terminal status for a run that drained (or stopped draining) its queue.
    pub fn final_status(counters: &CounterSnapshot, cancelled: bool) -> JobStatus {
        if cancelled {
            JobStatus::Cancelled
        } else if counters.processed == counters.total && counters.failed == 0 {
            JobStatus::Completed
        } else {
            JobStatus::Partial
        }
    }
}

/// In-process control block for a job while it runs.
#[derive(Debug)]
pub struct JobHandle {
    pub job_id: JobId,
    pub counters: JobCounters,
    cancelled: AtomicBool,
}

impl JobHandle {
    pub fn new(job_id: JobId, total: u64) -> Self {
        Self {
            job_id,
            counters: JobCounters::new(total),
            cancelled: AtomicBool::new(false),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
