// src/scan/sources.rs
//! Interfaces to the external collaborators of the scan engine.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use thiserror::Error;

use super::failure::FailureRecord;
use super::job::{CounterDelta, JobId, ScanJob, ScanTarget};
use crate::error::Result;
use crate::pricing::types::{CostBreakdown, RawOfferList, ScanResult};

/// Failure of a single pricing call.
#[derive(Debug, Clone, Error)]
pub enum PricingError {
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Authentication failed: {0}")]
    Auth(String),
}

#[derive(Debug, Clone, Error)]
pub enum CostLookupError {
    #[error("no cost breakdown for SKU {0}")]
    NotFound(String),

    #[error("cost model unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccessToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Fails with `ScanError::CatalogUnavailable`.
    async fn list_enabled_targets(&self) -> Result<Vec<ScanTarget>>;
}

#[async_trait]
pub trait PricingSource: Send + Sync {
    async fn get_offers(&self, asin: &str, marketplace_id: &str) -> std::result::Result<RawOfferList, PricingError>;

    /// Setup performed before any target is dispatched (e.g. token prefetch).
    async fn warm_up(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fails with `ScanError::AuthFailure`.
    async fn get_access_token(&self) -> Result<AccessToken>;
}

#[async_trait]
pub trait CostModelSource: Send + Sync {
    async fn get_cost_breakdown(&self, sku: &str) -> std::result::Result<CostBreakdown, CostLookupError>;
}

/// Persistence for jobs, scan results and the failure ledger.
///
/// Every write is idempotent under at-least-once delivery. `upsert_snapshot`
/// and `insert_failure` return `true` only when they record the first terminal
/// outcome for `(job_id, asin)`; callers bump job counters on `true` only.
#[async_trait]
pub trait ResultStore: Send + Sync {
    async fn save_job(&self, job: &ScanJob) -> Result<()>;

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>>;

    async fn upsert_snapshot(&self, job_id: JobId, result: &ScanResult) -> Result<bool>;

    async fn insert_failure(&self, record: &FailureRecord) -> Result<bool>;

    async fn update_job_counters(&self, job_id: JobId, delta: CounterDelta) -> Result<()>;

    async fn request_cancel(&self, job_id: JobId) -> Result<()>;

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool>;

    async fn succeeded_asins(&self, job_id: JobId) -> Result<HashSet<String>>;

    async fn failures(&self, job_id: JobId) -> Result<Vec<FailureRecord>>;

    /// Most recent result for an ASIN across all jobs.
    async fn latest_result(&self, asin: &str) -> Result<Option<ScanResult>>;
}
