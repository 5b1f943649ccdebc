// src/scan/failure.rs
//! Failure ledger entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::job::{JobId, ScanTarget};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Transient errors outlasted `max_retries`
    RetriesExhausted,
    /// Non-retryable 4xx from the pricing source
    PermanentError,
    /// Credentials rejected by the pricing source or token refresh failed
    AuthFailure,
    /// Response did not pass structural validation
    InvalidResponse,
    /// Cost model has no breakdown for the SKU
    NoCostData,
    /// Cost model could not be reached
    CostSourceUnavailable,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::RetriesExhausted => "retries_exhausted",
            FailureReason::PermanentError => "permanent_error",
            FailureReason::AuthFailure => "auth_failure",
            FailureReason::InvalidResponse => "invalid_response",
            FailureReason::NoCostData => "no_cost_data",
            FailureReason::CostSourceUnavailable => "cost_source_unavailable",
        }
    }

    /// Failures intrinsic to the target. Resumption skips these; the
    /// environmental ones (exhausted retries, credentials, cost source
    /// outages) stay eligible for a later run.
    pub fn is_permanent(&self) -> bool {
        match self {
            FailureReason::PermanentError | FailureReason::InvalidResponse | FailureReason::NoCostData => true,
            FailureReason::RetriesExhausted | FailureReason::AuthFailure | FailureReason::CostSourceUnavailable => {
                false
            }
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Written once per target that ends in failure; never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureRecord {
    pub job_id: JobId,
    pub asin: String,
    pub sku: String,
    pub reason: FailureReason,
    pub detail: String,
    pub retry_count: u32,
    pub timestamp: DateTime<Utc>,
}

impl FailureRecord {
    pub fn new(job_id: JobId, target: &ScanTarget, reason: FailureReason, detail: String, retry_count: u32) -> Self {
        Self {
            job_id,
            asin: target.asin.clone(),
            sku: target.sku.clone(),
            reason,
            detail,
            retry_count,
            timestamp: Utc::now(),
        }
    }
}
