// src/api/retry.rs
//! Outcome classification and retry loop for pricing calls.

use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::rate_limiter::ScanRateLimiter;
use crate::pricing::types::RawOfferList;
use crate::scan::failure::FailureReason;
use crate::scan::sources::PricingError;
use crate::utils::Clock;

/// Closed classification of one call's result.
#[derive(Debug, Clone, PartialEq)]
pub enum CallOutcome<T> {
    Success(T),
    /// 429, 5xx, timeouts and connection failures
    Transient(String),
    /// Other 4xx or a structurally invalid response
    Permanent { reason: FailureReason, detail: String },
    /// 401/403 or a token that could not be obtained
    AuthFailure(String),
}

/// Structural validation applied to a successful response.
pub trait CheckedResponse {
    fn check(&self) -> Result<(), String>;
}

impl CheckedResponse for RawOfferList {
    fn check(&self) -> Result<(), String> {
        self.validate()
    }
}

pub fn classify_status<T>(status: u16, body: &str) -> CallOutcome<T> {
    let detail = format!("HTTP {}: {}", status, body);
    match status {
        401 | 403 => CallOutcome::AuthFailure(detail),
        429 | 500..=599 => CallOutcome::Transient(detail),
        _ => CallOutcome::Permanent {
            reason: FailureReason::PermanentError,
            detail,
        },
    }
}

pub fn classify<T: CheckedResponse>(result: Result<T, PricingError>) -> CallOutcome<T> {
    match result {
        Ok(value) => match value.check() {
            Ok(()) => CallOutcome::Success(value),
            Err(detail) => CallOutcome::Permanent {
                reason: FailureReason::InvalidResponse,
                detail,
            },
        },
        Err(PricingError::Http { status, body }) => classify_status(status, &body),
        Err(e @ PricingError::Timeout(_)) | Err(e @ PricingError::Network(_)) => CallOutcome::Transient(e.to_string()),
        Err(e @ PricingError::InvalidResponse(_)) => CallOutcome::Permanent {
            reason: FailureReason::InvalidResponse,
            detail: e.to_string(),
        },
        Err(e @ PricingError::Auth(_)) => CallOutcome::AuthFailure(e.to_string()),
    }
}

/// Exponential backoff: `base_delay * 2^attempt`, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            max_delay: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    /// Delay before retry number `attempt` (0 for the first retry).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Terminal result of a retried call. `retries` never exceeds `max_retries`.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryResult<T> {
    Success { value: T, retries: u32 },
    Failed { reason: FailureReason, detail: String, retries: u32 },
}

pub struct RetryExecutor<'a> {
    policy: &'a RetryPolicy,
    limiter: &'a ScanRateLimiter,
    clock: Arc<dyn Clock>,
    label: String,
}

impl<'a> RetryExecutor<'a> {
    pub fn new(policy: &'a RetryPolicy, limiter: &'a ScanRateLimiter, clock: Arc<dyn Clock>, label: &str) -> Self {
        Self {
            policy,
            limiter,
            clock,
            label: label.to_string(),
        }
    }

    /// Runs `operation` through the limiter until it yields a terminal outcome.
    /// Every attempt, retries included, passes the rate limiter first.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> RetryResult<T>
    where
        T: CheckedResponse,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, PricingError>>,
    {
        let mut retries = 0u32;

        loop {
            self.limiter.acquire().await;

            match classify(operation().await) {
                CallOutcome::Success(value) => {
                    if retries > 0 {
                        info!("✅ {} succeeded after {} retries", self.label, retries);
                    }
                    return RetryResult::Success { value, retries };
                }
                CallOutcome::Transient(detail) => {
                    if retries >= self.policy.max_retries {
                        warn!(
                            "🚫 {} giving up after {} retries: {}",
                            self.label, retries, detail
                        );
                        return RetryResult::Failed {
                            reason: FailureReason::RetriesExhausted,
                            detail,
                            retries,
                        };
                    }

                    let delay = self.policy.delay_for_attempt(retries) + self.limiter.jitter();
                    warn!(
                        "🔄 {} attempt {}/{} failed: {} (retrying in {:?})",
                        self.label,
                        retries + 1,
                        self.policy.max_retries + 1,
                        detail,
                        delay
                    );
                    self.clock.sleep(delay).await;
                    retries += 1;
                }
                CallOutcome::Permanent { reason, detail } => {
                    warn!("❌ {} permanent failure ({}): {}", self.label, reason, detail);
                    return RetryResult::Failed { reason, detail, retries };
                }
                CallOutcome::AuthFailure(detail) => {
                    error!("🔐 AUTH FAILURE for {}: {} (not retried)", self.label, detail);
                    return RetryResult::Failed {
                        reason: FailureReason::AuthFailure,
                        detail,
                        retries,
                    };
                }
            }
        }
    }
}
