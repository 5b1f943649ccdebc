// src/api/mod.rs
//! Outbound pricing calls: dispatch rate limiting, retry classification,
//! access tokens and the SP-API offers client.

pub mod auth;
pub mod rate_limiter;
pub mod retry;
pub mod sp_api;

pub use auth::{StaticTokenProvider, TokenCache};
pub use rate_limiter::{RateLimitStats, ScanRateLimiter};
pub use retry::{CallOutcome, RetryExecutor, RetryPolicy, RetryResult};
pub use sp_api::SpApiPricingClient;
