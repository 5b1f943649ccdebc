// src/api/auth.rs
//! Access-token handling for the pricing endpoint.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use log::{debug, info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::error::{Result, ScanError};
use crate::scan::sources::{AccessToken, AuthProvider};

/// Provider for a pre-issued token, as supplied through `SP_API_ACCESS_TOKEN`.
/// Each call reissues it with a fresh `ttl`.
pub struct StaticTokenProvider {
    token: String,
    ttl: ChronoDuration,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>, ttl_secs: u64) -> Self {
        Self {
            token: token.into(),
            ttl: ChronoDuration::seconds(ttl_secs as i64),
        }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn get_access_token(&self) -> Result<AccessToken> {
        if self.token.trim().is_empty() {
            return Err(ScanError::AuthFailure("no access token configured".to_string()));
        }
        Ok(AccessToken {
            token: self.token.clone(),
            expires_at: Utc::now() + self.ttl,
        })
    }
}

/// Caches the current token and refreshes it `refresh_skew` before expiry,
/// so no request goes out with a token about to lapse.
pub struct TokenCache {
    provider: Arc<dyn AuthProvider>,
    refresh_skew: ChronoDuration,
    current: Mutex<Option<AccessToken>>,
}

impl TokenCache {
    pub fn new(provider: Arc<dyn AuthProvider>, refresh_skew_secs: u64) -> Self {
        Self {
            provider,
            refresh_skew: ChronoDuration::seconds(refresh_skew_secs as i64),
            current: Mutex::new(None),
        }
    }

    pub async fn token(&self) -> Result<String> {
        let mut current = self.current.lock().await;

        if let Some(cached) = current.as_ref() {
            if Utc::now() + self.refresh_skew < cached.expires_at {
                return Ok(cached.token.clone());
            }
            debug!("🔑 Access token expires at {}, refreshing", cached.expires_at);
        }

        match self.provider.get_access_token().await {
            Ok(fresh) => {
                info!("🔑 Obtained access token (expires {})", fresh.expires_at);
                let token = fresh.token.clone();
                *current = Some(fresh);
                Ok(token)
            }
            Err(e) => {
                warn!("🔐 Access token refresh failed: {}", e);
                *current = None;
                Err(e)
            }
        }
    }

    pub async fn invalidate(&self) {
        *self.current.lock().await = None;
    }
}
