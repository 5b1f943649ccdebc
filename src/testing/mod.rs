//! Test doubles for the scan engine.
//!
//! - [`ManualClock`]: virtual time, sleeps complete instantly
//! - [`mocks`]: scripted catalog, pricing and cost collaborators

pub mod mocks;

pub use mocks::{ScriptedPricingSource, StaticCatalog, StaticCostModel};

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::utils::Clock;

/// Clock whose `sleep` advances virtual time by the requested duration and
/// yields once to the scheduler.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.lock() {
            *now += by;
        }
    }
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.lock().map(|now| *now).unwrap_or_default()
    }

    async fn sleep(&self, duration: Duration) {
        self.advance(duration);
        tokio::task::yield_now().await;
    }
}
