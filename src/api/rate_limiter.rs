// src/api/rate_limiter.rs
//! Shared dispatch gate for the competitive-pricing endpoint.
//!
//! One limiter instance is shared by every scan worker of a job:
//! - Steady rate of `requests_per_second` (fractional rates allowed, 0.1 = one call per 10s)
//! - Consecutive dispatches are never closer than `1 / requests_per_second`
//! - Extra random jitter of up to `interval * jitter_fraction` after each wait
//! - Last-dispatch state lives behind a lock, so two workers can never pass the gate together

use log::{debug, info};
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::scan::job::ScanSettings;
use crate::utils::Clock;

const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Dispatch interval for a rate, rounded up to the nanosecond so rounding can
/// only loosen the floor.
pub fn interval_for_rate(requests_per_second: f64) -> Duration {
    Duration::from_nanos((NANOS_PER_SEC / requests_per_second).ceil() as u64)
}

pub struct ScanRateLimiter {
    interval: Duration,
    jitter_fraction: f64,
    clock: Arc<dyn Clock>,
    last_dispatch: Mutex<Option<Duration>>,
    dispatches: AtomicU64,
}

impl ScanRateLimiter {
    pub fn new(settings: &ScanSettings, clock: Arc<dyn Clock>) -> Result<Self> {
        settings.validate()?;
        let interval = interval_for_rate(settings.requests_per_second);

        info!(
            "🚦 Initializing scan rate limiter: {:.3} req/s (interval {:?}), jitter {:.0}%",
            settings.requests_per_second,
            interval,
            settings.jitter_fraction * 100.0
        );

        Ok(Self {
            interval,
            jitter_fraction: settings.jitter_fraction,
            clock,
            last_dispatch: Mutex::new(None),
            dispatches: AtomicU64::new(0),
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Blocks the calling worker until it may dispatch, and returns the
    /// dispatch time on the limiter's clock.
    ///
    /// The lock is held across both waits; the next worker starts measuring
    /// from this dispatch, never from a stale one.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_dispatch.lock().await;

        if let Some(previous) = *last {
            let earliest = previous + self.interval;
            let now = self.clock.now();
            if now < earliest {
                let wait = earliest - now;
                debug!("⏳ Rate limiter holding dispatch for {:?}", wait);
                self.clock.sleep(wait).await;
            }
        }

        let jitter = self.jitter();
        if !jitter.is_zero() {
            self.clock.sleep(jitter).await;
        }

        let dispatched_at = self.clock.now();
        *last = Some(dispatched_at);
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        dispatched_at
    }

    /// Random delay in `[0, interval * jitter_fraction)`.
    pub fn jitter(&self) -> Duration {
        let max_secs = self.interval.as_secs_f64() * self.jitter_fraction;
        if max_secs <= 0.0 {
            return Duration::ZERO;
        }
        let secs = rand::thread_rng().gen_range(0.0..max_secs);
        Duration::from_secs_f64(secs)
    }

    pub fn stats(&self) -> RateLimitStats {
        RateLimitStats {
            interval: self.interval,
            jitter_fraction: self.jitter_fraction,
            dispatches: self.dispatches.load(Ordering::SeqCst),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub interval: Duration,
    pub jitter_fraction: f64,
    pub dispatches: u64,
}

impl std::fmt::Display for RateLimitStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "interval:{:?}, jitter:{:.0}%, dispatches:{}",
            self.interval,
            self.jitter_fraction * 100.0,
            self.dispatches
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ManualClock;

    fn settings(rps: f64, jitter: f64) -> ScanSettings {
        ScanSettings {
            requests_per_second: rps,
            jitter_fraction: jitter,
            max_retries: 3,
        }
    }

    async fn collect_dispatches(rps: f64, jitter: f64, workers: usize, per_worker: usize) -> Vec<Duration> {
        let clock = Arc::new(ManualClock::new());
        let limiter = Arc::new(ScanRateLimiter::new(&settings(rps, jitter), clock).unwrap());

        let mut tasks = Vec::new();
        for _ in 0..workers {
            let limiter = limiter.clone();
            tasks.push(tokio::spawn(async move {
                let mut stamps = Vec::new();
                for _ in 0..per_worker {
                    stamps.push(limiter.acquire().await);
                }
                stamps
            }));
        }

        let mut all = Vec::new();
        for task in tasks {
            all.extend(task.await.unwrap());
        }
        all.sort();
        all
    }

    fn max_in_any_second(stamps: &[Duration]) -> usize {
        let window = Duration::from_secs(1);
        stamps
            .iter()
            .map(|start| stamps.iter().filter(|t| **t >= *start && **t < *start + window).count())
            .max()
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_dispatches_per_second_never_exceed_ceil_rate() {
        for rps in [0.1, 0.5, 1.0, 2.0, 3.0, 3.5, 10.0] {
            for jitter in [0.0, 0.25, 1.0] {
                let stamps = collect_dispatches(rps, jitter, 4, 10).await;
                assert_eq!(stamps.len(), 40);
                let ceiling = rps.ceil() as usize;
                assert!(
                    max_in_any_second(&stamps) <= ceiling,
                    "rate {} jitter {} produced {} dispatches in one second",
                    rps,
                    jitter,
                    max_in_any_second(&stamps)
                );
            }
        }
    }

    #[tokio::test]
    async fn test_consecutive_dispatches_respect_interval() {
        let stamps = collect_dispatches(0.1, 0.5, 3, 5).await;
        for pair in stamps.windows(2) {
            assert!(pair[1] - pair[0] >= Duration::from_secs(10));
        }
    }

    #[tokio::test]
    async fn test_first_dispatch_is_immediate_without_jitter() {
        let clock = Arc::new(ManualClock::new());
        let limiter = ScanRateLimiter::new(&settings(1.0, 0.0), clock.clone()).unwrap();
        assert_eq!(limiter.acquire().await, Duration::ZERO);
        assert_eq!(limiter.acquire().await, Duration::from_secs(1));
        assert_eq!(limiter.stats().dispatches, 2);
    }

    #[test]
    fn test_jitter_stays_below_fraction_of_interval() {
        let clock = Arc::new(ManualClock::new());
        let limiter = ScanRateLimiter::new(&settings(2.0, 0.5), clock).unwrap();
        for _ in 0..200 {
            assert!(limiter.jitter() <= Duration::from_millis(250));
        }

        let no_jitter = ScanRateLimiter::new(&settings(2.0, 0.0), Arc::new(ManualClock::new())).unwrap();
        assert_eq!(no_jitter.jitter(), Duration::ZERO);
    }

    #[test]
    fn test_rejects_non_positive_rate() {
        let clock = Arc::new(ManualClock::new());
        assert!(ScanRateLimiter::new(&settings(0.0, 0.1), clock.clone()).is_err());
        assert!(ScanRateLimiter::new(&settings(-1.0, 0.1), clock).is_err());
    }

    #[test]
    fn test_interval_rounds_up() {
        assert_eq!(interval_for_rate(3.0), Duration::from_nanos(333_333_334));
        assert_eq!(interval_for_rate(0.1), Duration::from_secs(10));
    }
}
