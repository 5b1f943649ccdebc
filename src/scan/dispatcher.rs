// src/scan/dispatcher.rs
//! Worker pool that drains a job's target queue.
//!
//! Every worker shares one queue, one rate limiter and one retry policy.
//! Per target: cost lookup, rate-limited pricing call with retries, offer
//! analysis and margin calculation, then a single idempotent store write.

use chrono::Utc;
use dashmap::DashMap;
use itertools::Itertools;
use log::{debug, error, info, warn};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::failure::{FailureReason, FailureRecord};
use super::job::{CounterDelta, CounterSnapshot, JobHandle, JobId, ScanJob, ScanTarget};
use super::sources::{CostLookupError, CostModelSource, PricingSource, ResultStore};
use crate::api::rate_limiter::ScanRateLimiter;
use crate::api::retry::{RetryExecutor, RetryPolicy, RetryResult};
use crate::error::Result;
use crate::pricing::margin::{analyze_snapshot, MarginThresholds};
use crate::pricing::offer_analyzer::analyze_offers;
use crate::pricing::types::{RecommendedAction, ScanResult};
use crate::utils::Clock;

/// Collaborators shared by every job the dispatcher runs.
#[derive(Clone)]
pub struct DispatcherDeps {
    pub pricing: Arc<dyn PricingSource>,
    pub cost_model: Arc<dyn CostModelSource>,
    pub store: Arc<dyn ResultStore>,
    pub clock: Arc<dyn Clock>,
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub worker_count: usize,
    pub marketplace_id: String,
    pub seller_id: String,
    pub base_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub thresholds: MarginThresholds,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            marketplace_id: String::new(),
            seller_id: String::new(),
            base_retry_delay: Duration::from_millis(1000),
            max_retry_delay: Duration::from_secs(300),
            thresholds: MarginThresholds::default(),
        }
    }
}

/// What a run left behind.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub counters: CounterSnapshot,
    pub cancelled: bool,
    pub actions: HashMap<RecommendedAction, u64>,
}

struct WorkerContext {
    job_id: JobId,
    deps: DispatcherDeps,
    config: DispatcherConfig,
    limiter: ScanRateLimiter,
    policy: RetryPolicy,
    queue: Mutex<VecDeque<ScanTarget>>,
    handle: Arc<JobHandle>,
    actions: DashMap<RecommendedAction, u64>,
}

pub struct ScanDispatcher {
    deps: DispatcherDeps,
    config: DispatcherConfig,
}

impl ScanDispatcher {
    pub fn new(deps: DispatcherDeps, config: DispatcherConfig) -> Self {
        Self { deps, config }
    }

    /// Drains `job.targets` until the queue is empty or `handle` is cancelled.
    ///
    /// Returns an error only for setup failures (invalid settings, pricing
    /// warm-up) or a worker that died; per-target failures land in the
    /// failure ledger instead.
    pub async fn run(&self, job: &ScanJob, handle: Arc<JobHandle>) -> Result<RunSummary> {
        let limiter = ScanRateLimiter::new(&job.settings, self.deps.clock.clone())?;

        self.deps.pricing.warm_up().await?;

        let queue: VecDeque<ScanTarget> = job.targets.iter().unique_by(|t| t.asin.clone()).cloned().collect();
        let worker_count = self.config.worker_count.max(1).min(queue.len().max(1));

        info!(
            "🚀 Job {}: dispatching {} targets across {} workers ({})",
            job.id,
            queue.len(),
            worker_count,
            limiter.stats()
        );

        let ctx = Arc::new(WorkerContext {
            job_id: job.id,
            deps: self.deps.clone(),
            config: self.config.clone(),
            limiter,
            policy: RetryPolicy::new(
                job.settings.max_retries,
                self.config.base_retry_delay,
                self.config.max_retry_delay,
            ),
            queue: Mutex::new(queue),
            handle: handle.clone(),
            actions: DashMap::new(),
        });

        let workers: Vec<_> = (0..worker_count)
            .map(|worker_id| {
                let ctx = ctx.clone();
                tokio::spawn(async move { ctx.work(worker_id).await })
            })
            .collect();

        for joined in futures::future::join_all(workers).await {
            joined?;
        }

        let summary = RunSummary {
            counters: handle.counters.snapshot(),
            cancelled: handle.is_cancelled(),
            actions: ctx.actions.iter().map(|e| (*e.key(), *e.value())).collect(),
        };
        log_summary(job.id, &summary);
        Ok(summary)
    }
}

fn log_summary(job_id: JobId, summary: &RunSummary) {
    let c = &summary.counters;
    info!(
        "📊 Job {} {}: processed {}/{} (successful {}, failed {})",
        job_id,
        if summary.cancelled { "stopped" } else { "drained" },
        c.processed,
        c.total,
        c.successful,
        c.failed
    );

    let actions = [
        RecommendedAction::MatchBuybox,
        RecommendedAction::HoldPrice,
        RecommendedAction::Investigate,
        RecommendedAction::NotProfitable,
    ]
    .iter()
    .map(|a| format!("{}={}", a, summary.actions.get(a).copied().unwrap_or(0)))
    .join(", ");
    info!("📊 Job {} recommendations: {}", job_id, actions);
}

impl WorkerContext {
    async fn work(&self, worker_id: usize) {
        debug!("👷 Worker {} started for job {}", worker_id, self.job_id);

        loop {
            if self.handle.is_cancelled() {
                info!("🛑 Worker {} observed cancellation of job {}", worker_id, self.job_id);
                break;
            }

            let next = self.queue.lock().await.pop_front();
            let target = match next {
                Some(target) => target,
                None => break,
            };

            self.process(&target).await;
        }

        debug!("👷 Worker {} finished for job {}", worker_id, self.job_id);
    }

    async fn process(&self, target: &ScanTarget) {
        let cost = match self.deps.cost_model.get_cost_breakdown(&target.sku).await {
            Ok(cost) => cost,
            Err(CostLookupError::NotFound(sku)) => {
                let detail = format!("no cost breakdown for SKU {}", sku);
                self.record_failure(target, FailureReason::NoCostData, detail, 0).await;
                return;
            }
            Err(CostLookupError::Unavailable(msg)) => {
                self.record_failure(target, FailureReason::CostSourceUnavailable, msg, 0)
                    .await;
                return;
            }
        };

        let pricing = &self.deps.pricing;
        let marketplace_id = self.config.marketplace_id.as_str();
        let asin = target.asin.as_str();
        let executor = RetryExecutor::new(&self.policy, &self.limiter, self.deps.clock.clone(), asin);

        match executor.execute(|| pricing.get_offers(asin, marketplace_id)).await {
            RetryResult::Success { value, retries } => {
                let snapshot = analyze_offers(target, &value, &self.config.seller_id, Utc::now());
                let margin = analyze_snapshot(&snapshot, &cost, &self.config.thresholds);
                debug!(
                    "🔍 {} ({}): {} offers, {} → {} after {} retries",
                    target.asin, target.sku, snapshot.total_offers, snapshot.pricing_status, margin.recommended_action, retries
                );
                self.record_success(ScanResult { snapshot, margin }).await;
            }
            RetryResult::Failed {
                reason,
                detail,
                retries,
            } => {
                self.record_failure(target, reason, detail, retries).await;
            }
        }
    }

    async fn record_success(&self, result: ScanResult) {
        let action = result.margin.recommended_action;
        match self.deps.store.upsert_snapshot(self.job_id, &result).await {
            Ok(true) => {
                self.handle.counters.record_success();
                *self.actions.entry(action).or_insert(0) += 1;
                if let Err(e) = self
                    .deps
                    .store
                    .update_job_counters(self.job_id, CounterDelta::success())
                    .await
                {
                    warn!("⚠️ Job {}: failed to persist counters: {}", self.job_id, e);
                }
            }
            Ok(false) => debug!("♻️ {} already recorded for job {}", result.snapshot.asin, self.job_id),
            Err(e) => error!(
                "❌ Job {}: failed to store snapshot for {}: {}",
                self.job_id, result.snapshot.asin, e
            ),
        }
    }

    async fn record_failure(&self, target: &ScanTarget, reason: FailureReason, detail: String, retries: u32) {
        let record = FailureRecord::new(self.job_id, target, reason, detail, retries);
        match self.deps.store.insert_failure(&record).await {
            Ok(true) => {
                self.handle.counters.record_failure();
                if let Err(e) = self
                    .deps
                    .store
                    .update_job_counters(self.job_id, CounterDelta::failure())
                    .await
                {
                    warn!("⚠️ Job {}: failed to persist counters: {}", self.job_id, e);
                }
            }
            Ok(false) => debug!("♻️ Failure for {} already recorded for job {}", target.asin, self.job_id),
            Err(e) => error!(
                "❌ Job {}: failed to store failure for {}: {}",
                self.job_id, target.asin, e
            ),
        }
    }
}
