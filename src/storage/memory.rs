// src/storage/memory.rs
//! In-process result store backed by concurrent maps.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, ScanError};
use crate::pricing::types::ScanResult;
use crate::scan::failure::FailureRecord;
use crate::scan::job::{CounterDelta, JobId, ScanJob};
use crate::scan::sources::ResultStore;

/// Terminal outcome recorded for one `(job, asin)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TargetOutcome {
    Succeeded { result: ScanResult },
    Failed { record: FailureRecord },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOutcome {
    pub job_id: JobId,
    pub asin: String,
    #[serde(flatten)]
    pub outcome: TargetOutcome,
}

/// Serializable image of a whole store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreState {
    pub jobs: Vec<ScanJob>,
    pub outcomes: Vec<StoredOutcome>,
}

#[derive(Default)]
pub struct MemoryResultStore {
    jobs: DashMap<JobId, ScanJob>,
    outcomes: DashMap<(JobId, String), TargetOutcome>,
    latest: DashMap<String, ScanResult>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn restore(state: StoreState) -> Self {
        let store = Self::new();
        for job in state.jobs {
            store.jobs.insert(job.id, job);
        }
        for stored in state.outcomes {
            if let TargetOutcome::Succeeded { result } = &stored.outcome {
                store.remember_latest(result);
            }
            store.outcomes.insert((stored.job_id, stored.asin), stored.outcome);
        }
        store
    }

    pub fn export(&self) -> StoreState {
        let mut jobs: Vec<ScanJob> = self.jobs.iter().map(|e| e.value().clone()).collect();
        jobs.sort_by_key(|job| job.created_at);

        let mut outcomes: Vec<StoredOutcome> = self
            .outcomes
            .iter()
            .map(|e| StoredOutcome {
                job_id: e.key().0,
                asin: e.key().1.clone(),
                outcome: e.value().clone(),
            })
            .collect();
        outcomes.sort_by(|a, b| (a.job_id, &a.asin).cmp(&(b.job_id, &b.asin)));

        StoreState { jobs, outcomes }
    }

    /// Folds a state written by another handle into this store. Jobs and
    /// outcomes accepted by `owns_job` / `owns_outcome` keep the local copy;
    /// everything else takes the incoming copy. Cancel flags are never lost
    /// in either direction.
    pub fn merge_from(
        &self,
        state: StoreState,
        owns_job: impl Fn(&JobId) -> bool,
        owns_outcome: impl Fn(&(JobId, String)) -> bool,
    ) {
        for mut incoming in state.jobs {
            match self.jobs.entry(incoming.id) {
                Entry::Occupied(mut local) => {
                    if owns_job(&incoming.id) {
                        local.get_mut().cancel_requested |= incoming.cancel_requested;
                    } else {
                        incoming.cancel_requested |= local.get().cancel_requested;
                        local.insert(incoming);
                    }
                }
                Entry::Vacant(slot) => {
                    slot.insert(incoming);
                }
            }
        }

        for stored in state.outcomes {
            let key = (stored.job_id, stored.asin);
            if owns_outcome(&key) {
                continue;
            }
            if let TargetOutcome::Succeeded { result } = &stored.outcome {
                self.remember_latest(result);
            }
            self.outcomes.insert(key, stored.outcome);
        }
    }

    fn remember_latest(&self, result: &ScanResult) {
        match self.latest.entry(result.snapshot.asin.clone()) {
            Entry::Occupied(mut existing) => {
                if existing.get().snapshot.captured_at <= result.snapshot.captured_at {
                    existing.insert(result.clone());
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(result.clone());
            }
        }
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn save_job(&self, job: &ScanJob) -> Result<()> {
        let mut job = job.clone();
        if let Some(existing) = self.jobs.get(&job.id) {
            job.cancel_requested |= existing.cancel_requested;
        }
        self.jobs.insert(job.id, job);
        Ok(())
    }

    async fn get_job(&self, job_id: JobId) -> Result<Option<ScanJob>> {
        Ok(self.jobs.get(&job_id).map(|job| job.clone()))
    }

    async fn upsert_snapshot(&self, job_id: JobId, result: &ScanResult) -> Result<bool> {
        let key = (job_id, result.snapshot.asin.clone());
        let first = match self.outcomes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(TargetOutcome::Succeeded { result: result.clone() });
                true
            }
            Entry::Occupied(mut existing) => {
                if matches!(existing.get(), TargetOutcome::Failed { .. }) {
                    return Ok(false);
                }
                debug!("♻️ Replacing snapshot for {} in job {}", result.snapshot.asin, job_id);
                existing.insert(TargetOutcome::Succeeded { result: result.clone() });
                false
            }
        };
        self.remember_latest(result);
        Ok(first)
    }

    async fn insert_failure(&self, record: &FailureRecord) -> Result<bool> {
        let key = (record.job_id, record.asin.clone());
        match self.outcomes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(TargetOutcome::Failed { record: record.clone() });
                Ok(true)
            }
            Entry::Occupied(_) => Ok(false),
        }
    }

    async fn update_job_counters(&self, job_id: JobId, delta: CounterDelta) -> Result<()> {
        match self.jobs.get_mut(&job_id) {
            Some(mut job) => {
                job.counters.apply(delta);
                Ok(())
            }
            None => Err(ScanError::JobNotFound(job_id)),
        }
    }

    async fn request_cancel(&self, job_id: JobId) -> Result<()> {
        match self.jobs.get_mut(&job_id) {
            Some(mut job) => {
                job.cancel_requested = true;
                Ok(())
            }
            None => Err(ScanError::JobNotFound(job_id)),
        }
    }

    async fn is_cancel_requested(&self, job_id: JobId) -> Result<bool> {
        Ok(self.jobs.get(&job_id).map(|job| job.cancel_requested).unwrap_or(false))
    }

    async fn succeeded_asins(&self, job_id: JobId) -> Result<HashSet<String>> {
        Ok(self
            .outcomes
            .iter()
            .filter(|e| e.key().0 == job_id && matches!(e.value(), TargetOutcome::Succeeded { .. }))
            .map(|e| e.key().1.clone())
            .collect())
    }

    async fn failures(&self, job_id: JobId) -> Result<Vec<FailureRecord>> {
        let mut records: Vec<FailureRecord> = self
            .outcomes
            .iter()
            .filter(|e| e.key().0 == job_id)
            .filter_map(|e| match e.value() {
                TargetOutcome::Failed { record } => Some(record.clone()),
                TargetOutcome::Succeeded { .. } => None,
            })
            .collect();
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.asin.cmp(&b.asin)));
        Ok(records)
    }

    async fn latest_result(&self, asin: &str) -> Result<Option<ScanResult>> {
        Ok(self.latest.get(asin).map(|r| r.clone()))
    }
}
