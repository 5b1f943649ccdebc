// src/scan/mod.rs
//! Scan-job engine: job records, the worker-pool dispatcher, lifecycle
//! management and the failure ledger.

pub mod dispatcher;
pub mod failure;
pub mod job;
pub mod lifecycle;
pub mod sources;

pub use dispatcher::{DispatcherConfig, DispatcherDeps, RunSummary, ScanDispatcher};
pub use failure::{FailureReason, FailureRecord};
pub use job::{CounterSnapshot, JobHandle, JobId, JobStatus, ScanJob, ScanSettings, ScanTarget};
pub use lifecycle::{resume_targets, JobManager, JobReport};
pub use sources::{
    AccessToken, AuthProvider, CatalogSource, CostLookupError, CostModelSource, PricingError, PricingSource,
    ResultStore,
};
