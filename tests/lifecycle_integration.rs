use pretty_assertions::assert_eq;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use buybox_scanner::pricing::{CostBreakdown, RawOffer, RawOfferList};
use buybox_scanner::scan::{
    DispatcherConfig, DispatcherDeps, FailureReason, JobId, JobManager, JobStatus, PricingError, ResultStore,
    ScanSettings, ScanTarget,
};
use buybox_scanner::storage::{JsonFileStore, MemoryResultStore};
use buybox_scanner::testing::{ManualClock, ScriptedPricingSource, StaticCatalog, StaticCostModel};
use buybox_scanner::ScanError;

const ME: &str = "A1ME";

fn offer(seller: &str, price: f64, winner: bool) -> RawOffer {
    RawOffer {
        seller_id: seller.to_string(),
        listing_price: price,
        shipping: 0.0,
        is_buy_box_winner: winner,
    }
}

fn winning_offers() -> Vec<RawOffer> {
    vec![offer(ME, 20.0, true), offer("A2OTHER", 22.0, false)]
}

fn cost(total: f64) -> CostBreakdown {
    CostBreakdown {
        material_cost: total,
        ..CostBreakdown::default()
    }
}

fn unavailable() -> Result<RawOfferList, PricingError> {
    Err(PricingError::Http {
        status: 503,
        body: "Service Unavailable".to_string(),
    })
}

fn not_found() -> Result<RawOfferList, PricingError> {
    Err(PricingError::Http {
        status: 404,
        body: "Not Found".to_string(),
    })
}

fn catalog(n: usize) -> Vec<ScanTarget> {
    (1..=n).map(|i| ScanTarget::new(format!("S{}", i), format!("B{}", i))).collect()
}

fn costs_for(targets: &[ScanTarget]) -> StaticCostModel {
    targets
        .iter()
        .fold(StaticCostModel::new(), |model, t| model.with_cost(&t.sku, cost(10.0)))
}

fn settings(max_retries: u32) -> ScanSettings {
    ScanSettings {
        requests_per_second: 2.0,
        jitter_fraction: 0.2,
        max_retries,
    }
}

fn manager(
    catalog: StaticCatalog,
    pricing: Arc<ScriptedPricingSource>,
    costs: StaticCostModel,
    store: Arc<dyn ResultStore>,
) -> JobManager {
    let deps = DispatcherDeps {
        pricing,
        cost_model: Arc::new(costs),
        store,
        clock: Arc::new(ManualClock::new()),
    };
    let config = DispatcherConfig {
        worker_count: 4,
        marketplace_id: "A1F83G8C2ARO7P".to_string(),
        seller_id: ME.to_string(),
        base_retry_delay: Duration::from_secs(1),
        max_retry_delay: Duration::from_secs(60),
        ..DispatcherConfig::default()
    };
    JobManager::new(Arc::new(catalog), deps, config, Duration::from_secs(5))
}

#[tokio::test]
async fn test_full_run_completes_with_consistent_counters() {
    let targets = catalog(10);
    let pricing = targets
        .iter()
        .fold(ScriptedPricingSource::new(), |p, t| p.with_offers(&t.asin, winning_offers()));
    let pricing = Arc::new(pricing);
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job_from_catalog(settings(3)).await.unwrap();
    assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Completed);

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.counters.total, 10);
    assert_eq!(job.counters.processed, 10);
    assert_eq!(job.counters.processed, job.counters.successful + job.counters.failed);
    assert!(job.started_at.is_some() && job.completed_at.is_some());
    assert_eq!(pricing.total_calls(), 10);

    let latest = store.latest_result("B7").await.unwrap().unwrap();
    assert_eq!(latest.snapshot.your_position, Some(1));
}

#[tokio::test]
async fn test_transient_errors_then_success_completes() {
    let targets = catalog(1);
    let pricing = Arc::new(
        ScriptedPricingSource::new()
            .with_script("B1", vec![unavailable(), unavailable(), unavailable()])
            .with_offers("B1", winning_offers()),
    );
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Completed);
    assert_eq!(pricing.calls("B1"), 4);
    assert!(store.failures(job_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_write_one_failure_record() {
    let targets = catalog(2);
    let pricing = Arc::new(
        ScriptedPricingSource::new()
            .with_script("B1", vec![unavailable(), unavailable(), unavailable()])
            .with_offers("B2", winning_offers()),
    );
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(2)).await.unwrap();
    assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Partial);
    assert_eq!(pricing.calls("B1"), 3);

    let failures = store.failures(job_id).await.unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].asin, "B1");
    assert_eq!(failures[0].reason, FailureReason::RetriesExhausted);
    assert_eq!(failures[0].retry_count, 2);

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!((job.counters.successful, job.counters.failed), (1, 1));

    let report = manager.job_report(job_id).await.unwrap();
    assert_eq!(report.job.status, JobStatus::Partial);
    assert_eq!(report.failures, failures);
    assert!(matches!(
        manager.job_report(JobId::new()).await,
        Err(ScanError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_copy_only_restart_resumes_unfinished_targets() {
    let targets = catalog(4);
    let pricing = Arc::new(
        ScriptedPricingSource::new()
            .with_offers("B1", winning_offers())
            .with_script("B2", vec![not_found()])
            .with_script("B3", vec![unavailable(), unavailable()])
            .with_offers("B3", winning_offers()),
    );
    // B4 has no cost breakdown
    let costs = costs_for(&targets[..3]);
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(StaticCatalog::new(targets.clone()), pricing.clone(), costs, store.clone());

    let first = manager.create_job_from_catalog(settings(1)).await.unwrap();
    assert_eq!(manager.start_job(first).await.unwrap(), JobStatus::Partial);

    let mut reasons: Vec<_> = store
        .failures(first)
        .await
        .unwrap()
        .into_iter()
        .map(|f| (f.asin, f.reason))
        .collect();
    reasons.sort_by(|a, b| a.0.cmp(&b.0));
    assert_eq!(
        reasons,
        vec![
            ("B2".to_string(), FailureReason::PermanentError),
            ("B3".to_string(), FailureReason::RetriesExhausted),
            ("B4".to_string(), FailureReason::NoCostData),
        ]
    );

    let second = manager.restart_job(first, settings(1), true).await.unwrap();
    let job = store.get_job(second).await.unwrap().unwrap();
    assert_eq!(job.targets, vec![ScanTarget::new("S3", "B3")]);
    assert_eq!(job.parent_job_id, Some(first));
    assert_eq!(job.status, JobStatus::Pending);

    assert_eq!(manager.start_job(second).await.unwrap(), JobStatus::Completed);

    let err = manager.restart_job(second, settings(1), true).await.unwrap_err();
    assert!(matches!(err, ScanError::NoWork(_)));
    assert_eq!(err.kind().as_str(), "NoWorkError");

    let full = manager.restart_job(second, settings(1), false).await.unwrap();
    assert_eq!(store.get_job(full).await.unwrap().unwrap().counters.total, 4);
}

#[tokio::test]
async fn test_create_validates_and_deduplicates() {
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(vec![]),
        Arc::new(ScriptedPricingSource::new()),
        StaticCostModel::new(),
        store.clone(),
    );

    let empty = manager.create_job(vec![], settings(3)).await.unwrap_err();
    assert_eq!(empty.kind().as_str(), "ConfigurationError");

    let mut zero_rate = settings(3);
    zero_rate.requests_per_second = 0.0;
    assert!(matches!(
        manager.create_job(catalog(1), zero_rate).await,
        Err(ScanError::ConfigurationError(_))
    ));

    let duplicated = vec![
        ScanTarget::new("S1", "B1"),
        ScanTarget::new("S2", "B2"),
        ScanTarget::new("S1-DUP", "B1"),
    ];
    let job_id = manager.create_job(duplicated, settings(3)).await.unwrap();
    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.counters.total, 2);
    assert_eq!(job.targets[0].sku, "S1");
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(job.counters.processed, 0);
}

#[tokio::test]
async fn test_catalog_unavailable_is_reported() {
    let manager = manager(
        StaticCatalog::unavailable(),
        Arc::new(ScriptedPricingSource::new()),
        StaticCostModel::new(),
        Arc::new(MemoryResultStore::new()),
    );
    let err = manager.create_job_from_catalog(settings(3)).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "CatalogUnavailable");
}

#[tokio::test]
async fn test_warm_up_auth_failure_fails_job() {
    let targets = catalog(3);
    let pricing = Arc::new(
        ScriptedPricingSource::new().failing_warm_up(ScanError::AuthFailure("token endpoint rejected".to_string())),
    );
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    let err = manager.start_job(job_id).await.unwrap_err();
    assert!(matches!(err, ScanError::AuthFailure(_)));

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.counters.processed, 0);
    assert_eq!(pricing.total_calls(), 0);
}

#[tokio::test]
async fn test_per_target_auth_failure_does_not_abort_job() {
    let targets = catalog(2);
    let pricing = Arc::new(
        ScriptedPricingSource::new()
            .with_script(
                "B1",
                vec![Err(PricingError::Http {
                    status: 403,
                    body: "Forbidden".to_string(),
                })],
            )
            .with_offers("B2", winning_offers()),
    );
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Partial);
    assert_eq!(pricing.calls("B1"), 1);
    let failures = store.failures(job_id).await.unwrap();
    assert_eq!(failures[0].reason, FailureReason::AuthFailure);
}

#[tokio::test]
async fn test_cancel_transitions() {
    let targets = catalog(2);
    let store = Arc::new(MemoryResultStore::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        Arc::new(ScriptedPricingSource::new()),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    assert_eq!(manager.cancel_job(job_id).await.unwrap(), JobStatus::Cancelled);
    assert_eq!(manager.cancel_job(job_id).await.unwrap(), JobStatus::Cancelled);

    let err = manager.start_job(job_id).await.unwrap_err();
    assert_eq!(err.kind().as_str(), "InvalidState");

    assert!(matches!(
        manager.cancel_job(JobId::new()).await,
        Err(ScanError::JobNotFound(_))
    ));
}

#[tokio::test]
async fn test_start_on_running_job_is_noop() {
    let targets = catalog(1);
    let store = Arc::new(MemoryResultStore::new());
    let pricing = Arc::new(ScriptedPricingSource::new());
    let manager = manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    );

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    let mut job = store.get_job(job_id).await.unwrap().unwrap();
    job.status = JobStatus::Running;
    store.save_job(&job).await.unwrap();

    assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Running);
    assert_eq!(pricing.total_calls(), 0);
}

#[tokio::test]
async fn test_cancel_running_job_stops_new_dispatch() {
    let targets = catalog(20);
    let gate = Arc::new(Semaphore::new(0));
    let pricing = targets.iter().fold(
        ScriptedPricingSource::new().with_gate(gate.clone()),
        |p, t| p.with_offers(&t.asin, winning_offers()),
    );
    let pricing = Arc::new(pricing);
    let store = Arc::new(MemoryResultStore::new());
    let manager = Arc::new(manager(
        StaticCatalog::new(targets.clone()),
        pricing.clone(),
        costs_for(&targets),
        store.clone(),
    ));

    let job_id = manager.create_job(targets, settings(3)).await.unwrap();
    let runner = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.start_job(job_id).await })
    };

    while pricing.total_calls() == 0 {
        tokio::task::yield_now().await;
    }

    assert_eq!(manager.cancel_job(job_id).await.unwrap(), JobStatus::Running);
    gate.add_permits(100);

    let status = runner.await.unwrap().unwrap();
    assert_eq!(status, JobStatus::Cancelled);

    let job = store.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Cancelled);
    assert!(job.cancel_requested);
    assert!(job.counters.processed < 20);
    assert_eq!(job.counters.processed, job.counters.successful + job.counters.failed);
    assert!(pricing.total_calls() <= 4);
}

#[tokio::test]
async fn test_file_store_keeps_finished_job() {
    let path = std::env::temp_dir().join(format!("buybox-scanner-it-{}.json", JobId::new()));
    let targets = catalog(3);
    let pricing = targets
        .iter()
        .fold(ScriptedPricingSource::new(), |p, t| p.with_offers(&t.asin, winning_offers()));

    let job_id = {
        let store = Arc::new(JsonFileStore::open(&path).await.unwrap());
        let manager = manager(
            StaticCatalog::new(targets.clone()),
            Arc::new(pricing),
            costs_for(&targets),
            store,
        );
        let job_id = manager.create_job_from_catalog(settings(3)).await.unwrap();
        assert_eq!(manager.start_job(job_id).await.unwrap(), JobStatus::Completed);
        job_id
    };

    let reopened = JsonFileStore::open(&path).await.unwrap();
    let job = reopened.get_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.counters.successful, 3);
    assert_eq!(reopened.succeeded_asins(job_id).await.unwrap().len(), 3);

    let _ = tokio::fs::remove_file(&path).await;
}
