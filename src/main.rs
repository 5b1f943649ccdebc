// src/main.rs
use buybox_scanner::{
    api::{SpApiPricingClient, StaticTokenProvider, TokenCache},
    config::{self, Config},
    error::{Result, ScanError},
    scan::{DispatcherDeps, JobId, JobManager, JobStatus, ScanSettings},
    storage::{JsonCatalogSource, JsonCostModelSource, JsonFileStore},
    utils::{log_level_from_env, setup_logging, TokioClock},
};
use clap::{Args, Parser, Subcommand};
use log::info;
use std::sync::Arc;

/// Competitive-pricing scan jobs against the SP-API offers endpoint
#[derive(Parser, Debug)]
#[command(name = "buybox-scanner", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a job over every enabled catalog target and print its id
    Create {
        #[command(flatten)]
        scan: ScanArgs,
        /// Start the job right away
        #[arg(long)]
        start: bool,
    },
    /// Run a PENDING job to completion
    Start { job_id: JobId },
    /// Request cooperative cancellation of a job
    Cancel { job_id: JobId },
    /// Create a follow-up job for an earlier one and print its id
    Restart {
        job_id: JobId,
        /// Only targets the earlier job (and its ancestors) did not finish
        #[arg(long)]
        copy_only: bool,
        #[command(flatten)]
        scan: ScanArgs,
        /// Start the new job right away
        #[arg(long)]
        start: bool,
    },
    /// Print a job and its failure ledger as JSON
    Status { job_id: JobId },
}

/// Per-job overrides of the configured scan settings
#[derive(Args, Debug)]
struct ScanArgs {
    /// Pricing calls per second (fractions allowed)
    #[arg(long)]
    rps: Option<f64>,
    /// Extra random delay as a fraction of the dispatch interval
    #[arg(long)]
    jitter: Option<f64>,
    /// Retries for transient pricing failures
    #[arg(long)]
    max_retries: Option<u32>,
}

impl ScanArgs {
    fn apply(&self, mut settings: ScanSettings) -> ScanSettings {
        if let Some(rps) = self.rps {
            settings.requests_per_second = rps;
        }
        if let Some(jitter) = self.jitter {
            settings.jitter_fraction = jitter;
        }
        if let Some(max_retries) = self.max_retries {
            settings.max_retries = max_retries;
        }
        settings
    }
}

async fn build_manager(config: &Config) -> Result<JobManager> {
    let store = Arc::new(JsonFileStore::open(&config.store_path).await?);

    let token_provider = Arc::new(StaticTokenProvider::new(
        config.access_token.clone().unwrap_or_default(),
        config.token_ttl_secs,
    ));
    let tokens = TokenCache::new(token_provider, config.token_refresh_skew_secs);
    let pricing = Arc::new(SpApiPricingClient::new(
        &config.sp_api_endpoint,
        config.request_timeout(),
        tokens,
    )?);

    let deps = DispatcherDeps {
        pricing,
        cost_model: Arc::new(JsonCostModelSource::new(&config.cost_model_path)),
        store,
        clock: Arc::new(TokioClock::new()),
    };

    Ok(JobManager::new(
        Arc::new(JsonCatalogSource::new(&config.catalog_path)),
        deps,
        config.dispatcher_config(),
        config.cancel_poll_interval(),
    ))
}

async fn run_job(manager: &JobManager, config: &Config, job_id: JobId) -> Result<JobStatus> {
    config.validate_sp_api()?;
    let status = manager.start_job(job_id).await?;
    println!("{} {}", job_id, status);
    Ok(status)
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::load_config()?;
    let manager = build_manager(&config).await?;

    match cli.command {
        Commands::Create { scan, start } => {
            let settings = scan.apply(config.scan_settings());
            let job_id = manager.create_job_from_catalog(settings).await?;
            println!("{}", job_id);
            if start {
                run_job(&manager, &config, job_id).await?;
            }
        }
        Commands::Start { job_id } => {
            run_job(&manager, &config, job_id).await?;
        }
        Commands::Cancel { job_id } => {
            let status = manager.cancel_job(job_id).await?;
            println!("{} {}", job_id, status);
        }
        Commands::Restart {
            job_id,
            copy_only,
            scan,
            start,
        } => {
            let settings = scan.apply(config.scan_settings());
            let new_job_id = manager.restart_job(job_id, settings, copy_only).await?;
            println!("{}", new_job_id);
            if start {
                run_job(&manager, &config, new_job_id).await?;
            }
        }
        Commands::Status { job_id } => {
            let report = manager.job_report(job_id).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    dotenv::dotenv().ok();
    if let Err(e) = setup_logging(log_level_from_env()) {
        eprintln!("failed to initialize logging: {}", e);
    }
    info!("🚀 buybox-scanner {}", env!("CARGO_PKG_VERSION"));

    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => report_error(&e),
    };
    std::process::exit(code);
}

fn report_error(e: &ScanError) -> i32 {
    let kind = e.kind();
    eprintln!("error_kind={} message={}", kind, e);
    kind.exit_code()
}
