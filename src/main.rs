//! # Brand News Collector
//!
//! Scheduled entry point: polls news feeds for brand keywords, attaches a
//! hosted thumbnail to every new article, and appends the results to a
//! Google Sheets worksheet.
//!
//! ## Usage
//!
//! ```sh
//! GOOGLE_CREDENTIALS="$(cat sa.json)" brand_news_collector --sheets-id 1AbC
//! ```
//!
//! The whole run is retried a few times with a fixed delay when the store
//! cannot be reached; feed and image failures never fail the run.

use brand_news_collector::cli::Cli;
use brand_news_collector::config::PipelineConfig;
use brand_news_collector::error::PipelineError;
use brand_news_collector::google::auth::GoogleAuth;
use brand_news_collector::google::drive::DriveImagePublisher;
use brand_news_collector::google::service_account;
use brand_news_collector::google::sheets::SheetsStore;
use brand_news_collector::http::HttpClient;
use brand_news_collector::notify::Notifier;
use brand_news_collector::pipeline::{Pipeline, RunMode, RunReport};
use brand_news_collector::retry::RetryPolicy;
use clap::Parser;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!(version = env!("CARGO_PKG_VERSION"), "brand_news_collector starting up");

    let args = Cli::parse();
    let mode = RunMode::from_initial_flag(args.initial);
    debug!(?args.config, ?mode, sheets_id = %args.sheets_id, "Parsed CLI arguments");

    let config = PipelineConfig::load(args.config.as_deref()).await?;
    let http = HttpClient::new();
    let notifier = Notifier::new(http.inner().clone(), args.webhook_url.clone());
    if notifier.is_enabled() {
        info!("Run notifications enabled");
    } else {
        debug!("No webhook configured; run notifications disabled");
    }

    let run_policy = RetryPolicy::fixed(
        args.run_attempts,
        Duration::from_secs(args.run_retry_delay_secs),
    );
    let outcome = run_policy
        .run(
            "collection run",
            || run_once(&args, &config, &http, mode),
            PipelineError::is_retryable,
        )
        .await;

    match outcome {
        Ok(report) => {
            info!(summary = %report.summary(), "Run succeeded");
            notifier.run_completed(&report).await;
        }
        Err(e) => {
            error!(error = %e, attempts = run_policy.max_attempts, "Run failed");
            notifier
                .run_failed(&e.to_string(), run_policy.max_attempts.max(1))
                .await;
            return Err(e.into());
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}

/// Connect to the Google services and run the pipeline once.
async fn run_once(
    args: &Cli,
    config: &PipelineConfig,
    http: &HttpClient,
    mode: RunMode,
) -> Result<RunReport, PipelineError> {
    let auth = Arc::new(google_auth(args, http)?);

    let store = SheetsStore::new(
        http.inner().clone(),
        Arc::clone(&auth),
        &args.sheets_id,
        &config.worksheet,
        config.timeouts.store(),
    );
    store.ensure_worksheet().await?;
    let publisher = DriveImagePublisher::new(
        http.inner().clone(),
        auth,
        &config.drive_folder,
        config.timeouts.store(),
    );

    Pipeline::new(config.clone(), http.clone(), store, publisher, mode)
        .run()
        .await
}

fn google_auth(args: &Cli, http: &HttpClient) -> Result<GoogleAuth, PipelineError> {
    if let Some(json) = args.credentials.as_deref().filter(|s| !s.trim().is_empty()) {
        return service_account(json, http.inner().clone());
    }
    if let Some(token) = args.access_token.as_deref().filter(|s| !s.trim().is_empty()) {
        return Ok(GoogleAuth::StaticToken(token.trim().to_string()));
    }
    Err(PipelineError::Config(
        "no Google credentials: set GOOGLE_CREDENTIALS or GOOGLE_ACCESS_TOKEN".to_string(),
    ))
}
