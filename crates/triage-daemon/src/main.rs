use axum::{
    routing::{get, post},
    Router,
};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};
use triage_daemon::{api, config::DaemonConfig};
use triage_extract::HttpExtractor;
use triage_pipeline::PipelineRunner;
use triage_storage_sqlite::SqliteStore;

#[derive(Debug, Parser)]
#[command(name = "triage-daemon", version, about = "Clinical transcript triage daemon")]
struct Cli {
    /// Where the HTTP API will listen, e.g. 127.0.0.1:8080
    #[arg(long, default_value = "127.0.0.1:8080")]
    listen: String,

    /// Sqlite database file for reference data and persisted tasks.
    #[arg(long, default_value = ".triage/triage.db")]
    db_path: PathBuf,

    /// Model used by the extraction service.
    #[arg(long, default_value = "claude-sonnet-4-20250514")]
    model: String,

    /// Override the extraction API base URL.
    #[arg(long)]
    api_base: Option<String>,

    /// Extraction request timeout in seconds.
    #[arg(long, default_value_t = 60)]
    timeout_seconds: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = DaemonConfig {
        db_path: cli.db_path,
        model: cli.model,
        api_base: cli.api_base,
        request_timeout: Duration::from_secs(cli.timeout_seconds),
        ..Default::default()
    };
    info!("starting daemon with config: {:?}", config);

    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let mut extractor = HttpExtractor::from_env()?
        .with_model(config.model.clone())
        .with_timeout(config.request_timeout);
    if let Some(api_base) = &config.api_base {
        extractor = extractor.with_api_base(api_base.clone());
    }

    let runner = Arc::new(PipelineRunner::new(extractor, store.clone()));
    let state = api::AppState::new(runner, store, config);

    let app = Router::new()
        .route("/v1/transcripts/process", post(api::process_transcript))
        .route("/v1/stats", get(api::stats))
        .route("/healthz", get(api::healthz))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr: SocketAddr = cli.listen.parse()?;
    info!("listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown requested");
}
