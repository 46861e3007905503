//! culvertd — the Culvert control-plane daemon.
//!
//! Single binary running every subsystem in one process: the redb
//! state store, the compilation queue + worker, the orchestrator, the
//! memory-banded queue service, the sink manager with its stale
//! detector, and the axum API server.
//!
//! # Usage
//!
//! ```text
//! CULVERT_JWT_SECRET=... culvertd --port 8080 --data-dir /var/lib/culvert
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;
use tracing::info;

use culvert_compiler::{BuildQueue, CompilerWorker};
use culvert_gateway::{ApiState, AuthService, LambdaService};
use culvert_orchestrator::Orchestrator;
use culvert_scheduler::QueueService;
use culvert_sinks::{HttpSinkClient, SinkManager};
use culvert_state::StateStore;

#[derive(Parser)]
#[command(name = "culvertd", about = "Culvert control-plane daemon")]
struct Cli {
    /// Port to listen on.
    #[arg(long, default_value = "8080")]
    port: u16,

    /// Data directory for persistent state.
    #[arg(long, default_value = "/var/lib/culvert")]
    data_dir: PathBuf,

    /// Heartbeat age in seconds after which a sink is taken offline.
    #[arg(long, default_value = "30")]
    stale_threshold_secs: u64,

    /// Timeout for task deliveries to sinks, in seconds.
    #[arg(long, default_value = "5")]
    delivery_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,culvertd=debug,culvert=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let jwt_secret = std::env::var("CULVERT_JWT_SECRET")
        .context("CULVERT_JWT_SECRET must be set")?
        .into_bytes();

    run(cli, jwt_secret).await
}

async fn run(cli: Cli, jwt_secret: Vec<u8>) -> anyhow::Result<()> {
    info!("culvert daemon starting");

    std::fs::create_dir_all(&cli.data_dir)?;
    let db_path = cli.data_dir.join("culvert.redb");

    // ── Initialize subsystems ──────────────────────────────────

    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");

    let scheduler = Arc::new(QueueService::new());
    let build_queue = Arc::new(BuildQueue::new());

    let lambdas = Arc::new(LambdaService::new(store.clone(), build_queue.clone()));
    let orchestrator = Arc::new(Orchestrator::new(store.clone(), scheduler.clone()));
    let sink_client = Arc::new(HttpSinkClient::new(Duration::from_secs(
        cli.delivery_timeout_secs,
    )));
    let sinks = Arc::new(SinkManager::new(
        store.clone(),
        sink_client,
        scheduler.clone(),
        &jwt_secret,
    ));

    // ── Two-phase wiring of the circular references ────────────

    lambdas.set_orchestrator(orchestrator.clone());
    orchestrator.set_gateway(lambdas.clone());
    scheduler.set_dispatcher(sinks.clone());

    let callback_lambdas = lambdas.clone();
    sinks.set_result_callback(Arc::new(move |execution_id, output, error| {
        let lambdas = callback_lambdas.clone();
        Box::pin(async move {
            lambdas.handle_result(&execution_id, output, error);
        })
    }));
    info!("subsystems wired");

    // ── Start background tasks ─────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = CompilerWorker::new(build_queue, store.clone(), orchestrator.clone())
        .with_run_trigger(lambdas.clone());
    let worker_handle = tokio::spawn(worker.run(shutdown_rx));

    sinks
        .clone()
        .start_stale_detector(Duration::from_secs(cli.stale_threshold_secs));

    // ── Start API server ───────────────────────────────────────

    let state = ApiState {
        auth: Arc::new(AuthService::new(store, &jwt_secret)),
        lambdas,
        sinks: sinks.clone(),
    };
    let router = culvert_gateway::build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));

    info!(%addr, "API server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    sinks.stop_stale_detector().await;
    let _ = worker_handle.await;

    info!("culvert daemon stopped");
    Ok(())
}
