//! Process entry point (§2, §6): a single binary that can run any
//! combination of the dispatcher, queue dispatcher, worker pool and admin
//! API, in-process, sharing one connection pool.
//!
//! With no subcommand it runs all four concurrently and exits only when one
//! of them returns an error or the process receives a shutdown signal.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use scheduler_core::cron::dispatcher::{CronDispatcher, CronDispatcherConfig};
use scheduler_core::db::pool::{Database, PoolConfig};
use scheduler_core::handlers::{self, HandlerRegistry};
use scheduler_core::queue::adapter::ChannelQueueAdapter;
use scheduler_core::queue::dispatcher::QueueDispatcher;
use scheduler_core::worker::{WorkerPool, WorkerPoolConfig};
use scheduler_core::Config;

#[derive(Parser)]
#[command(name = "scheduler")]
#[command(about = "Distributed batch scheduler")]
struct Cli {
    #[command(subcommand)]
    component: Option<Component>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Component {
    /// Cron dispatcher only
    Dispatcher,
    /// Queue dispatcher only
    QueueDispatcher,
    /// Worker pool only
    Worker,
    /// Admin HTTP API only
    Admin,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,scheduler_core=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true).with_line_number(true))
        .init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let pool_config = PoolConfig {
        pool_size: config.pool_size,
        pool_timeout_seconds: config.pool_timeout_seconds,
        max_idle_time_seconds: config.max_idle_time_seconds,
    };
    let db = Arc::new(
        Database::connect("primary", &config.database_url, &pool_config)
            .await
            .context("failed to connect to database")?,
    );

    sqlx::migrate!("./migrations")
        .run(db.pool())
        .await
        .context("failed to run database migrations")?;

    let mut registry = HandlerRegistry::new();
    handlers::register_default_handlers(&mut registry);
    let registry = Arc::new(registry);

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown signal received");
            shutdown_signal.cancel();
        }
    });

    match cli.component {
        Some(Component::Dispatcher) => run_dispatcher(db, config, shutdown).await,
        Some(Component::QueueDispatcher) => run_queue_dispatcher(db, shutdown).await,
        Some(Component::Worker) => run_worker(db, registry, config, shutdown).await,
        Some(Component::Admin) => run_admin(db, registry, config, shutdown).await,
        None => run_all(db, registry, config, shutdown).await,
    }
}

async fn run_dispatcher(db: Arc<Database>, config: Config, shutdown: CancellationToken) -> Result<()> {
    let dispatcher = CronDispatcher::new(
        db,
        CronDispatcherConfig {
            poll_interval_seconds: config.poll_interval_seconds,
            max_sleep_seconds: config.max_sleep_seconds,
            min_cron_interval_seconds: config.min_cron_interval_seconds,
        },
    );
    dispatcher.run(shutdown).await.context("cron dispatcher failed")
}

/// No real broker is wired up yet (§9); this spins up the in-process channel
/// adapter with no producer, so it idles until shutdown. A deployment with a
/// real broker swaps this constructor for one backed by that broker's
/// `QueueAdapter` impl.
async fn run_queue_dispatcher(db: Arc<Database>, shutdown: CancellationToken) -> Result<()> {
    let (adapter, _sender) = ChannelQueueAdapter::new(1024);
    let dispatcher = QueueDispatcher::new(db, Arc::new(adapter));
    dispatcher.run(shutdown).await
}

async fn run_worker(
    db: Arc<Database>,
    registry: Arc<HandlerRegistry>,
    config: Config,
    shutdown: CancellationToken,
) -> Result<()> {
    let pool = WorkerPool::new(
        db,
        registry,
        WorkerPoolConfig {
            pool_size: config.worker_pool_size,
            poll_interval_seconds: config.worker_poll_interval_seconds,
            claim_batch_size: config.claim_batch_size,
            shutdown_timeout_seconds: config.shutdown_timeout_seconds,
        },
    );
    pool.run(shutdown).await.context("worker pool failed")
}

async fn run_admin(
    db: Arc<Database>,
    registry: Arc<HandlerRegistry>,
    config: Config,
    shutdown: CancellationToken,
) -> Result<()> {
    let app = scheduler_core::admin::build_router(db, registry);
    let addr = format!("0.0.0.0:{}", config.admin_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind admin API on {addr}"))?;

    tracing::info!(%addr, "admin API listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("admin API server failed")
}

/// Runs every component concurrently in one process. Returns as soon as any
/// one of them exits, cancelling the shared token so the rest wind down too.
async fn run_all(
    db: Arc<Database>,
    registry: Arc<HandlerRegistry>,
    config: Config,
    shutdown: CancellationToken,
) -> Result<()> {
    tracing::info!("starting dispatcher, queue dispatcher, worker pool and admin API");

    let result = tokio::select! {
        r = run_dispatcher(db.clone(), config.clone(), shutdown.clone()) => r,
        r = run_queue_dispatcher(db.clone(), shutdown.clone()) => r,
        r = run_worker(db.clone(), registry.clone(), config.clone(), shutdown.clone()) => r,
        r = run_admin(db, registry, config, shutdown.clone()) => r,
    };

    shutdown.cancel();
    result
}
