//! Test harness with testcontainers for integration testing.
//!
//! A single Postgres container and migration run is shared across every
//! test in the binary; each test gets its own `Database` handle against it.

use std::sync::Arc;

use anyhow::{Context, Result};
use scheduler_core::db::pool::{Database, PoolConfig};
use sqlx::PgPool;
use test_context::AsyncTestContext;
use testcontainers::core::WaitFor;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage};
use tokio::sync::OnceCell;

struct SharedTestInfra {
    db_url: String,
    _postgres: ContainerAsync<GenericImage>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16-alpine")
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(testcontainers::core::ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{host}:{port}/postgres");

        let pool = PgPool::connect(&db_url)
            .await
            .context("failed to connect to Postgres for migrations")?;
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("failed to run migrations")?;
        pool.close().await;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async { Self::init().await.expect("failed to initialize shared test infra") })
            .await
    }
}

/// One test's view of the shared database: a fresh `Database` handle and a
/// bare `PgPool` for fixture setup and direct assertions.
pub struct TestHarness {
    pub db: Arc<Database>,
    pub pool: PgPool,
}

impl TestHarness {
    pub async fn new() -> Self {
        Self::with_name("primary").await
    }

    /// Builds a harness whose `Database` is bound under `name` instead of
    /// `"primary"`, for tests that open a second database handle against the
    /// same Postgres instance to exercise [`scheduler_core::db::TransactionRunner`]'s
    /// multi-database path.
    pub async fn with_name(name: &str) -> Self {
        let infra = SharedTestInfra::get().await;

        let db = Arc::new(
            Database::connect(name, &infra.db_url, &PoolConfig::default())
                .await
                .expect("failed to connect test Database handle"),
        );
        let pool = PgPool::connect(&infra.db_url)
            .await
            .expect("failed to connect fixture pool");

        Self { db, pool }
    }

    /// A name suffix unique to this call, so concurrently-run tests never
    /// collide on `cron_definitions.name`'s unique constraint.
    pub fn unique_suffix() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await
    }

    async fn teardown(self) {
        self.pool.close().await;
    }
}
