//! The worker pool's polling loop (§4.6).

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::pool::Database;
use crate::db::with_transaction;
use crate::error::DbError;
use crate::handlers::HandlerRegistry;
use crate::store::{cron_store, execution_store};
use crate::worker::executor;

/// Retry budget and timeout applied to queue-originated executions that
/// carry no `job_id`, hence no owning [`crate::model::CronDefinition`] to
/// read those values from. Matches `CronDefinition`'s own defaults.
const DEFAULT_MAX_RETRY: i32 = 3;
const DEFAULT_TIMEOUT_SECONDS: i64 = 3600;

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub pool_size: usize,
    pub poll_interval_seconds: u64,
    pub claim_batch_size: i64,
    pub shutdown_timeout_seconds: u64,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            poll_interval_seconds: 5,
            claim_batch_size: 10,
            shutdown_timeout_seconds: 30,
        }
    }
}

pub struct WorkerPool {
    db: Arc<Database>,
    registry: Arc<HandlerRegistry>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(db: Arc<Database>, registry: Arc<HandlerRegistry>, config: WorkerPoolConfig) -> Self {
        Self { db, registry, config }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DbError> {
        info!(pool_size = self.config.pool_size, "worker pool starting");

        let semaphore = Arc::new(Semaphore::new(self.config.pool_size));
        let mut in_flight = Vec::new();

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            in_flight.retain(|h: &tokio::task::JoinHandle<()>| !h.is_finished());
            let available = self.config.pool_size.saturating_sub(in_flight.len());

            if available > 0 {
                let batch_size = available.min(self.config.claim_batch_size as usize) as i64;
                match self.claim_batch(batch_size, &semaphore).await {
                    Ok(mut handles) => in_flight.append(&mut handles),
                    Err(e) => error!(error = %e, "failed to poll for pending executions"),
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(Duration::from_secs(self.config.poll_interval_seconds)) => {}
            }
        }

        self.drain(in_flight).await;
        info!("worker pool stopped");
        Ok(())
    }

    async fn claim_batch(
        &self,
        limit: i64,
        semaphore: &Arc<Semaphore>,
    ) -> Result<Vec<tokio::task::JoinHandle<()>>, DbError> {
        let db_name = self.db.name().to_string();
        let pending = with_transaction(self.db.clone(), true, || async {
            execution_store::list_pending(&db_name, limit).await
        })
        .await?;

        if pending.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = pending.len(), "claimed batch of pending executions");

        let mut handles = Vec::with_capacity(pending.len());
        for execution in pending {
            let (max_retry, timeout_seconds) = self.resolve_policy(execution.job_id).await?;
            let db = self.db.clone();
            let registry = self.registry.clone();
            let permit = semaphore.clone().acquire_owned().await.expect("semaphore never closed");

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                executor::run_claimed(db, registry, execution, max_retry, timeout_seconds).await;
            }));
        }
        Ok(handles)
    }

    /// Queue-originated executions (`job_id = None`) run under the
    /// process-wide defaults; cron-originated ones use their definition's
    /// configured retry budget and timeout.
    async fn resolve_policy(&self, job_id: Option<i64>) -> Result<(i32, i64), DbError> {
        let Some(job_id) = job_id else {
            return Ok((DEFAULT_MAX_RETRY, DEFAULT_TIMEOUT_SECONDS));
        };

        let db_name = self.db.name().to_string();
        let def = with_transaction(self.db.clone(), true, || async {
            cron_store::find_by_id(&db_name, job_id).await
        })
        .await?;

        Ok(def
            .map(|d| (d.max_retry, d.timeout_seconds as i64))
            .unwrap_or((DEFAULT_MAX_RETRY, DEFAULT_TIMEOUT_SECONDS)))
    }

    async fn drain(&self, in_flight: Vec<tokio::task::JoinHandle<()>>) {
        if in_flight.is_empty() {
            return;
        }
        info!(count = in_flight.len(), "waiting for in-flight executions to finish");

        let timeout = Duration::from_secs(self.config.shutdown_timeout_seconds);
        match tokio::time::timeout(timeout, futures::future::join_all(in_flight)).await {
            Ok(_) => debug!("all in-flight executions finished before shutdown"),
            Err(_) => warn!("shutdown timeout elapsed with executions still in flight"),
        }
    }
}
