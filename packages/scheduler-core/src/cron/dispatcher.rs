//! The cron dispatcher loop (§4.4): one long-lived task per replica that
//! turns enabled `cron_definitions` rows into PENDING `executions` rows.
//!
//! Replicas never coordinate directly; correctness rests entirely on the
//! `UNIQUE(job_id, scheduled_time)` constraint backing [`insert_pending`].

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::cron::expression::{self, validate_min_interval};
use crate::db::pool::Database;
use crate::db::with_transaction;
use crate::error::DbError;
use crate::model::CronDefinition;
use crate::store::{cron_store, execution_store};

#[derive(Debug, Clone)]
pub struct CronDispatcherConfig {
    pub poll_interval_seconds: u64,
    pub max_sleep_seconds: u64,
    pub min_cron_interval_seconds: u64,
}

impl Default for CronDispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_seconds: 60,
            max_sleep_seconds: 300,
            min_cron_interval_seconds: 60,
        }
    }
}

/// One dispatcher replica. `db` is the database the definitions and
/// executions tables live in; multiple `CronDispatcher`s pointed at the same
/// database are exactly the "multiple replicas" the unique constraint exists
/// to serialize.
pub struct CronDispatcher {
    db: Arc<Database>,
    config: CronDispatcherConfig,
}

impl CronDispatcher {
    pub fn new(db: Arc<Database>, config: CronDispatcherConfig) -> Self {
        Self { db, config }
    }

    /// Runs until `shutdown` is cancelled. Returns `Ok(())` on a clean
    /// shutdown; the only error path is a `DbError` that the pool-exhaustion
    /// backoff couldn't route around.
    pub async fn run(&self, shutdown: CancellationToken) -> Result<(), DbError> {
        info!(
            poll_interval_seconds = self.config.poll_interval_seconds,
            "cron dispatcher starting"
        );

        loop {
            if shutdown.is_cancelled() {
                break;
            }

            let sleep_for = match self.poll_once().await {
                Ok(sleep_for) => sleep_for,
                Err(DbError::PoolExhausted { waited_seconds }) => {
                    warn!(waited_seconds, "pool exhausted during cron poll, backing off");
                    Duration::from_secs(10)
                }
                Err(e) => {
                    error!(error = %e, "cron dispatcher poll failed, continuing at normal interval");
                    Duration::from_secs(self.config.poll_interval_seconds)
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(sleep_for) => {}
            }
        }

        info!("cron dispatcher stopped");
        Ok(())
    }

    /// One loop iteration (§4.4 steps 1-4). Returns how long to sleep before
    /// the next iteration. Exposed (rather than private) so integration
    /// tests can drive a single iteration deterministically instead of
    /// racing `run`'s sleep.
    pub async fn poll_once(&self) -> Result<Duration, DbError> {
        let db_name = self.db.name().to_string();
        let definitions = with_transaction(self.db.clone(), true, || async {
            cron_store::list_enabled(&db_name).await
        })
        .await?;

        let mut next_fire_in = None;

        for def in &definitions {
            match self.process_definition(def).await {
                Ok(remaining) => {
                    next_fire_in = Some(match next_fire_in {
                        Some(current) if current <= remaining => current,
                        _ => remaining,
                    });
                }
                Err(e) => {
                    error!(
                        cron_id = def.id,
                        cron_name = %def.name,
                        error = %e,
                        "failed to process cron definition, skipping"
                    );
                }
            }
        }

        let floor = Duration::from_secs(self.config.poll_interval_seconds);
        let ceiling = Duration::from_secs(self.config.max_sleep_seconds);
        let sleep_for = next_fire_in.unwrap_or(ceiling).clamp(floor, ceiling);
        Ok(sleep_for)
    }

    /// Processes a single definition, returning the time remaining until its
    /// next fire (used to tighten the overall sleep duration).
    async fn process_definition(&self, def: &CronDefinition) -> Result<Duration, DbError> {
        if let Err(e) = validate_min_interval(&def.cron_expression, self.config.min_cron_interval_seconds) {
            warn!(cron_id = def.id, cron_name = %def.name, error = %e, "skipping cron definition");
            return Ok(Duration::from_secs(self.config.max_sleep_seconds));
        }

        let schedule = expression::parse(&def.cron_expression).map_err(|e| {
            // validate_min_interval already parsed this successfully; this
            // branch is unreachable in practice but kept for defense against
            // a schedule that parses differently between calls.
            warn!(cron_id = def.id, error = %e, "cron expression became unparseable");
            e
        });
        let schedule = match schedule {
            Ok(s) => s,
            Err(_) => return Ok(Duration::from_secs(self.config.max_sleep_seconds)),
        };

        let now = Utc::now();
        let Some(prev) = expression::previous_fire_at_or_before(&schedule, now) else {
            return Ok(Duration::from_secs(self.config.max_sleep_seconds));
        };

        let since_prev = (now - prev).num_seconds().max(0) as u64;
        let due = since_prev <= self.config.poll_interval_seconds;

        let next = schedule.after(&now).next();
        let remaining = next
            .map(|n| (n - now).num_seconds().max(0) as u64)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(self.config.max_sleep_seconds));

        if !due {
            return Ok(remaining);
        }

        let db_name = self.db.name().to_string();
        let handler_name = def.handler_name.clone();
        let handler_params = def.handler_params.clone();
        let job_id = def.id;
        let allow_overlap = def.allow_overlap;

        let inserted = with_transaction(self.db.clone(), false, || async {
            if !allow_overlap && execution_store::has_incomplete_for_job(&db_name, job_id).await? {
                return Ok(None);
            }
            execution_store::insert_pending(&db_name, Some(job_id), &handler_name, &handler_params, prev).await
        })
        .await?;

        match inserted {
            Some(id) => info!(
                cron_id = def.id,
                cron_name = %def.name,
                execution_id = id,
                scheduled_time = %prev,
                "emitted execution"
            ),
            None => debug!(
                cron_id = def.id,
                cron_name = %def.name,
                scheduled_time = %prev,
                "execution already emitted for this fire"
            ),
        }

        Ok(remaining)
    }
}
