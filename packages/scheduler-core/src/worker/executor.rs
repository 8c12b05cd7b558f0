//! Per-execution claim, run, and state-transition logic (§4.6 "Executor").

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::db::pool::Database;
use crate::db::with_transaction;
use crate::error::ExecutorError;
use crate::handlers::HandlerRegistry;
use crate::model::{Execution, ExecutionStatus};
use crate::store::{execution_store, RetryOutcome};

/// Claims `execution` and, if this task won the race, runs it to a terminal
/// (or retried-to-PENDING) state. `max_retry`/`timeout_seconds` come from the
/// owning cron definition when there is one, or from process-wide defaults
/// for queue-originated executions with no `job_id`.
pub async fn run_claimed(
    db: Arc<Database>,
    registry: Arc<HandlerRegistry>,
    execution: Execution,
    max_retry: i32,
    timeout_seconds: i64,
) {
    let db_name = db.name().to_string();
    let id = execution.id;

    let claimed = match with_transaction(db.clone(), false, || async {
        execution_store::claim(&db_name, id).await
    })
    .await
    {
        Ok(claimed) => claimed,
        Err(e) => {
            error!(execution_id = id, error = %e, "failed to claim execution");
            return;
        }
    };

    if !claimed {
        debug!(execution_id = id, "lost the claim race");
        return;
    }

    info!(execution_id = id, handler_name = %execution.handler_name, "claimed execution");

    let outcome = run_handler(&registry, &execution, timeout_seconds).await;

    let db_name = db.name().to_string();
    let transition_result = with_transaction(db.clone(), false, || async {
        apply_outcome(&db_name, id, execution.retry_count, max_retry, outcome).await
    })
    .await;

    if let Err(e) = transition_result {
        error!(execution_id = id, error = %e, "failed to persist execution outcome");
    }
}

enum Outcome {
    Success(String),
    Failed(String),
    Timeout,
}

async fn run_handler(registry: &HandlerRegistry, execution: &Execution, timeout_seconds: i64) -> Outcome {
    let Some(handler) = registry.get(&execution.handler_name) else {
        warn!(execution_id = execution.id, handler_name = %execution.handler_name, "no handler registered");
        return Outcome::Failed(ExecutorError::HandlerNotFound(execution.handler_name.clone()).to_string());
    };

    let deadline = std::time::Duration::from_secs(timeout_seconds.max(0) as u64);
    let params = execution.handler_params.clone();

    match tokio::time::timeout(deadline, handler.execute(params)).await {
        Ok(Ok(result)) => match serde_json::to_string(&result) {
            Ok(text) => Outcome::Success(text),
            Err(e) => Outcome::Failed(format!("failed to serialize handler result: {e}")),
        },
        Ok(Err(e)) => Outcome::Failed(e.to_string()),
        Err(_) => Outcome::Timeout,
    }
}

async fn apply_outcome(
    db_name: &str,
    id: i64,
    current_retry_count: i32,
    max_retry: i32,
    outcome: Outcome,
) -> Result<(), crate::error::DbError> {
    match outcome {
        Outcome::Success(result) => {
            execution_store::mark_success(db_name, id, &result).await?;
            info!(execution_id = id, "execution succeeded");
        }
        Outcome::Failed(message) => {
            let retry = execution_store::fail_and_apply_retry(
                db_name,
                id,
                ExecutionStatus::Failed,
                &message,
                max_retry,
                current_retry_count,
            )
            .await?;
            log_retry_outcome(id, "failed", retry);
        }
        Outcome::Timeout => {
            let retry = execution_store::fail_and_apply_retry(
                db_name,
                id,
                ExecutionStatus::Timeout,
                "handler timed out",
                max_retry,
                current_retry_count,
            )
            .await?;
            log_retry_outcome(id, "timed out", retry);
        }
    }
    Ok(())
}

fn log_retry_outcome(id: i64, reason: &str, outcome: RetryOutcome) {
    match outcome {
        RetryOutcome::Retried { retry_count } => {
            warn!(execution_id = id, retry_count, "execution {reason}, retrying")
        }
        RetryOutcome::Terminal => warn!(execution_id = id, "execution {reason}, retry budget exhausted"),
    }
}
