//! CRUD and state-machine transitions over `executions`, shared by both
//! dispatchers, the worker pool, and the admin inspection routes.

use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::db::context;
use crate::error::DbError;
use crate::model::{Execution, ExecutionStatus};
use crate::pg_args;
use crate::store::RetryOutcome;

fn from_row(row: sqlx::postgres::PgRow) -> Result<Execution, DbError> {
    sqlx::FromRow::from_row(&row).map_err(DbError::Storage)
}

/// The overlap check (§4.4 step 2d): does a non-terminal execution already
/// exist for this job?
pub async fn has_incomplete_for_job(db_name: &str, job_id: i64) -> Result<bool, DbError> {
    let row = context::fetch_optional(
        db_name,
        "SELECT EXISTS(SELECT 1 FROM executions WHERE job_id = $1 \
         AND status IN ('PENDING', 'RUNNING')) AS present",
        pg_args![job_id],
    )
    .await?
    .expect("EXISTS(...) always yields exactly one row");
    Ok(row.try_get("present")?)
}

/// Emits a PENDING execution for `(job_id, scheduled_time)`, silently doing
/// nothing if the pair already exists. Returns the inserted row's id, or
/// `None` when the conflict branch fired — either outcome is acceptable
/// (§4.4's duplicate-suppression note; the redundant existence check the
/// source performs is deliberately not reproduced here, per §9).
pub async fn insert_pending(
    db_name: &str,
    job_id: Option<i64>,
    handler_name: &str,
    handler_params: &serde_json::Value,
    scheduled_time: DateTime<Utc>,
) -> Result<Option<i64>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "INSERT INTO executions \
         (job_id, handler_name, handler_params, scheduled_time, status, retry_count, created_at) \
         VALUES ($1, $2, $3, $4, 'PENDING', 0, now()) \
         ON CONFLICT (job_id, scheduled_time) DO NOTHING \
         RETURNING id",
        pg_args![job_id, handler_name, handler_params, scheduled_time],
    )
    .await?;
    row.map(|r| r.try_get::<i64, _>("id")).transpose().map_err(DbError::from)
}

/// Reads up to `limit` PENDING rows, oldest `scheduled_time` first, for the
/// worker pool's poll step (§4.6 step 2). Claiming happens row-by-row via
/// [`claim`], so a row returned here may already be gone by the time it's
/// claimed; that's expected and handled by `claim`'s zero-rows-affected case.
pub async fn list_pending(db_name: &str, limit: i64) -> Result<Vec<Execution>, DbError> {
    let rows = context::fetch_all(
        db_name,
        "SELECT * FROM executions WHERE status = 'PENDING' \
         ORDER BY scheduled_time ASC LIMIT $1",
        pg_args![limit],
    )
    .await?;
    rows.into_iter().map(from_row).collect()
}

/// The atomic PENDING→RUNNING claim (§4.6 step 1). `true` means this call
/// won the race; `false` means another worker already claimed it.
pub async fn claim(db_name: &str, id: i64) -> Result<bool, DbError> {
    let affected = context::execute(
        db_name,
        "UPDATE executions SET status = 'RUNNING', started_at = now() \
         WHERE id = $1 AND status = 'PENDING'",
        pg_args![id],
    )
    .await?;
    Ok(affected > 0)
}

pub async fn mark_success(db_name: &str, id: i64, result: &str) -> Result<(), DbError> {
    context::execute(
        db_name,
        "UPDATE executions SET status = 'SUCCESS', finished_at = now(), result = $1 \
         WHERE id = $2",
        pg_args![result, id],
    )
    .await?;
    Ok(())
}

/// Transitions a row to a terminal status (FAILED or TIMEOUT), incrementing
/// `retry_count` as part of that same update — every failure counts against
/// the budget, not just the ones that get retried. Then applies the retry
/// policy (§4.7): if the post-increment count is still `< max_retry`, the
/// row is bounced back to PENDING (status only; `retry_count` already
/// carries the increment), leaving `started_at`/`finished_at`/`error_message`
/// in place for diagnostics. Otherwise it stays terminal.
pub async fn fail_and_apply_retry(
    db_name: &str,
    id: i64,
    terminal_status: ExecutionStatus,
    error_message: &str,
    max_retry: i32,
    current_retry_count: i32,
) -> Result<RetryOutcome, DbError> {
    let column = match terminal_status {
        ExecutionStatus::Failed => "FAILED",
        ExecutionStatus::Timeout => "TIMEOUT",
        other => panic!("fail_and_apply_retry called with non-terminal status {other:?}"),
    };

    let next_retry_count = current_retry_count + 1;

    context::execute(
        db_name,
        &format!(
            "UPDATE executions SET status = '{column}', finished_at = now(), \
             error_message = $1, retry_count = $2 WHERE id = $3"
        ),
        pg_args![error_message, next_retry_count, id],
    )
    .await?;

    if next_retry_count < max_retry {
        context::execute(
            db_name,
            "UPDATE executions SET status = 'PENDING' WHERE id = $1",
            pg_args![id],
        )
        .await?;
        Ok(RetryOutcome::Retried {
            retry_count: next_retry_count,
        })
    } else {
        Ok(RetryOutcome::Terminal)
    }
}

pub async fn find_by_id(db_name: &str, id: i64) -> Result<Option<Execution>, DbError> {
    let row = context::fetch_optional(db_name, "SELECT * FROM executions WHERE id = $1", pg_args![id])
        .await?;
    row.map(from_row).transpose()
}

pub struct ExecutionFilter {
    pub cron_id: Option<i64>,
    pub status: Option<ExecutionStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

pub struct ExecutionPage {
    pub items: Vec<Execution>,
    pub total: i64,
}

/// Paged listing for `GET /jobs`, composing whichever filters were supplied.
pub async fn list_paged(
    db_name: &str,
    page: i64,
    size: i64,
    filter: &ExecutionFilter,
) -> Result<ExecutionPage, DbError> {
    let offset = (page.max(1) - 1) * size;

    // `PgArguments` isn't `Clone`, and the count query needs the same filter
    // bindings as the list query without the LIMIT/OFFSET pair, so the
    // clause+args pair is rebuilt once per query from the same filter.
    fn build_filter(filter: &ExecutionFilter) -> (String, sqlx::postgres::PgArguments) {
        let mut clauses = Vec::new();
        let mut args = sqlx::postgres::PgArguments::default();
        let mut next_param = 1;

        if let Some(cron_id) = filter.cron_id {
            clauses.push(format!("job_id = ${next_param}"));
            sqlx::Arguments::add(&mut args, cron_id).expect("encode query parameter");
            next_param += 1;
        }
        if let Some(status) = filter.status {
            clauses.push(format!("status = ${next_param}"));
            sqlx::Arguments::add(&mut args, status).expect("encode query parameter");
            next_param += 1;
        }
        if let Some(from_date) = filter.from_date {
            clauses.push(format!("scheduled_time >= ${next_param}"));
            sqlx::Arguments::add(&mut args, from_date).expect("encode query parameter");
            next_param += 1;
        }
        if let Some(to_date) = filter.to_date {
            clauses.push(format!("scheduled_time <= ${next_param}"));
            sqlx::Arguments::add(&mut args, to_date).expect("encode query parameter");
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", clauses.join(" AND "))
        };
        (where_clause, args)
    }

    let (where_clause, count_args) = build_filter(filter);
    let count_sql = format!("SELECT count(*) AS count FROM executions {where_clause}");
    let total_row = context::fetch_optional(db_name, &count_sql, count_args).await?;
    let total: i64 = total_row
        .map(|r| r.try_get("count"))
        .transpose()?
        .unwrap_or(0);

    let (_, mut args) = build_filter(filter);
    let filter_param_count = [
        filter.cron_id.is_some(),
        filter.status.is_some(),
        filter.from_date.is_some(),
        filter.to_date.is_some(),
    ]
    .iter()
    .filter(|present| **present)
    .count() as i32;
    let next_param = 1 + filter_param_count;
    sqlx::Arguments::add(&mut args, size).expect("encode query parameter");
    let limit_param = next_param;
    sqlx::Arguments::add(&mut args, offset).expect("encode query parameter");
    let offset_param = next_param + 1;

    let list_sql = format!(
        "SELECT * FROM executions {where_clause} ORDER BY scheduled_time DESC \
         LIMIT ${limit_param} OFFSET ${offset_param}"
    );
    let rows = context::fetch_all(db_name, &list_sql, args).await?;
    let items = rows.into_iter().map(from_row).collect::<Result<_, _>>()?;

    Ok(ExecutionPage { items, total })
}

pub async fn delete(db_name: &str, id: i64) -> Result<bool, DbError> {
    let affected = context::execute(db_name, "DELETE FROM executions WHERE id = $1", pg_args![id]).await?;
    Ok(affected > 0)
}

/// The admin-surfaced manual retry action (§6, `POST /jobs/{id}/retry`).
/// Valid only when the row is currently FAILED or TIMEOUT; the admin route
/// is responsible for returning 400 when `find_by_id` shows a different
/// status. `retry_count` is incremented exactly as an automatic retry would
/// be, but unlike the automatic path this does not check `max_retry` — it's
/// an explicit operator override of the retry budget.
pub async fn retry_manual(db_name: &str, id: i64) -> Result<Option<Execution>, DbError> {
    let row = context::fetch_optional(
        db_name,
        "UPDATE executions SET status = 'PENDING', retry_count = retry_count + 1 \
         WHERE id = $1 AND status IN ('FAILED', 'TIMEOUT') \
         RETURNING *",
        pg_args![id],
    )
    .await?;
    row.map(from_row).transpose()
}
