//! Error taxonomy shared by the connection pool, dispatchers, and worker pool.

use thiserror::Error;

/// Errors raised by the connection pool and transaction layer (C1/C2/C3).
#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection pool exhausted after waiting {waited_seconds}s")]
    PoolExhausted { waited_seconds: u64 },

    #[error("write attempted under a readonly transaction: {statement}")]
    ReadonlyViolation { statement: String },

    #[error("no active transaction bound for database '{db_name}'")]
    NoActiveTransaction { db_name: String },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// Errors raised while validating or evaluating a cron expression.
#[derive(Debug, Error)]
pub enum CronError {
    #[error("failed to parse cron expression '{expression}': {reason}")]
    Parse { expression: String, reason: String },

    #[error(
        "cron expression '{expression}' fires every {interval_seconds}s, \
         below the minimum of {minimum_seconds}s"
    )]
    IntervalTooShort {
        expression: String,
        interval_seconds: i64,
        minimum_seconds: u64,
    },
}

/// Errors raised while claiming or running an execution (C5).
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("no handler registered under name '{0}'")]
    HandlerNotFound(String),

    #[error("failed to deserialize handler params: {0}")]
    ParamDeserialize(#[from] serde_json::Error),

    #[error("handler failed: {0}")]
    HandlerFailed(#[source] anyhow::Error),

    #[error("handler timed out after {timeout_seconds}s")]
    Timeout { timeout_seconds: i64 },

    #[error(transparent)]
    Storage(#[from] DbError),
}

/// Errors surfaced by the admin HTTP API, mapped to status codes at the route layer.
#[derive(Debug, Error)]
pub enum AdminError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("a {entity} named '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    #[error(transparent)]
    Storage(#[from] sqlx::Error),

    #[error(transparent)]
    Db(#[from] DbError),
}
