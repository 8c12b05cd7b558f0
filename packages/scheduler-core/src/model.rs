//! Persistent entities and the in-memory value types that flow between the
//! dispatchers and the worker pool.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// A user-managed cron schedule. Immutable once created except through admin
/// mutation (`PUT /crons/{id}`, `POST /crons/{id}/toggle`).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow, TypedBuilder)]
pub struct CronDefinition {
    #[builder(default)]
    pub id: i64,
    pub name: String,
    #[builder(default)]
    pub description: Option<String>,
    pub cron_expression: String,
    pub handler_name: String,
    #[builder(default = serde_json::json!({}))]
    pub handler_params: serde_json::Value,
    #[builder(default = true)]
    pub is_enabled: bool,
    #[builder(default = false)]
    pub allow_overlap: bool,
    #[builder(default = 3)]
    pub max_retry: i32,
    #[builder(default = 3600)]
    pub timeout_seconds: i32,
    #[builder(default = Utc::now())]
    pub created_at: DateTime<Utc>,
    #[builder(default = Utc::now())]
    pub updated_at: DateTime<Utc>,
}

/// The status of one `Execution` row. See the state machine in `worker::executor`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "execution_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Success,
    Failed,
    Timeout,
}

impl ExecutionStatus {
    /// Non-terminal statuses count toward the overlap check (§4.4 step 2d).
    pub fn is_incomplete(self) -> bool {
        matches!(self, ExecutionStatus::Pending | ExecutionStatus::Running)
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Success | ExecutionStatus::Failed | ExecutionStatus::Timeout
        )
    }
}

/// One scheduled invocation of a handler. The unit of work claimed by the
/// worker pool and executed under a timeout.
///
/// `handler_name`/`handler_params` are copied onto the row at emission time
/// (by the cron dispatcher from the owning `CronDefinition`, or by the queue
/// dispatcher from the merged message params) rather than resolved through a
/// join, since `job_id` is nullable for queue-originated executions that have
/// no backing cron definition.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Execution {
    pub id: i64,
    pub job_id: Option<i64>,
    pub handler_name: String,
    pub handler_params: serde_json::Value,
    pub scheduled_time: DateTime<Utc>,
    pub status: ExecutionStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub retry_count: i32,
    pub error_message: Option<String>,
    pub result: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Execution {
    /// Builds the view a worker needs to run this execution, without
    /// requiring a join against `cron_definitions`.
    pub fn to_job_info(&self, max_retry: i32, timeout_seconds: i32) -> JobInfo {
        JobInfo {
            execution_id: self.id,
            handler_name: self.handler_name.clone(),
            handler_params: self.handler_params.clone(),
            max_retry,
            retry_count: self.retry_count,
            timeout_seconds,
        }
    }
}

/// An `Execution` joined to the `CronDefinition` metadata a worker needs to
/// run it: handler name, merged params, retry budget, and timeout.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub execution_id: i64,
    pub handler_name: String,
    pub handler_params: serde_json::Value,
    pub max_retry: i32,
    pub retry_count: i32,
    pub timeout_seconds: i32,
}

/// One message received from the queue adapter (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub handler_name: String,
    #[serde(default = "default_params")]
    pub params: serde_json::Value,
    pub job_id: Option<i64>,

    /// Opaque broker handle, never inspected by the dispatcher, only passed
    /// back to `complete`/`abandon`.
    #[serde(skip)]
    pub broker_handle: Option<String>,
}

fn default_params() -> serde_json::Value {
    serde_json::json!({})
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cron_definition_builder_applies_defaults() {
        let def = CronDefinition::builder()
            .name("nightly-sync".to_string())
            .cron_expression("0 2 * * *".to_string())
            .handler_name("sync".to_string())
            .build();

        assert!(def.is_enabled);
        assert!(!def.allow_overlap);
        assert_eq!(def.max_retry, 3);
        assert_eq!(def.timeout_seconds, 3600);
    }

    #[test]
    fn execution_status_incomplete_matches_pending_and_running_only() {
        assert!(ExecutionStatus::Pending.is_incomplete());
        assert!(ExecutionStatus::Running.is_incomplete());
        assert!(!ExecutionStatus::Success.is_incomplete());
        assert!(!ExecutionStatus::Failed.is_incomplete());
        assert!(!ExecutionStatus::Timeout.is_incomplete());
    }

    #[test]
    fn execution_status_terminal_matches_success_failed_timeout() {
        assert!(ExecutionStatus::Success.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
    }

    #[test]
    fn queue_message_defaults_params_to_empty_object_when_missing() {
        let msg: QueueMessage =
            serde_json::from_str(r#"{"handler_name": "sample"}"#).unwrap();
        assert_eq!(msg.handler_name, "sample");
        assert_eq!(msg.params, serde_json::json!({}));
        assert!(msg.job_id.is_none());
    }
}
