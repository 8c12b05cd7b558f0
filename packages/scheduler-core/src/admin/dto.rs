//! Request/response bodies for the admin HTTP API (§6).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{CronDefinition, ExecutionStatus};

#[derive(Serialize)]
pub struct PagedResponse<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total: i64,
}

#[derive(Deserialize)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_size")]
    pub size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_size() -> i64 {
    20
}

#[derive(Deserialize)]
pub struct ListCronsQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub is_enabled: Option<bool>,
}

#[derive(Deserialize)]
pub struct ListJobsQuery {
    #[serde(flatten)]
    pub page: PageQuery,
    pub cron_id: Option<i64>,
    pub status: Option<ExecutionStatus>,
    pub from_date: Option<DateTime<Utc>>,
    pub to_date: Option<DateTime<Utc>>,
}

#[derive(Deserialize)]
pub struct CronRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub cron_expression: String,
    pub handler_name: String,
    #[serde(default = "default_handler_params")]
    pub handler_params: serde_json::Value,
    #[serde(default = "default_true")]
    pub is_enabled: bool,
    #[serde(default)]
    pub allow_overlap: bool,
    #[serde(default = "default_max_retry")]
    pub max_retry: i32,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: i32,
}

fn default_handler_params() -> serde_json::Value {
    serde_json::json!({})
}

fn default_true() -> bool {
    true
}

fn default_max_retry() -> i32 {
    3
}

fn default_timeout_seconds() -> i32 {
    3600
}

impl CronRequest {
    /// Builds a [`CronDefinition`] from this request, preserving `id` for an
    /// update (where the route has already resolved it from the path) and
    /// leaving it store-assigned (`0`) for a create.
    pub fn into_definition(self, id: i64) -> CronDefinition {
        CronDefinition::builder()
            .id(id)
            .name(self.name)
            .description(self.description)
            .cron_expression(self.cron_expression)
            .handler_name(self.handler_name)
            .handler_params(self.handler_params)
            .is_enabled(self.is_enabled)
            .allow_overlap(self.allow_overlap)
            .max_retry(self.max_retry)
            .timeout_seconds(self.timeout_seconds)
            .build()
    }
}
