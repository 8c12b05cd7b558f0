//! Reference handlers (§4.8): enough to exercise the worker pool and admin
//! API end to end without a real downstream system.

use async_trait::async_trait;
use serde::Deserialize;

use super::Handler;

/// Always succeeds with a fixed payload.
pub struct SampleHandler;

#[async_trait]
impl Handler for SampleHandler {
    async fn execute(&self, _params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(serde_json::json!({ "message": "ok" }))
    }
}

#[derive(Deserialize)]
struct SleepParams {
    #[serde(default = "default_sleep_seconds")]
    seconds: u64,
}

fn default_sleep_seconds() -> u64 {
    1
}

/// Sleeps for `params.seconds` (default 1), used to exercise the timeout path.
pub struct SleepHandler;

#[async_trait]
impl Handler for SleepHandler {
    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        let params: SleepParams = if params.is_null() {
            SleepParams {
                seconds: default_sleep_seconds(),
            }
        } else {
            serde_json::from_value(params)?
        };
        tokio::time::sleep(std::time::Duration::from_secs(params.seconds)).await;
        Ok(serde_json::json!({ "slept_seconds": params.seconds }))
    }
}

/// Echoes its params back as the result.
pub struct EchoHandler;

#[async_trait]
impl Handler for EchoHandler {
    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value> {
        Ok(params)
    }
}
