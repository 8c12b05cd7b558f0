//! The queue dispatcher loop (§4.5): turns broker messages into PENDING
//! `executions` rows.

use std::sync::Arc;

use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::db::pool::Database;
use crate::db::with_transaction;
use crate::model::QueueMessage;
use crate::queue::adapter::QueueAdapter;
use crate::store::{cron_store, execution_store};

pub struct QueueDispatcher {
    db: Arc<Database>,
    adapter: Arc<dyn QueueAdapter>,
}

impl QueueDispatcher {
    pub fn new(db: Arc<Database>, adapter: Arc<dyn QueueAdapter>) -> Self {
        Self { db, adapter }
    }

    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("queue dispatcher starting");
        self.adapter.connect().await?;

        loop {
            let msg = tokio::select! {
                _ = shutdown.cancelled() => None,
                msg = self.adapter.receive() => msg,
            };

            let Some(msg) = msg else { break };

            match self.process_message(&msg).await {
                Ok(()) => {
                    if let Err(e) = self.adapter.complete(&msg).await {
                        warn!(error = %e, "failed to acknowledge completed message");
                    }
                }
                Err(e) => {
                    error!(handler_name = %msg.handler_name, error = %e, "failed to process queue message");
                    if let Err(e) = self.adapter.abandon(&msg).await {
                        warn!(error = %e, "failed to abandon message");
                    }
                }
            }
        }

        self.adapter.disconnect().await?;
        info!("queue dispatcher stopped");
        Ok(())
    }

    async fn process_message(&self, msg: &QueueMessage) -> anyhow::Result<()> {
        let db_name = self.db.name().to_string();
        let job_id = msg.job_id;
        let handler_name = msg.handler_name.clone();
        let params = msg.params.clone();

        let inserted = with_transaction(self.db.clone(), false, || async {
            let (job_id, merged_params) = match job_id {
                Some(id) => (Some(id), params.clone()),
                None => match cron_store::find_by_handler_name(&db_name, &handler_name).await? {
                    Some(def) => (Some(def.id), merge_params(&def.handler_params, &params)),
                    None => (None, params.clone()),
                },
            };

            execution_store::insert_pending(&db_name, job_id, &handler_name, &merged_params, Utc::now()).await
        })
        .await?;

        match inserted {
            Some(id) => debug!(execution_id = id, handler_name = %msg.handler_name, "emitted execution from queue message"),
            None => debug!(handler_name = %msg.handler_name, "queue message produced a duplicate emission, ignoring"),
        }
        Ok(())
    }
}

/// Merges `override_params` over `base`: object keys in `override_params`
/// win on collision; non-object values on either side mean `override_params`
/// replaces `base` wholesale.
fn merge_params(base: &serde_json::Value, override_params: &serde_json::Value) -> serde_json::Value {
    match (base, override_params) {
        (serde_json::Value::Object(base_map), serde_json::Value::Object(override_map)) => {
            let mut merged = base_map.clone();
            for (key, value) in override_map {
                merged.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(merged)
        }
        // An explicit null override means "nothing to override with", not
        // "discard the base" — keep the definition's stored params.
        (_, serde_json::Value::Null) => base.clone(),
        _ => override_params.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_params_overrides_base_keys_on_collision() {
        let base = serde_json::json!({ "a": 1, "b": 2 });
        let overrides = serde_json::json!({ "b": 20, "c": 3 });
        let merged = merge_params(&base, &overrides);
        assert_eq!(merged, serde_json::json!({ "a": 1, "b": 20, "c": 3 }));
    }

    #[test]
    fn merge_params_falls_back_to_override_when_base_is_not_an_object() {
        let base = serde_json::json!(null);
        let overrides = serde_json::json!({ "x": 1 });
        assert_eq!(merge_params(&base, &overrides), overrides);
    }

    #[test]
    fn merge_params_keeps_base_when_override_is_explicitly_null() {
        let base = serde_json::json!({ "a": 1, "b": 2 });
        let overrides = serde_json::json!(null);
        assert_eq!(merge_params(&base, &overrides), base);
    }
}
