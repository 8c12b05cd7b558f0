//! Integration tests for the worker pool's claim and retry logic
//! (§8 properties 3, 7, 8; scenarios S3, S4).

mod common;

use std::sync::Arc;

use chrono::Utc;
use scheduler_core::db::with_transaction;
use scheduler_core::handlers::{self, HandlerRegistry};
use scheduler_core::model::ExecutionStatus;
use scheduler_core::store::execution_store;
use scheduler_core::worker::executor;
use test_context::test_context;

use crate::common::fixtures::create_cron;
use crate::common::TestHarness;

fn registry() -> Arc<HandlerRegistry> {
    let mut registry = HandlerRegistry::new();
    handlers::register_default_handlers(&mut registry);
    Arc::new(registry)
}

async fn fetch(ctx: &TestHarness, id: i64) -> scheduler_core::model::Execution {
    with_transaction(ctx.db.clone(), true, || async {
        execution_store::find_by_id(ctx.db.name(), id).await
    })
    .await
    .expect("query failed")
    .expect("execution should still exist")
}

async fn insert_pending(ctx: &TestHarness, job_id: i64, handler_name: &str, params: serde_json::Value) -> i64 {
    with_transaction(ctx.db.clone(), false, || async {
        execution_store::insert_pending(ctx.db.name(), Some(job_id), handler_name, &params, Utc::now()).await
    })
    .await
    .expect("insert_pending failed")
    .expect("insert should not collide")
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_pending_row_claimed_by_n_workers_is_claimed_exactly_once(ctx: &TestHarness) {
    let name = format!("claim-race-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |d| d).await;
    let id = insert_pending(ctx, def.id, "sample", serde_json::json!({})).await;

    let attempts = 8;
    let wins = futures::future::join_all((0..attempts).map(|_| {
        let db_name = ctx.db.name().to_string();
        let db = ctx.db.clone();
        async move {
            with_transaction(db, false, || async { execution_store::claim(&db_name, id).await })
                .await
                .expect("claim query failed")
        }
    }))
    .await
    .into_iter()
    .filter(|won| *won)
    .count();

    assert_eq!(wins, 1, "exactly one of {attempts} concurrent claims should win the race");

    let row = fetch(ctx, id).await;
    assert_eq!(row.status, ExecutionStatus::Running);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn handler_success_transitions_to_success_with_result(ctx: &TestHarness) {
    let name = format!("success-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |d| d).await;
    let id = insert_pending(ctx, def.id, "sample", serde_json::json!({})).await;

    let execution = fetch(ctx, id).await;
    executor::run_claimed(ctx.db.clone(), registry(), execution, def.max_retry, def.timeout_seconds as i64).await;

    let row = fetch(ctx, id).await;
    assert_eq!(row.status, ExecutionStatus::Success);
    assert_eq!(row.result.as_deref(), Some(r#"{"message":"ok"}"#));
    assert!(row.finished_at.is_some());
    assert_eq!(row.retry_count, 0);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_handler_that_outlives_its_timeout_is_marked_timeout_and_retried(ctx: &TestHarness) {
    let name = format!("timeout-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |mut d| {
        d.timeout_seconds = 1;
        d.max_retry = 2;
        d
    })
    .await;
    let id = insert_pending(ctx, def.id, "sleep", serde_json::json!({ "seconds": 5 })).await;

    let execution = fetch(ctx, id).await;
    executor::run_claimed(ctx.db.clone(), registry(), execution, def.max_retry, def.timeout_seconds as i64).await;

    let row = fetch(ctx, id).await;
    assert_eq!(row.status, ExecutionStatus::Pending, "first timeout retries since 1 < 2");
    assert_eq!(row.retry_count, 1);

    // Second timeout (S4): retry_count increments again to 2, and since
    // 2 < max_retry(2) is false, the row lands terminal in TIMEOUT.
    let execution = fetch(ctx, id).await;
    executor::run_claimed(ctx.db.clone(), registry(), execution, def.max_retry, def.timeout_seconds as i64).await;

    let row = fetch(ctx, id).await;
    assert_eq!(row.status, ExecutionStatus::Timeout, "second timeout exhausts the retry budget of 2");
    assert_eq!(row.retry_count, 2);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_perpetually_failing_handler_exhausts_its_retry_budget(ctx: &TestHarness) {
    let name = format!("fail-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |mut d| {
        d.max_retry = 3;
        d
    })
    .await;
    let id = insert_pending(ctx, def.id, "missing-handler", serde_json::json!({})).await;

    // PENDING -> RUNNING -> FAILED -> PENDING, three times, landing terminal.
    // `run_claimed` performs the PENDING->RUNNING claim itself, so each
    // iteration just needs the row to already be PENDING again.
    for _ in 0..def.max_retry {
        let execution = fetch(ctx, id).await;
        assert_eq!(execution.status, ExecutionStatus::Pending);

        executor::run_claimed(ctx.db.clone(), registry(), execution, def.max_retry, def.timeout_seconds as i64)
            .await;
    }

    let row = fetch(ctx, id).await;
    assert_eq!(row.status, ExecutionStatus::Failed, "retry budget of 3 should be exhausted");
    assert_eq!(row.retry_count, def.max_retry);
}
