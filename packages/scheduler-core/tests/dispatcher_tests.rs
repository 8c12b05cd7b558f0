//! Integration tests for the cron dispatcher (§8 properties 1, 2; scenarios S1, S2, S6).

mod common;

use chrono::Utc;
use scheduler_core::cron::dispatcher::{CronDispatcher, CronDispatcherConfig};
use scheduler_core::db::with_transaction;
use scheduler_core::store::execution_store::{self, ExecutionFilter};
use test_context::test_context;

use crate::common::fixtures::create_cron;
use crate::common::TestHarness;

fn dispatcher(ctx: &TestHarness) -> CronDispatcher {
    CronDispatcher::new(
        ctx.db.clone(),
        CronDispatcherConfig {
            poll_interval_seconds: 60,
            max_sleep_seconds: 300,
            min_cron_interval_seconds: 60,
        },
    )
}

async fn executions_for(ctx: &TestHarness, job_id: i64) -> Vec<scheduler_core::model::Execution> {
    let filter = ExecutionFilter {
        cron_id: Some(job_id),
        status: None,
        from_date: None,
        to_date: None,
    };
    with_transaction(ctx.db.clone(), true, || async {
        execution_store::list_paged(ctx.db.name(), 1, 50, &filter).await
    })
    .await
    .expect("failed to list executions")
    .items
}

#[test_context(TestHarness)]
#[tokio::test]
async fn poll_once_emits_a_pending_execution_for_a_due_minutely_cron(ctx: &TestHarness) {
    let name = format!("every-minute-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |mut d| {
        d.allow_overlap = true;
        d
    })
    .await;

    dispatcher(ctx).poll_once().await.expect("poll_once failed");

    let rows = executions_for(ctx, def.id).await;
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].status, scheduler_core::model::ExecutionStatus::Pending);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn two_concurrent_replicas_never_produce_two_rows_for_the_same_fire(ctx: &TestHarness) {
    let name = format!("race-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |mut d| {
        d.allow_overlap = true;
        d
    })
    .await;

    let replica_a = dispatcher(ctx);
    let replica_b = dispatcher(ctx);

    let (a, b) = tokio::join!(replica_a.poll_once(), replica_b.poll_once());
    a.expect("replica a failed");
    b.expect("replica b failed");

    let rows = executions_for(ctx, def.id).await;
    assert_eq!(
        rows.len(),
        1,
        "UNIQUE(job_id, scheduled_time) must collapse the racing emissions to one row"
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn overlap_suppression_skips_emission_while_a_non_terminal_row_exists(ctx: &TestHarness) {
    let name = format!("no-overlap-{}", TestHarness::unique_suffix());
    let def = create_cron(ctx, &name, |d| d).await;

    // Simulate a still-PENDING execution from a prior fire.
    with_transaction(ctx.db.clone(), false, || async {
        execution_store::insert_pending(
            ctx.db.name(),
            Some(def.id),
            &def.handler_name,
            &def.handler_params,
            Utc::now() - chrono::Duration::minutes(5),
        )
        .await
    })
    .await
    .expect("failed to seed existing pending execution");

    dispatcher(ctx).poll_once().await.expect("poll_once failed");

    let rows = executions_for(ctx, def.id).await;
    assert_eq!(
        rows.len(),
        1,
        "no new row should be emitted while a PENDING/RUNNING row exists for this job"
    );
}
