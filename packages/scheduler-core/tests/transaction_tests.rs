//! Integration tests for the transaction decorator and readonly enforcement
//! (§8 properties 4, 5, 6; scenario S5).

mod common;

use scheduler_core::db::context;
use scheduler_core::db::{with_transaction, TransactionRunner};
use scheduler_core::error::DbError;
use scheduler_core::pg_args;
use test_context::test_context;

use crate::common::TestHarness;

#[test_context(TestHarness)]
#[tokio::test]
async fn a_write_under_a_readonly_context_fails_before_reaching_the_connection(ctx: &TestHarness) {
    let name = format!("ro-{}", TestHarness::unique_suffix());
    let db_name = ctx.db.name().to_string();

    let result = with_transaction(ctx.db.clone(), true, || async {
        context::execute(
            &db_name,
            "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
            pg_args![name.clone()],
        )
        .await
    })
    .await;

    assert!(matches!(result, Err(DbError::ReadonlyViolation { .. })));

    let exists = with_transaction(ctx.db.clone(), true, || async {
        context::fetch_optional(
            &db_name,
            "SELECT id FROM cron_definitions WHERE name = $1",
            pg_args![name.clone()],
        )
        .await
    })
    .await
    .expect("lookup should succeed");
    assert!(exists.is_none(), "the rejected write must never have reached the connection");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_function_that_raises_after_a_write_leaves_no_trace(ctx: &TestHarness) {
    let name = format!("rollback-{}", TestHarness::unique_suffix());
    let db_name = ctx.db.name().to_string();

    let result: Result<(), DbError> = with_transaction(ctx.db.clone(), false, || async {
        context::execute(
            &db_name,
            "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
            pg_args![name.clone()],
        )
        .await?;
        Err(DbError::NoActiveTransaction {
            db_name: "simulated-failure".to_string(),
        })
    })
    .await;

    assert!(result.is_err());

    let exists = with_transaction(ctx.db.clone(), true, || async {
        context::fetch_optional(
            &db_name,
            "SELECT id FROM cron_definitions WHERE name = $1",
            pg_args![name.clone()],
        )
        .await
    })
    .await
    .expect("lookup should succeed");
    assert!(exists.is_none(), "a rolled-back transaction must leave no trace of its write");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_runner_spanning_two_databases_commits_both_on_success(ctx: &TestHarness) {
    let name_a = format!("multi-a-{}", TestHarness::unique_suffix());
    let name_b = format!("multi-b-{}", TestHarness::unique_suffix());

    let second = TestHarness::with_name("secondary").await;

    let runner = TransactionRunner::new()
        .with_database(ctx.db.clone())
        .with_database(second.db.clone());

    let db_a = ctx.db.name().to_string();
    let db_b = second.db.name().to_string();
    let name_a_insert = name_a.clone();
    let name_b_insert = name_b.clone();

    runner
        .run(|| async {
            context::execute(
                &db_a,
                "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
                pg_args![name_a_insert],
            )
            .await?;
            context::execute(
                &db_b,
                "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
                pg_args![name_b_insert],
            )
            .await?;
            Ok::<(), DbError>(())
        })
        .await
        .expect("multi-db commit should succeed");

    for (db, name) in [(&ctx.db, &name_a), (&second.db, &name_b)] {
        let row = with_transaction(db.clone(), true, || async {
            context::fetch_optional(
                db.name(),
                "SELECT id FROM cron_definitions WHERE name = $1",
                pg_args![name.clone()],
            )
            .await
        })
        .await
        .expect("lookup should succeed");
        assert!(row.is_some(), "{} should be durably committed", name);
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn a_runner_spanning_two_databases_rolls_back_both_on_failure(ctx: &TestHarness) {
    let name_a = format!("multi-rb-a-{}", TestHarness::unique_suffix());
    let name_b = format!("multi-rb-b-{}", TestHarness::unique_suffix());

    let second = TestHarness::with_name("secondary").await;

    let runner = TransactionRunner::new()
        .with_database(ctx.db.clone())
        .with_database(second.db.clone());

    let db_a = ctx.db.name().to_string();
    let db_b = second.db.name().to_string();
    let name_a_insert = name_a.clone();
    let name_b_insert = name_b.clone();

    let result: Result<(), DbError> = runner
        .run(|| async {
            context::execute(
                &db_a,
                "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
                pg_args![name_a_insert],
            )
            .await?;
            context::execute(
                &db_b,
                "INSERT INTO cron_definitions (name, cron_expression, handler_name) VALUES ($1, '* * * * *', 'sample')",
                pg_args![name_b_insert],
            )
            .await?;
            Err(DbError::NoActiveTransaction {
                db_name: "simulated-failure".to_string(),
            })
        })
        .await;

    assert!(result.is_err());

    for (db, name) in [(&ctx.db, &name_a), (&second.db, &name_b)] {
        let row = with_transaction(db.clone(), true, || async {
            context::fetch_optional(
                db.name(),
                "SELECT id FROM cron_definitions WHERE name = $1",
                pg_args![name.clone()],
            )
            .await
        })
        .await
        .expect("lookup should succeed");
        assert!(row.is_none(), "{} must not be visible after the rollback", name);
    }
}
