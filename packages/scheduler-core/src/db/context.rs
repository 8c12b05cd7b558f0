//! C2: the ambient transaction registry.
//!
//! Handler code calls `db::context::execute("primary", sql, params)` without
//! threading a transaction handle through every function signature. Each
//! task gets its own map of bound `TransactionContext`s, keyed by database
//! name, stored in a `tokio::task_local!`.
//!
//! The map is a `RefCell<HashMap<...>>` rather than a `Mutex` because it is
//! never touched across a `.await` boundary while borrowed: every operation
//! here removes its `TransactionContext` from the map (an owned value), runs
//! the `.await` against that owned value with no borrow of the map alive,
//! then puts it back. Borrowing `&mut TransactionContext` out of the
//! `RefCell` and holding it across an `.await` would make the returned
//! future self-referential against the `Ref`/`RefMut` guard; take-use-putback
//! avoids that entirely.

use std::cell::RefCell;
use std::collections::HashMap;

use sqlx::postgres::{PgArguments, PgRow};

use crate::error::DbError;

use super::transaction::TransactionContext;

tokio::task_local! {
    static TX_MAP: RefCell<HashMap<String, TransactionContext>>;
}

/// Runs `f` with a fresh, empty ambient registry scoped to the task it
/// spawns. Dispatchers and the worker pool call this once per unit of work
/// (per cron-poll cycle, per claimed execution) so bindings never leak
/// between concurrent tasks.
pub async fn scope<F, Fut, T>(f: F) -> T
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = T>,
{
    TX_MAP.scope(RefCell::new(HashMap::new()), f()).await
}

/// Binds a transaction context under its database name, replacing any
/// existing binding for the same name.
pub fn bind(ctx: TransactionContext) -> Result<(), DbError> {
    TX_MAP.with(|map| {
        map.borrow_mut().insert(ctx.db_name().to_string(), ctx);
    });
    Ok(())
}

/// Removes and returns the transaction bound under `db_name`, if any.
pub fn unbind(db_name: &str) -> Option<TransactionContext> {
    TX_MAP.with(|map| map.borrow_mut().remove(db_name))
}

pub fn is_bound(db_name: &str) -> bool {
    TX_MAP.with(|map| map.borrow().contains_key(db_name))
}

async fn with_bound<T>(
    db_name: &str,
    f: impl FnOnce(
        &mut TransactionContext,
    ) -> std::pin::Pin<Box<dyn std::future::Future<Output = Result<T, DbError>> + '_>>,
) -> Result<T, DbError> {
    let mut ctx = TX_MAP
        .with(|map| map.borrow_mut().remove(db_name))
        .ok_or_else(|| DbError::NoActiveTransaction {
            db_name: db_name.to_string(),
        })?;

    let result = f(&mut ctx).await;

    TX_MAP.with(|map| {
        map.borrow_mut().insert(db_name.to_string(), ctx);
    });

    result
}

pub async fn execute(db_name: &str, sql: &str, params: PgArguments) -> Result<u64, DbError> {
    with_bound(db_name, move |ctx| Box::pin(ctx.execute(sql, params))).await
}

pub async fn fetch_all(
    db_name: &str,
    sql: &str,
    params: PgArguments,
) -> Result<Vec<PgRow>, DbError> {
    with_bound(db_name, move |ctx| Box::pin(ctx.fetch_all(sql, params))).await
}

pub async fn fetch_optional(
    db_name: &str,
    sql: &str,
    params: PgArguments,
) -> Result<Option<PgRow>, DbError> {
    with_bound(db_name, move |ctx| {
        Box::pin(ctx.fetch_optional(sql, params))
    })
    .await
}

pub async fn commit(db_name: &str) -> Result<(), DbError> {
    with_bound(db_name, |ctx| Box::pin(ctx.commit())).await
}

pub async fn rollback(db_name: &str) -> Result<(), DbError> {
    with_bound(db_name, |ctx| Box::pin(ctx.rollback())).await
}
