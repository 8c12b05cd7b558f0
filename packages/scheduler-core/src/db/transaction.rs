//! `TransactionContext`: an owned, 'static transaction handle with readonly
//! enforcement and debug query logging (§4.1).

use sqlx::postgres::{PgArguments, PgRow};
use sqlx::{Postgres, Transaction};
use tracing::debug;

use crate::error::DbError;

const WRITE_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "CREATE", "DROP", "ALTER", "TRUNCATE",
];

fn is_write_query(sql: &str) -> bool {
    let upper = sql.trim_start().to_uppercase();
    WRITE_KEYWORDS.iter().any(|kw| upper.starts_with(kw))
}

fn log_query(sql: &str, params: &PgArguments) {
    debug!(sql, params = ?params, "[SQL]");
}

fn log_result(rows: usize) {
    debug!(rows, "[SQL Result]");
}

/// Wraps a single `sqlx::Transaction<'static, Postgres>`. `begin`/`commit`/
/// `rollback` are idempotent no-ops outside of the expected state transition,
/// matching the behavior of the connection it's modeled on.
pub struct TransactionContext {
    db_name: String,
    readonly: bool,
    inner: Option<Transaction<'static, Postgres>>,
}

impl TransactionContext {
    pub(super) fn new(
        db_name: String,
        tx: Transaction<'static, Postgres>,
        readonly: bool,
    ) -> Self {
        Self {
            db_name,
            readonly,
            inner: Some(tx),
        }
    }

    pub fn db_name(&self) -> &str {
        &self.db_name
    }

    pub fn readonly(&self) -> bool {
        self.readonly
    }

    pub fn in_transaction(&self) -> bool {
        self.inner.is_some()
    }

    fn guard_readonly(&self, sql: &str) -> Result<(), DbError> {
        if self.readonly && is_write_query(sql) {
            return Err(DbError::ReadonlyViolation {
                statement: sql.to_string(),
            });
        }
        Ok(())
    }

    /// Executes a statement that doesn't return rows, returning the affected
    /// row count.
    pub async fn execute(&mut self, sql: &str, params: PgArguments) -> Result<u64, DbError> {
        self.guard_readonly(sql)?;
        log_query(sql, &params);

        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| DbError::NoActiveTransaction {
                db_name: self.db_name.clone(),
            })?;

        let result = sqlx::query_with(sql, params).execute(&mut **tx).await?;
        let affected = result.rows_affected();
        log_result(affected as usize);
        Ok(affected)
    }

    pub async fn fetch_all(&mut self, sql: &str, params: PgArguments) -> Result<Vec<PgRow>, DbError> {
        self.guard_readonly(sql)?;
        log_query(sql, &params);

        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| DbError::NoActiveTransaction {
                db_name: self.db_name.clone(),
            })?;

        let rows = sqlx::query_with(sql, params).fetch_all(&mut **tx).await?;
        log_result(rows.len());
        Ok(rows)
    }

    pub async fn fetch_optional(
        &mut self,
        sql: &str,
        params: PgArguments,
    ) -> Result<Option<PgRow>, DbError> {
        self.guard_readonly(sql)?;
        log_query(sql, &params);

        let tx = self
            .inner
            .as_mut()
            .ok_or_else(|| DbError::NoActiveTransaction {
                db_name: self.db_name.clone(),
            })?;

        let row = sqlx::query_with(sql, params)
            .fetch_optional(&mut **tx)
            .await?;
        log_result(row.is_some() as usize);
        Ok(row)
    }

    /// Idempotent: a second call after the transaction has already been
    /// consumed is a no-op.
    pub async fn commit(&mut self) -> Result<(), DbError> {
        match self.inner.take() {
            Some(tx) => {
                tx.commit().await?;
                Ok(())
            }
            None => {
                debug!(db = %self.db_name, "commit() called with no active transaction, ignoring");
                Ok(())
            }
        }
    }

    /// Idempotent: a second call after the transaction has already been
    /// consumed is a no-op.
    pub async fn rollback(&mut self) -> Result<(), DbError> {
        match self.inner.take() {
            Some(tx) => {
                tx.rollback().await?;
                Ok(())
            }
            None => {
                debug!(db = %self.db_name, "rollback() called with no active transaction, ignoring");
                Ok(())
            }
        }
    }
}

pub fn no_args() -> PgArguments {
    PgArguments::default()
}

/// Builds a [`PgArguments`] from a list of bind values, in the style of
/// `sqlx::query!`'s positional `$1, $2, ...` placeholders, for call sites
/// that issue SQL through the ambient registry (`db::context`) rather than
/// `sqlx::query` directly.
#[macro_export]
macro_rules! pg_args {
    ($($value:expr),* $(,)?) => {{
        #[allow(unused_mut)]
        let mut args = sqlx::postgres::PgArguments::default();
        $(
            sqlx::Arguments::add(&mut args, $value).expect("encode query parameter");
        )*
        args
    }};
}
