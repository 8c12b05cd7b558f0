//! C3: the multi-database transaction decorator.
//!
//! `TransactionRunner` opens a transaction on every database the caller
//! names, binds each into the ambient registry (§4.2) so handler code can
//! reach them by name, runs the supplied closure, and then either commits
//! every transaction in the order they were opened or rolls every one of
//! them back in reverse order. This is best-effort multi-database
//! consistency, not two-phase commit: a failure partway through the commit
//! phase leaves earlier commits applied and later ones rolled back.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use crate::error::DbError;

use super::context;
use super::pool::Database;

pub struct TransactionRunner {
    databases: Vec<Arc<Database>>,
    readonly: bool,
}

impl TransactionRunner {
    pub fn new() -> Self {
        Self {
            databases: Vec::new(),
            readonly: false,
        }
    }

    /// Registers a database to open a transaction against. Order is
    /// preserved: commits happen in this order, rollbacks in reverse.
    pub fn with_database(mut self, db: Arc<Database>) -> Self {
        self.databases.push(db);
        self
    }

    /// Every transaction opened by this runner rejects write statements.
    pub fn readonly(mut self) -> Self {
        self.readonly = true;
        self
    }

    /// Opens a transaction on each registered database, binds them into the
    /// ambient registry, runs `f`, then commits (on success) or rolls back
    /// (on failure) every opened transaction.
    pub async fn run<F, Fut, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        context::scope(|| self.run_in_scope(f)).await
    }

    async fn run_in_scope<F, Fut, T>(&self, f: F) -> Result<T, DbError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, DbError>>,
    {
        let mut opened = Vec::with_capacity(self.databases.len());
        for db in &self.databases {
            match db.begin(self.readonly).await {
                Ok(ctx) => {
                    context::bind(ctx)?;
                    opened.push(db.name().to_string());
                }
                Err(e) => {
                    self.rollback_opened(&opened).await;
                    return Err(e);
                }
            }
        }

        let result = f().await;

        match result {
            Ok(value) => match self.commit_opened(&opened).await {
                Ok(()) => Ok(value),
                Err(e) => Err(e),
            },
            Err(e) => {
                self.rollback_opened(&opened).await;
                Err(e)
            }
        }
    }

    async fn commit_opened(&self, names: &[String]) -> Result<(), DbError> {
        for (i, name) in names.iter().enumerate() {
            if let Err(e) = context::commit(name).await {
                // Roll back everything committed after this point is
                // impossible (already durable); roll back what's left
                // uncommitted so we don't leave dangling bound contexts.
                self.rollback_opened(&names[i + 1..]).await;
                return Err(e);
            }
        }
        Ok(())
    }

    async fn rollback_opened(&self, names: &[String]) {
        for name in names.iter().rev() {
            let _ = context::rollback(name).await;
        }
    }
}

impl Default for TransactionRunner {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience wrapper for the common single-database case.
pub async fn with_transaction<F, Fut, T>(
    db: Arc<Database>,
    readonly: bool,
    f: F,
) -> Result<T, DbError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, DbError>>,
{
    let mut runner = TransactionRunner::new().with_database(db);
    if readonly {
        runner = runner.readonly();
    }
    runner.run(f).await
}

pub type DatabaseRegistry = HashMap<String, Arc<Database>>;
