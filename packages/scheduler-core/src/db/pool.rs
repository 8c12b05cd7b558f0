//! C1: pooled database handles.
//!
//! Each configured database is represented by one `Database`, a thin wrapper
//! around an `sqlx::PgPool` that applies the pool-sizing and idle-refresh
//! policy and maps acquisition failures onto [`DbError::PoolExhausted`].

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::error::DbError;

use super::transaction::TransactionContext;

/// Pool sizing and lifecycle knobs, one instance per configured database.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub pool_size: u32,
    pub pool_timeout_seconds: u64,
    pub max_idle_time_seconds: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 10,
            pool_timeout_seconds: 30,
            max_idle_time_seconds: 300,
        }
    }
}

/// A named, pooled connection to one database. `name` is the key under which
/// transaction contexts opened against this pool are bound in the ambient
/// registry (§4.2).
pub struct Database {
    name: String,
    pool: PgPool,
}

impl Database {
    pub async fn connect(
        name: impl Into<String>,
        database_url: &str,
        config: &PoolConfig,
    ) -> Result<Self, DbError> {
        // Idle connections beyond `max_idle_time` are closed and replaced by
        // sqlx's own idle reaper; `test_before_acquire` catches connections
        // that went stale despite not yet hitting the idle timeout.
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.max_idle_time_seconds))
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        Ok(Self {
            name: name.into(),
            pool,
        })
    }

    pub fn from_pool(name: impl Into<String>, pool: PgPool) -> Self {
        Self {
            name: name.into(),
            pool,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Acquires a connection and opens a transaction on it.
    pub async fn begin(&self, readonly: bool) -> Result<TransactionContext, DbError> {
        let tx = self.pool.begin().await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DbError::PoolExhausted {
                waited_seconds: self.pool.options().get_acquire_timeout().as_secs(),
            },
            other => DbError::Storage(other),
        })?;

        Ok(TransactionContext::new(self.name.clone(), tx, readonly))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_pool_config_matches_documented_defaults() {
        let cfg = PoolConfig::default();
        assert_eq!(cfg.pool_size, 10);
        assert_eq!(cfg.pool_timeout_seconds, 30);
        assert_eq!(cfg.max_idle_time_seconds, 300);
    }
}
