use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub admin_port: u16,

    /// Cron dispatcher
    pub poll_interval_seconds: u64,
    pub max_sleep_seconds: u64,
    pub min_cron_interval_seconds: u64,

    /// Worker pool
    pub worker_pool_size: usize,
    pub worker_poll_interval_seconds: u64,
    pub claim_batch_size: i64,
    pub shutdown_timeout_seconds: u64,

    /// Connection pool
    pub pool_size: u32,
    pub pool_timeout_seconds: u64,
    pub max_idle_time_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            admin_port: env_parse("ADMIN_PORT", 8080)?,

            poll_interval_seconds: env_parse("DISPATCHER_POLL_INTERVAL_SECONDS", 60)?,
            max_sleep_seconds: env_parse("DISPATCHER_MAX_SLEEP_SECONDS", 300)?,
            min_cron_interval_seconds: env_parse("DISPATCHER_MIN_CRON_INTERVAL_SECONDS", 60)?,

            worker_pool_size: env_parse("WORKER_POOL_SIZE", 10)?,
            worker_poll_interval_seconds: env_parse("WORKER_POLL_INTERVAL_SECONDS", 5)?,
            claim_batch_size: env_parse("WORKER_CLAIM_BATCH_SIZE", 10)?,
            shutdown_timeout_seconds: env_parse("WORKER_SHUTDOWN_TIMEOUT_SECONDS", 30)?,

            pool_size: env_parse("DB_POOL_SIZE", 10)?,
            pool_timeout_seconds: env_parse("DB_POOL_TIMEOUT_SECONDS", 30)?,
            max_idle_time_seconds: env_parse("DB_MAX_IDLE_TIME_SECONDS", 300)?,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(val) => val
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a valid value: {}", name, e)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_parse_falls_back_to_default_when_unset() {
        std::env::remove_var("SCHEDULER_CORE_TEST_UNSET_VAR");
        let value: u64 = env_parse("SCHEDULER_CORE_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn env_parse_rejects_invalid_value() {
        std::env::set_var("SCHEDULER_CORE_TEST_BAD_VAR", "not-a-number");
        let result: Result<u64> = env_parse("SCHEDULER_CORE_TEST_BAD_VAR", 1);
        assert!(result.is_err());
        std::env::remove_var("SCHEDULER_CORE_TEST_BAD_VAR");
    }
}
