//! Cron Dispatcher (C4): emits PENDING executions from cron schedules.

pub mod dispatcher;
pub mod expression;

pub use dispatcher::{CronDispatcher, CronDispatcherConfig};
pub use expression::{validate_min_interval, CronExpressionError};
