//! Connection pooling, the ambient transaction registry, and the
//! multi-database transaction decorator (C1/C2/C3).

pub mod context;
pub mod decorator;
pub mod pool;
pub mod transaction;

pub use decorator::{with_transaction, DatabaseRegistry, TransactionRunner};
pub use pool::{Database, PoolConfig};
pub use transaction::TransactionContext;
