//! The handler registry (§4.8): maps a `handler_name` string to executable
//! code. Populated once at process start via [`register_default_handlers`],
//! never by import side effects or plugin discovery.

mod sample;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

pub use sample::{EchoHandler, SampleHandler, SleepHandler};

/// User-supplied code executing one execution's work. Implementors are
/// expected to honor cancellation at their own suspension points; the worker
/// pool wraps every call in `tokio::time::timeout` and does not otherwise
/// police what a handler does with its time budget.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn execute(&self, params: serde_json::Value) -> anyhow::Result<serde_json::Value>;
}

/// An append-only name → handler map, built once at process start and shared
/// read-only across every executor task.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, handler: Arc<dyn Handler>) {
        self.handlers.insert(name.into(), handler);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

/// Registers the reference handlers the worker pool and admin API are
/// exercisable against without a real downstream system.
pub fn register_default_handlers(registry: &mut HandlerRegistry) {
    registry.register("sample", Arc::new(SampleHandler));
    registry.register("sleep", Arc::new(SleepHandler));
    registry.register("echo", Arc::new(EchoHandler));
}
