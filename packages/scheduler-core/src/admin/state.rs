use std::sync::Arc;

use crate::db::pool::Database;
use crate::handlers::HandlerRegistry;

/// Shared state for every admin route: the pool CRUD/inspection runs
/// against, and the registry used to 400-check `handler_name` on create.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub handlers: Arc<HandlerRegistry>,
}
