use sqlx::PgPool;
use std::sync::Arc;
use verdict_core::Config;
use verdict_engine::{PgTenantStore, TenantManager};

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub pool: PgPool,
    pub store: Arc<PgTenantStore>,
    pub manager: Arc<TenantManager>,
}
