//! # Verdict API Server
//!
//! HTTP front end for the rules-evaluation engine. The interesting work
//! lives in `verdict-engine`; this binary wires configuration, the
//! database pool, the tenant manager and a thin axum router around it.
//!
//! Startup order matters: configuration, pool, migrations, then one
//! engine per stored tenant. Any failure along that path exits non-zero
//! before the socket is bound.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{info, Level};
use verdict_core::{database, logging, Config};
use verdict_engine::{PgTenantStore, TenantManager};

mod error;
mod handlers;
mod health;
mod state;

use crate::handlers::{evaluate, rules, tenants};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first so the log level applies from the start
    let config = Config::load()?;
    logging::init(&config.logging);

    info!("starting verdict server");

    let pool = database::connect(&config.database).await?;

    run_migrations(&pool).await?;

    let store = Arc::new(PgTenantStore::new(pool.clone()));
    let manager = Arc::new(TenantManager::new(store.clone()));
    let loaded = manager.load_all_tenants().await?;
    info!(tenants = loaded, "tenant engines ready");

    let state = AppState {
        config: config.clone(),
        pool,
        store,
        manager,
    };

    let app = create_app(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server shutdown complete");
    Ok(())
}

fn create_app(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", create_api_routes())
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .route("/metrics", get(health::metrics_text))
        .layer(
            ServiceBuilder::new()
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                        .on_request(DefaultOnRequest::new().level(Level::INFO))
                        .on_response(DefaultOnResponse::new().level(Level::INFO)),
                )
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
        .fallback(handler_404)
}

fn create_api_routes() -> Router<AppState> {
    Router::new()
        .nest("/tenants", tenants::tenant_routes().merge(rules::rule_routes()))
        .nest("/evaluate", evaluate::evaluate_routes())
}

async fn handler_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": {
                "message": "Resource not found",
                "type": "not_found"
            }
        })),
    )
}

async fn run_migrations(pool: &sqlx::PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    info!("running database migrations");
    sqlx::migrate!("../../migrations").run(pool).await?;
    info!("migrations complete");
    Ok(())
}

/// Resolves once the process is asked to stop: ctrl-c anywhere, SIGTERM
/// on unix (what container runtimes send).
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!(signal = "ctrl-c", "shutdown requested"),
            _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown requested"),
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!(signal = "ctrl-c", "shutdown requested");
    }
}
