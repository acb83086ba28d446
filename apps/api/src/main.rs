mod config;
mod db;
mod errors;
mod models;
mod results;
mod routes;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::db::{create_pool, run_migrations};
use crate::results::reconcile::ReconciliationEngine;
use crate::results::resolver::{PgReferenceResolver, ReferenceResolver};
use crate::results::service::ResumeResultService;
use crate::results::store::{PgResultStore, ResultStore};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume-results v{}", env!("CARGO_PKG_VERSION"));

    // Initialize PostgreSQL
    let db = create_pool(&config.database_url, config.db_max_connections).await?;
    if config.run_migrations {
        run_migrations(&db).await?;
    }

    let store: Arc<dyn ResultStore> = Arc::new(PgResultStore::new(db.clone()));
    let resolver: Arc<dyn ReferenceResolver> = Arc::new(PgReferenceResolver::new(db));

    let results = Arc::new(ResumeResultService::new(
        store.clone(),
        resolver,
        config.translation_mode,
    ));
    info!("Translation mode: {:?}", config.translation_mode);

    let reconciler = Arc::new(ReconciliationEngine::new(store, config.reconcile_strategy));
    if let Some(secs) = config.reconcile_interval_secs {
        info!(
            "Scheduling {:?} reconciliation every {secs}s",
            config.reconcile_strategy
        );
        tokio::spawn(reconciler.clone().run_every(Duration::from_secs(secs)));
    }

    let state = AppState {
        results,
        reconciler,
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
