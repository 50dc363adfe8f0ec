//! Meridian API Server

use meridian_api::{create_router, logging, state};
use meridian_core::AppConfig;
use std::sync::Arc;
use tracing::{error, info, Instrument};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env is optional
    dotenv::dotenv().ok();

    let config = match std::env::var("MERIDIAN_CONFIG") {
        Ok(path) => AppConfig::from_file(path)?.with_env_override()?,
        Err(_) => AppConfig::from_env()?,
    };

    logging::init(&config.logging)?;

    let span = tracing::info_span!("server", service = "meridian");
    run(config).instrument(span).await
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let db = state::connect_lazy(&config.database)?;
    let addr = config.server.bind_addr();
    let env = config.app.env;

    let app = create_router(Arc::new(state::AppState::new(config, db.clone())));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, %env, "startup");
    if env != meridian_core::Environment::Production {
        info!("OpenAPI spec at http://{}/openapi.json", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("shutdown");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}
