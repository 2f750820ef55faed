//! Helpline API server

use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use helpline_api::ai::{AiResponder, DisabledResponder, HttpAiResponder};
use helpline_api::config::LogFormat;
use helpline_api::routes::create_router;
use helpline_api::store::{InMemorySessionStore, PgSessionStore, SessionStore};
use helpline_api::{AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_tracing(config.log_format);

    let store: Arc<dyn SessionStore> = match &config.database_url {
        Some(url) => {
            let pool = helpline_shared::db::create_pool(url, config.database_max_connections)
                .await
                .context("Failed to connect to database")?;
            helpline_shared::db::run_migrations(&pool)
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Using Postgres session store");
            Arc::new(PgSessionStore::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - sessions are kept in memory only");
            Arc::new(InMemorySessionStore::new())
        }
    };

    let ai: Arc<dyn AiResponder> = match &config.ai_endpoint_url {
        Some(url) => {
            tracing::info!(endpoint = %url, "AI responder enabled");
            Arc::new(
                HttpAiResponder::new(
                    url.clone(),
                    config.ai_api_key.clone(),
                    config.ai_timeout(),
                    AppState::breaker_config(&config),
                )
                .context("Failed to build AI client")?,
            )
        }
        None => {
            tracing::warn!("AI_ENDPOINT_URL not set - AI replies disabled");
            Arc::new(DisabledResponder)
        }
    };

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, store, ai);
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Helpline API listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Helpline API stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("helpline_api=info,tower_http=info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
