mod auth;
mod config;
mod db;
mod entities;
mod error;
mod models;
mod patch;
mod query;
mod routes;
mod store;
mod sync;

use std::sync::Arc;

use anyhow::Context;
use axum::extract::FromRef;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{auth::AuthService, config::Config, store::Repository};

pub struct AppState {
    pub repo: Repository,
    pub auth: AuthService,
}

impl FromRef<Arc<AppState>> for AuthService {
    fn from_ref(state: &Arc<AppState>) -> Self {
        state.auth.clone()
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,filmoteka=debug,sqlx=warn".to_string()),
        )
        .init();

    let config = Config::from_env()?;

    let db =
        db::connect_and_init(&config.database_url, config.db_max_connections, config.db_timeout)
            .await
            .context("opening catalog database")?;
    let repo = Repository::new(db, config.db_timeout);

    let auth = AuthService::new(
        Arc::new(repo.clone()),
        config.jwt_signing_key.as_bytes(),
        config.token_ttl,
        config.bcrypt_cost,
    );
    if let Some(seed) = &config.admin {
        auth.ensure_admin(&seed.username, &seed.password)
            .await
            .context("ensuring admin account")?;
    }

    let state = Arc::new(AppState { repo, auth });

    let app = routes::router(state)
        .layer(CorsLayer::new().allow_origin(Any).allow_headers(Any).allow_methods(Any))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(config.addr)
        .await
        .with_context(|| format!("binding {}", config.addr))?;
    tracing::info!(addr = %config.addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "unable to listen for Ctrl-C");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            },
            Err(err) => {
                tracing::error!(error = %err, "unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
