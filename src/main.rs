use std::sync::Arc;

mod app;
mod auth;
mod broker;
mod config;
mod db;
mod rpc;
mod state;

use crate::{auth::repo::PgUserStore, config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "auth_ms=debug,axum=info,tower_http=info".to_string());
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false);

    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    let config = Arc::new(AppConfig::from_env()?);
    let pool = db::connect(&config).await?;
    db::migrate(&pool).await?;
    tracing::info!("connected to the database");

    let state = AppState::from_parts(config.clone(), Arc::new(PgUserStore::new(pool)))?;
    let app = app::build_app(state.clone());

    if config.nats_servers.is_empty() {
        tracing::info!("NATS_SERVERS not set; serving HTTP only");
        return app::serve(app, &config).await;
    }

    tokio::select! {
        res = app::serve(app, &config) => res,
        res = broker::listen(&config.nats_servers, state) => res,
    }
}
