use std::sync::Arc;

use anyhow::Context;

mod admin;
mod app;
mod auth;
mod config;
mod contacts;
mod db;
mod error;
mod extract;
mod mail;
mod state;
mod storage;
mod tags;
mod uploads;

#[cfg(test)]
mod testing;

use crate::{config::AppConfig, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let env_filter = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "touchly=debug,axum=info,tower_http=info".to_string());
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
    let pool = db::connect(&config.db).await?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("run database migrations")?;
    tracing::info!("migrations applied");

    let state = AppState::init(config.clone(), pool).await?;
    let app = app::build_app(state);
    app::serve(app, &config).await
}
