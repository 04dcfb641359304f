use std::sync::Arc;

use anyhow::Context;
use sqlx::PgPool;
use tokio::time::Instant;

mod app;
mod auth;
mod config;
mod db;
mod state;

use crate::{
    auth::{password::Argon2Hasher, repo::PgUserStore, services::AccountService},
    config::{AppConfig, Env},
    db::{connect_with_retries, PgConnector, RetryPolicy},
    state::AppState,
};

fn init_tracing(env: Env) {
    let default_filter = match env {
        Env::Local => "authx=debug,tower_http=info",
        Env::Prod => "authx=info,tower_http=info",
    };
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.to_string());

    match env {
        Env::Local => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .pretty()
            .init(),
        Env::Prod => tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .json()
            .init(),
    }
}

async fn run_migrations(db: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations")
        .run(db)
        .await
        .context("run database migrations")?;
    tracing::info!("database migrations applied");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(config.env);

    let policy = RetryPolicy::from(&config.database);
    let deadline = Instant::now() + policy.connect_timeout;
    let db = connect_with_retries(&PgConnector::new(&config.database), &policy, deadline).await?;

    if config.database.auto_migrate {
        run_migrations(&db).await?;
    }

    let hasher = Argon2Hasher::new(config.password_hash)?;
    let users = AccountService::new(Arc::new(PgUserStore::new(db.clone())), hasher);
    let app = app::build_app(AppState::new(Arc::new(users)), config.http.request_timeout);

    let served = app::serve(app, &config.http, app::shutdown_signal()).await;

    tracing::debug!("closing postgres connection");
    db.close().await;

    served?;
    tracing::info!("server stopped");
    Ok(())
}
