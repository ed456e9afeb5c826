use std::sync::Arc;

use log::info;
use wager_core::OutcomeStrategies;
use wager_persistence_sqlite::{open_pool, sqlite_repositories};
use wager_server_api::{ApiState, JwtServiceImpl};
use wager_server_domain::{
    app::{Repositories, construct_app},
    game::ThreadRngSource,
};

use crate::{config::ServerConfig, logs::init_logger};

mod config;
mod logs;

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received. Preparing graceful exit...");
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    init_logger();

    let config = ServerConfig::from_env().expect("Invalid configuration");

    let repositories = match &config.db_path {
        Some(db_path) => {
            let pool = open_pool(db_path)
                .await
                .expect("Failed to open SQLite database");
            sqlite_repositories(pool)
        }
        None => {
            info!("WAGER_DB not set, using in-memory storage");
            Repositories::in_memory()
        }
    };

    let jwt_service = match &config.jwt_secret {
        Some(secret) => JwtServiceImpl::new(secret.as_bytes()),
        None => JwtServiceImpl::with_random_secret(),
    };

    let app = construct_app(
        repositories,
        Arc::new(Box::new(jwt_service)),
        Arc::new(Box::new(ThreadRngSource)),
        OutcomeStrategies::default(),
        config.app,
    );

    info!("Starting application");
    app.start();

    let state = ApiState {
        app,
        settings: Arc::new(config.api),
    };
    if let Err(e) = wager_server_api::run(state, shutdown_signal()).await {
        log::error!("HTTP API failed: {}", e);
    }
}
