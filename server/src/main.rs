mod config;
mod connection;
mod db;
mod handler;
mod routes;
mod services;
mod state;
mod storage;

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::test_service::TestServer;
use crate::storage::{MemoryRepository, PostgresRepository, Repository};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = ServerConfig::from_env();

    let repo: Arc<dyn Repository> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = db::init_pool(url, config.db_max_connections)
                .await
                .expect("database init failed");
            tracing::info!(max_connections = config.db_max_connections, "postgres storage ready");
            Arc::new(PostgresRepository::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; records live in memory and vanish on exit");
            Arc::new(MemoryRepository::new())
        }
    };

    let port = config.port;
    let state = state::AppState::new(TestServer::new(repo), config);
    let app = routes::app(state);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .expect("failed to bind");

    tracing::info!(%port, "test service listening");
    axum::serve(listener, app).await.expect("server failed");
}
