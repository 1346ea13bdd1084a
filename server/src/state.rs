//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor. It
//! holds the call service (with its storage already injected) and the
//! configuration every websocket connection reads its queue sizes from.

use std::sync::Arc;

use crate::config::ServerConfig;
use crate::services::test_service::TestServer;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TestServer>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(service: TestServer, config: ServerConfig) -> Self {
        Self { service: Arc::new(service), config: Arc::new(config) }
    }
}
