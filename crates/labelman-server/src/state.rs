//! Shared application state for the Axum server.

use std::path::PathBuf;
use std::sync::Arc;

use labelman_core::gateway::Fixture;
use labelman_core::MemoryGateway;

#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<MemoryGateway>,
    /// Required bearer token; `None` leaves the API open.
    pub token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(backend: Arc<MemoryGateway>, token: Option<String>) -> Self {
        Self {
            backend,
            token: token.map(Arc::from),
        }
    }

    pub fn from_fixture(fixture: Fixture, token: Option<String>) -> Self {
        Self::new(Arc::new(MemoryGateway::new(fixture)), token)
    }
}

/// Configuration for the development server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// YAML fixture with datasets and cluster results; empty when unset.
    pub fixture: Option<PathBuf>,
    pub token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            fixture: None,
            token: None,
        }
    }
}
