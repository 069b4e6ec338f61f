//! labelman-server: development API server over an in-memory fixture.
//!
//! Serves the same routes the client gateway calls, so the CLI and the
//! end-to-end tests can run without the production backend.

pub mod api;
pub mod state;

use std::net::SocketAddr;

use axum::{middleware, Router};
use labelman_core::gateway::Fixture;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub use state::{AppState, ServerConfig};

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = api::router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        api::require_token,
    ));

    Router::new()
        .nest("/api", api)
        .fallback(api::not_found)
        .with_state(state)
        .layer(cors)
}

/// Serve `state` on an already-bound listener until the task is dropped.
pub async fn serve_on(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let app = build_router(state);
    axum::serve(listener, app).await?;
    Ok(())
}

/// Start the server on the configured address.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let fixture = match &config.fixture {
        Some(path) => Fixture::from_yaml_file(path)?,
        None => Fixture::default(),
    };
    info!(
        datasets = fixture.datasets.len(),
        cluster_results = fixture.cluster_results.len(),
        "Fixture loaded"
    );
    let state = AppState::from_fixture(fixture, config.token.clone());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    info!("labelman API at http://{}/api", addr);
    serve_on(listener, state).await
}
