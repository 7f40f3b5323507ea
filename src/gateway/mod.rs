//! Example HTTP gateway guarded by signed-request authentication.

pub mod handlers;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::api_auth::{AuthenticationGate, signed_request_middleware};
use crate::config::GatewayConfig;

/// Router with every route behind the signed-request middleware.
pub fn build_router(gate: Arc<AuthenticationGate>) -> Router {
    Router::new()
        .route(
            "/example",
            post(handlers::example_post).get(handlers::example_get),
        )
        .route("/health", get(handlers::health_check))
        .layer(from_fn_with_state(gate, signed_request_middleware))
}

/// Start HTTP Gateway server
pub async fn run_server(config: &GatewayConfig, gate: Arc<AuthenticationGate>) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        tracing::error!(
            "Failed to bind to {}: {} (port {} may already be in use)",
            addr,
            e,
            config.port
        );
        e
    })?;

    tracing::info!("Gateway listening on http://{}", addr);
    tracing::info!(
        "Signed endpoint: POST /example (headers {}, {})",
        gate.signature_header(),
        gate.identifier_header()
    );

    axum::serve(listener, build_router(gate)).await?;
    Ok(())
}
