//! Gateway HTTP server using axum.

use super::client_mgr::ClientManager;
use super::routes;
use crate::config::GatewayConfig;
use crate::platform::ClientFactory;
use anyhow::Context;
use axum::http::HeaderValue;
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Shared state for the gateway
pub struct GatewayState {
    pub clients: Arc<ClientManager>,
}

impl GatewayState {
    pub fn new(clients: Arc<ClientManager>) -> Arc<Self> {
        Arc::new(Self { clients })
    }
}

/// CORS for the configured frontend and backend origins. With no origins
/// configured, no cross-origin request is allowed.
pub fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin: {origin}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

/// Build the application router
pub fn app(state: Arc<GatewayState>, origins: &[String]) -> Router {
    routes::routes()
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(origins))
        .with_state(state)
}

/// Run the gateway server until ctrl-c, then disconnect every session
pub async fn run(config: GatewayConfig, factory: Arc<dyn ClientFactory>) -> anyhow::Result<()> {
    let defaults = config
        .default_credentials()
        .map_err(anyhow::Error::msg)
        .context("invalid API_ID/API_HASH")?;
    if defaults.is_none() {
        warn!("API_ID/API_HASH not set; tenants must supply their own credentials");
    }

    let sessions_dir = config.resolve_sessions_dir();
    let clients = ClientManager::new(factory, sessions_dir.clone(), defaults);
    let state = GatewayState::new(clients.clone());
    let app = app(state, &config.allowed_origins());

    let listener = tokio::net::TcpListener::bind((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("cannot bind {}:{}", config.host, config.port))?;
    info!(
        "listening on {} (sessions in {})",
        listener.local_addr()?,
        sessions_dir.display()
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    clients.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}
