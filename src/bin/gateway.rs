//! tgbroker-gateway: multi-tenant HTTP gateway.
//!
//! Each tenant, identified by the `x-user-id` header, gets its own logged-in
//! client session stored under the sessions directory.
//!
//! Usage:
//!   tgbroker-gateway [--host 0.0.0.0] [--port 8000] [--sessions-dir user_sessions]
//!
//! Environment variables:
//!   API_ID, API_HASH - Process-wide credentials (optional)
//!   FRONTEND_URL, BACKEND_URL - Origins allowed by CORS
//!   TGBROKER_HOST, TGBROKER_PORT, TGBROKER_SESSIONS_DIR, TGBROKER_LOG

use clap::Parser;
use std::sync::Arc;
use tgbroker::gateway::server::run;
use tgbroker::platform::grammers::GrammersFactory;
use tgbroker::{logging, GatewayConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env if present
    dotenvy::dotenv().ok();

    let config = GatewayConfig::parse();
    logging::init(&config.log_level);

    tracing::info!("tgbroker-gateway starting on {}:{}", config.host, config.port);

    run(config, Arc::new(GrammersFactory::default())).await
}
