//! tgbroker - A multi-tenant gateway for user-account chat sessions
//!
//! This library provides the session lifecycle, dialog, analytics, deletion
//! and statistics logic behind the tgbroker-gateway HTTP server.

pub mod analytics;
pub mod config;
pub mod deletion;
pub mod dialogs;
pub mod error;
pub mod gateway;
pub mod items;
pub mod logging;
pub mod peers;
pub mod platform;
pub mod stats;

#[cfg(test)]
pub(crate) mod test_utils;

// Re-export for the binary
pub use config::GatewayConfig;
pub use error::GatewayError;
