//! Gateway module - HTTP server brokering per-tenant client sessions.
//! Used by the tgbroker-gateway binary.

pub mod client_mgr;
pub mod credentials;
pub mod routes;
pub mod server;
pub mod sessions;
pub mod tenant;
