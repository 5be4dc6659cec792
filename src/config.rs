//! Gateway configuration from command-line flags and environment.

use crate::platform::Credentials;
use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "tgbroker-gateway")]
#[command(about = "Multi-tenant HTTP gateway for user-account chat sessions")]
pub struct GatewayConfig {
    /// Address to bind
    #[arg(long, env = "TGBROKER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "TGBROKER_PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory holding per-tenant session files
    #[arg(long, env = "TGBROKER_SESSIONS_DIR", default_value = "user_sessions")]
    pub sessions_dir: String,

    /// Process-wide API ID used when a tenant supplies none
    #[arg(long, env = "API_ID")]
    pub api_id: Option<String>,

    /// Process-wide API hash used when a tenant supplies none
    #[arg(long, env = "API_HASH", hide_env_values = true)]
    pub api_hash: Option<String>,

    /// Frontend origin allowed by CORS
    #[arg(long, env = "FRONTEND_URL")]
    pub frontend_url: Option<String>,

    /// Backend origin allowed by CORS
    #[arg(long, env = "BACKEND_URL")]
    pub backend_url: Option<String>,

    /// Log level when RUST_LOG is not set
    #[arg(long, env = "TGBROKER_LOG", default_value = "info")]
    pub log_level: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            sessions_dir: "user_sessions".to_string(),
            api_id: None,
            api_hash: None,
            frontend_url: None,
            backend_url: None,
            log_level: "info".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Process-wide credentials. `None` unless both parts are set.
    pub fn default_credentials(&self) -> Result<Option<Credentials>, String> {
        Credentials::parse(self.api_id.as_deref(), self.api_hash.as_deref()).transpose()
    }

    /// Sessions directory with a leading `~` expanded
    pub fn resolve_sessions_dir(&self) -> PathBuf {
        expand_home(&self.sessions_dir)
    }

    /// Origins allowed to make credentialed cross-origin requests
    pub fn allowed_origins(&self) -> Vec<String> {
        [&self.frontend_url, &self.backend_url]
            .into_iter()
            .flatten()
            .map(|url| url.trim().trim_end_matches('/').to_string())
            .filter(|url| !url.is_empty())
            .collect()
    }
}

fn expand_home(path: &str) -> PathBuf {
    let rest = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => rest.trim_start_matches('/'),
        _ => return PathBuf::from(path),
    };
    match dirs::home_dir() {
        Some(home) if rest.is_empty() => home,
        Some(home) => home.join(rest),
        None => PathBuf::from(path),
    }
}
