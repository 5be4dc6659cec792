//! Client manager - creates, reuses and tears down per-tenant client handles.

use super::credentials::CredentialStore;
use super::sessions::SessionPool;
use crate::error::{GatewayError, Result};
use crate::platform::{ClientFactory, Credentials, PlatformClient};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const SERVICE_NAME: &str = "tgbroker";

/// Result of a logout request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutOutcome {
    LoggedOut,
    /// No session was registered for the tenant
    Ignored,
}

/// Account details shown in the status summary
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusUser {
    pub id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Service and session status summary
#[derive(Debug, Clone, Serialize)]
pub struct StatusSummary {
    pub status: &'static str,
    pub service: &'static str,
    pub configured: bool,
    pub active_sessions: usize,
    pub authorized: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<StatusUser>,
}

/// Lifecycle manager for tenant client handles
pub struct ClientManager {
    pool: Arc<SessionPool>,
    credentials: Arc<CredentialStore>,
    factory: Arc<dyn ClientFactory>,
    sessions_dir: PathBuf,
    /// Process-wide fallback credentials
    defaults: Option<Credentials>,
}

impl ClientManager {
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        sessions_dir: PathBuf,
        defaults: Option<Credentials>,
    ) -> Arc<Self> {
        let credentials = CredentialStore::new(Some(sessions_dir.join("credentials.toml")));
        Arc::new(Self {
            pool: SessionPool::new(),
            credentials,
            factory,
            sessions_dir,
            defaults,
        })
    }

    pub fn pool(&self) -> &Arc<SessionPool> {
        &self.pool
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Whether process-wide credentials are configured
    pub fn is_configured(&self) -> bool {
        self.defaults.is_some()
    }

    pub fn sessions_dir(&self) -> &Path {
        &self.sessions_dir
    }

    /// Session file location for a tenant
    pub fn session_path(&self, tenant_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("session_{tenant_id}"))
    }

    /// Return the tenant's connected handle, creating and connecting one if needed.
    ///
    /// Credentials are taken from the call, then from what the tenant supplied
    /// earlier, then from the process-wide defaults.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn PlatformClient>> {
        let client = match self.pool.get_connected(tenant_id) {
            Some(client) => client,
            None => self.connect_new(tenant_id, credentials.clone()).await?,
        };

        if let Some(credentials) = &credentials {
            self.credentials.remember(tenant_id, credentials);
        }

        Ok(client)
    }

    async fn connect_new(
        &self,
        tenant_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn PlatformClient>> {
        let _guard = self.pool.creation_lock(tenant_id).await;

        // Another request may have finished creating while we waited
        if let Some(client) = self.pool.get_connected(tenant_id) {
            return Ok(client);
        }

        let credentials = credentials
            .or_else(|| self.credentials.get(tenant_id))
            .or_else(|| self.defaults.clone())
            .ok_or_else(|| {
                GatewayError::Configuration(
                    "API credentials not configured for user".to_string(),
                )
            })?;

        tokio::fs::create_dir_all(&self.sessions_dir)
            .await
            .map_err(|e| {
                GatewayError::Internal(format!(
                    "cannot create session directory {}: {e}",
                    self.sessions_dir.display()
                ))
            })?;

        let session_path = self.session_path(tenant_id);
        let client = self.factory.create(&session_path, &credentials).await?;
        client.connect().await?;

        if self.pool.get(tenant_id).is_some() {
            debug!(tenant = tenant_id, "replacing stale client handle");
        }
        self.pool.insert(tenant_id, client.clone());

        info!(tenant = tenant_id, api_id = credentials.api_id, "client initialized");
        Ok(client)
    }

    /// Like [`acquire`](Self::acquire), but fails with an authorization error
    /// unless the session is logged in.
    pub async fn acquire_authorized(
        &self,
        tenant_id: &str,
        credentials: Option<Credentials>,
    ) -> Result<Arc<dyn PlatformClient>> {
        let client = self.acquire(tenant_id, credentials).await?;
        if !client.is_authorized().await? {
            return Err(GatewayError::unauthorized());
        }
        Ok(client)
    }

    /// Log the tenant out and drop its session
    pub async fn logout(&self, tenant_id: &str) -> Result<LogoutOutcome> {
        let Some(session) = self.pool.get(tenant_id) else {
            return Ok(LogoutOutcome::Ignored);
        };

        session.client.log_out().await?;
        self.pool.remove(tenant_id);
        self.credentials.forget(tenant_id);

        if let Err(e) = session.client.disconnect().await {
            debug!(tenant = tenant_id, "disconnect after logout failed: {e}");
        }

        info!(tenant = tenant_id, "logged out");
        Ok(LogoutOutcome::LoggedOut)
    }

    /// Service summary, with account details when the tenant is logged in
    pub async fn status(&self, tenant_id: Option<&str>) -> StatusSummary {
        let mut summary = StatusSummary {
            status: "running",
            service: SERVICE_NAME,
            configured: self.is_configured(),
            active_sessions: self.pool.active_count(),
            authorized: false,
            user: None,
        };

        let Some(client) = tenant_id.and_then(|t| self.pool.get_connected(t)) else {
            return summary;
        };

        match client.is_authorized().await {
            Ok(true) => {
                summary.authorized = true;
                match client.get_me().await {
                    Ok(Some(me)) => {
                        summary.user = Some(StatusUser {
                            id: me.id.to_string(),
                            username: me.username,
                            first_name: me.first_name,
                            last_name: me.last_name,
                        })
                    }
                    Ok(None) => {}
                    Err(e) => warn!(tenant = tenant_id, "status lookup failed: {e}"),
                }
            }
            Ok(false) => {}
            Err(e) => warn!(tenant = tenant_id, "status check failed: {e}"),
        }

        summary
    }

    /// Disconnect every registered handle. Failures are ignored.
    pub async fn shutdown(&self) {
        let sessions = self.pool.drain();
        let count = sessions.len();

        for session in sessions {
            if let Err(e) = session.client.disconnect().await {
                debug!(tenant = %session.tenant_id, "disconnect on shutdown failed: {e}");
            }
        }

        info!("disconnected {count} client sessions");
    }
}
