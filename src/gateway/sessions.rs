//! Session pool - tracks the live client handle of every tenant.

use crate::platform::PlatformClient;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// A tenant's registered client handle
#[derive(Clone)]
pub struct TenantSession {
    pub tenant_id: String,
    pub client: Arc<dyn PlatformClient>,
    pub connected_at: DateTime<Utc>,
}

impl TenantSession {
    pub fn is_connected(&self) -> bool {
        self.client.is_connected()
    }
}

/// Process-wide mapping of tenant ID to client handle.
///
/// The map itself is never exposed; callers go through `get`/`insert`/`remove`.
/// First-time creation is serialised per tenant through `creation_lock`.
#[derive(Default)]
pub struct SessionPool {
    /// Tenant ID -> registered session
    sessions: DashMap<String, TenantSession>,
    /// Tenant ID -> creation lock
    creating: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionPool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Get the registered session for a tenant, connected or not
    pub fn get(&self, tenant_id: &str) -> Option<TenantSession> {
        self.sessions.get(tenant_id).map(|r| r.clone())
    }

    /// Get the tenant's handle only if it is still connected
    pub fn get_connected(&self, tenant_id: &str) -> Option<Arc<dyn PlatformClient>> {
        self.sessions
            .get(tenant_id)
            .filter(|s| s.is_connected())
            .map(|s| s.client.clone())
    }

    /// Register a handle, replacing any stale entry for the tenant
    pub fn insert(&self, tenant_id: &str, client: Arc<dyn PlatformClient>) -> TenantSession {
        let session = TenantSession {
            tenant_id: tenant_id.to_string(),
            client,
            connected_at: Utc::now(),
        };
        self.sessions.insert(tenant_id.to_string(), session.clone());
        session
    }

    /// Remove a tenant's session. The creation lock stays, so a creation
    /// already waiting on it is still serialized with later callers.
    pub fn remove(&self, tenant_id: &str) -> Option<TenantSession> {
        self.sessions.remove(tenant_id).map(|(_, s)| s)
    }

    /// Take every session out of the pool
    pub fn drain(&self) -> Vec<TenantSession> {
        let keys: Vec<String> = self.sessions.iter().map(|r| r.key().clone()).collect();
        keys.into_iter()
            .filter_map(|k| self.sessions.remove(&k).map(|(_, s)| s))
            .collect()
    }

    /// Hold the per-tenant creation lock
    pub async fn creation_lock(&self, tenant_id: &str) -> OwnedMutexGuard<()> {
        let lock = self
            .creating
            .entry(tenant_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Count of sessions whose handle reports connected
    pub fn active_count(&self) -> usize {
        self.sessions.iter().filter(|r| r.is_connected()).count()
    }

    /// Count of registered sessions
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}
