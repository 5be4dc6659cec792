//! Per-tenant API credentials, remembered for lazy reconnects.

use crate::platform::Credentials;
use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Persisted credential record
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialRecord {
    tenant_id: String,
    api_id: i32,
    api_hash: String,
    updated_at: String,
}

/// Persisted credential file
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    tenants: Vec<CredentialRecord>,
}

/// Credentials supplied by each tenant, keyed by tenant ID
pub struct CredentialStore {
    entries: DashMap<String, Credentials>,
    /// None keeps the store in memory only
    path: Option<PathBuf>,
}

impl CredentialStore {
    /// Create a store backed by `path`, loading anything already saved there
    pub fn new(path: Option<PathBuf>) -> Arc<Self> {
        let store = Arc::new(Self {
            entries: DashMap::new(),
            path,
        });

        if let Err(e) = store.load() {
            tracing::warn!("failed to load tenant credentials: {e}");
        }

        store
    }

    pub fn get(&self, tenant_id: &str) -> Option<Credentials> {
        self.entries.get(tenant_id).map(|r| r.clone())
    }

    /// Remember credentials for a tenant; no-op when unchanged
    pub fn remember(&self, tenant_id: &str, credentials: &Credentials) {
        let unchanged = self.entries.get(tenant_id).is_some_and(|c| {
            c.api_id == credentials.api_id && c.api_hash() == credentials.api_hash()
        });
        if unchanged {
            return;
        }

        self.entries
            .insert(tenant_id.to_string(), credentials.clone());
        if let Err(e) = self.save() {
            tracing::warn!(tenant = tenant_id, "failed to save tenant credentials: {e}");
        }
    }

    pub fn forget(&self, tenant_id: &str) -> bool {
        let removed = self.entries.remove(tenant_id).is_some();
        if removed {
            if let Err(e) = self.save() {
                tracing::warn!(tenant = tenant_id, "failed to save tenant credentials: {e}");
            }
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let file: CredentialFile = toml::from_str(&content)?;

        for record in file.tenants {
            self.entries.insert(
                record.tenant_id,
                Credentials::new(record.api_id, record.api_hash),
            );
        }

        Ok(())
    }

    fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let now = chrono::Utc::now().to_rfc3339();
        let mut tenants: Vec<CredentialRecord> = self
            .entries
            .iter()
            .map(|r| CredentialRecord {
                tenant_id: r.key().clone(),
                api_id: r.value().api_id,
                api_hash: r.value().api_hash().to_string(),
                updated_at: now.clone(),
            })
            .collect();
        tenants.sort_by(|a, b| a.tenant_id.cmp(&b.tenant_id));

        let content = toml::to_string_pretty(&CredentialFile { tenants })?;
        write_private(path, &content)?;

        Ok(())
    }
}

/// Write a file readable by the owner only; it holds API hashes.
fn write_private(path: &Path, content: &str) -> std::io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    // The mode above only applies when the file is created
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
    }
    file.write_all(content.as_bytes())
}
