//! Peers learned by a client, persisted next to its session file.

use super::{PeerId, PeerRef};
use anyhow::Result;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PeerRecord {
    #[serde(flatten)]
    peer: PeerRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    username: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct PeerFile {
    #[serde(default)]
    peers: Vec<PeerRecord>,
}

/// Peers by marked id and by lowercase username
pub struct PeerCache {
    by_id: DashMap<i64, PeerRef>,
    by_username: DashMap<String, i64>,
    /// None keeps the cache in memory only
    path: Option<PathBuf>,
}

impl PeerCache {
    /// Cache file belonging to a session file: `<session>.peers.json`
    pub fn path_for(session_path: &Path) -> PathBuf {
        let mut path = OsString::from(session_path.as_os_str());
        path.push(".peers.json");
        PathBuf::from(path)
    }

    /// Create a cache backed by `path`, loading anything already saved there
    pub fn new(path: Option<PathBuf>) -> Self {
        let cache = Self {
            by_id: DashMap::new(),
            by_username: DashMap::new(),
            path,
        };

        if let Err(e) = cache.load() {
            warn!("failed to load peer cache: {e}");
        }

        cache
    }

    pub fn get(&self, id: &PeerId) -> Option<PeerRef> {
        let marked = match id {
            PeerId::Numeric(id) => *id,
            PeerId::Username(name) => *self.by_username.get(&name.to_lowercase())?,
        };
        self.by_id.get(&marked).map(|r| r.clone())
    }

    /// Record a peer in memory. Call [`persist`](Self::persist) afterwards.
    pub fn insert(&self, peer: PeerRef, username: Option<&str>) {
        if let Some(username) = username.filter(|u| !u.is_empty()) {
            self.by_username.insert(username.to_lowercase(), peer.id);
        }
        self.by_id.insert(peer.id, peer);
    }

    pub fn clear(&self) {
        self.by_id.clear();
        self.by_username.clear();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Save to disk, logging failures
    pub fn persist(&self) {
        if let Err(e) = self.save() {
            warn!("failed to save peer cache: {e}");
        }
    }

    fn load(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(path)?;
        let file: PeerFile = serde_json::from_str(&content)?;

        for record in file.peers {
            self.insert(record.peer, record.username.as_deref());
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

        let mut usernames: Vec<(i64, String)> = self
            .by_username
            .iter()
            .map(|r| (*r.value(), r.key().clone()))
            .collect();
        usernames.sort();

        let mut peers: Vec<PeerRecord> = self
            .by_id
            .iter()
            .map(|r| PeerRecord {
                peer: r.value().clone(),
                username: usernames
                    .iter()
                    .find(|(id, _)| id == r.key())
                    .map(|(_, name)| name.clone()),
            })
            .collect();
        peers.sort_by_key(|record| record.peer.id);

        std::fs::write(path, serde_json::to_string_pretty(&PeerFile { peers })?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::PeerKind;
    use tempfile::tempdir;

    fn channel(id: i64) -> PeerRef {
        PeerRef {
            kind: PeerKind::Channel,
            id,
            access_hash: Some(99),
        }
    }

    #[test]
    fn test_path_for_session() {
        let path = PeerCache::path_for(Path::new("/data/session_alice"));
        assert_eq!(path, PathBuf::from("/data/session_alice.peers.json"));
    }

    #[test]
    fn test_survives_reload() {
        let dir = tempdir().unwrap();
        let path = PeerCache::path_for(&dir.path().join("session_t1"));

        let cache = PeerCache::new(Some(path.clone()));
        cache.insert(channel(-1_000_000_000_123), Some("News"));
        cache.insert(
            PeerRef {
                kind: PeerKind::User,
                id: 5,
                access_hash: Some(7),
            },
            None,
        );
        cache.persist();

        let reloaded = PeerCache::new(Some(path));
        assert_eq!(reloaded.len(), 2);
        assert_eq!(
            reloaded.get(&PeerId::parse("-1000000000123")),
            Some(channel(-1_000_000_000_123))
        );
        assert_eq!(
            reloaded.get(&PeerId::parse("@news")),
            Some(channel(-1_000_000_000_123))
        );
        assert_eq!(reloaded.get(&PeerId::parse("5")).unwrap().kind, PeerKind::User);
        assert!(reloaded.get(&PeerId::parse("6")).is_none());
    }

    #[test]
    fn test_clear_is_persisted() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_t1.peers.json");

        let cache = PeerCache::new(Some(path.clone()));
        cache.insert(channel(-1_000_000_000_001), Some("chan"));
        cache.persist();
        cache.clear();

        let reloaded = PeerCache::new(Some(path));
        assert!(reloaded.is_empty());
        assert!(reloaded.get(&PeerId::parse("chan")).is_none());
    }

    #[test]
    fn test_corrupt_file_is_ignored() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("session_t1.peers.json");
        std::fs::write(&path, "{not json").unwrap();

        assert!(PeerCache::new(Some(path)).is_empty());
    }
}
