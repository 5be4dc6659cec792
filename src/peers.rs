//! Peer resolution: external chat/channel IDs to addressable peers.

use crate::platform::{PeerId, PeerRef, PeerTarget, PlatformClient, PlatformResult};
use tracing::{debug, warn};

/// Resolves raw identifiers against one tenant's client
pub struct PeerResolver<'a> {
    client: &'a dyn PlatformClient,
}

impl<'a> PeerResolver<'a> {
    pub fn new(client: &'a dyn PlatformClient) -> Self {
        Self { client }
    }

    /// Single direct lookup, no cache refresh.
    pub async fn resolve_direct(&self, raw_id: &str) -> PlatformResult<PeerRef> {
        self.client.resolve_peer(&PeerId::parse(raw_id)).await
    }

    /// Resolve with one dialog-refresh retry.
    ///
    /// When both attempts fail the raw ID is passed through as
    /// [`PeerTarget::Unresolved`], so a batch can still try (and account for)
    /// the downstream call instead of aborting.
    pub async fn resolve(&self, raw_id: &str) -> PeerTarget {
        let id = PeerId::parse(raw_id);

        let first_error = match self.client.resolve_peer(&id).await {
            Ok(peer) => return PeerTarget::Resolved(peer),
            Err(e) => e,
        };
        debug!(peer = %id, "resolution failed, refreshing dialogs: {first_error}");

        let retry = match self.client.dialogs().await {
            Ok(_) => self.client.resolve_peer(&id).await,
            Err(e) => Err(e),
        };

        match retry {
            Ok(peer) => PeerTarget::Resolved(peer),
            Err(e) => {
                warn!(peer = %id, "could not resolve peer, passing raw id through: {e}");
                PeerTarget::Unresolved(id)
            }
        }
    }
}
