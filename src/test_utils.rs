use crate::platform::{
    Account, BroadcastStats, ClientFactory, Credentials, Entity, MegagroupStats, PeerId, PeerKind,
    PeerRef, PeerTarget, PlatformClient, PlatformError, PlatformResult, RawDialog, RawMessage,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockState {
    connected: bool,
    authorized: bool,
    account: Option<Account>,
    dialogs: Vec<RawDialog>,
    peers: HashMap<PeerId, PeerRef>,
    peers_after_refresh: HashMap<PeerId, PeerRef>,
    messages: HashMap<(i64, i32), RawMessage>,
    failing_messages: HashSet<i32>,
    delete_failures: HashMap<i64, String>,
    broadcast_stats: Option<BroadcastStats>,
    megagroup_stats: Option<MegagroupStats>,
    fail_disconnect: bool,
    fail_log_out: bool,
    connects: usize,
    disconnects: usize,
    dialog_fetches: usize,
    logged_out: bool,
    deleted: Vec<(PeerTarget, Vec<i32>)>,
}

/// Scriptable in-memory platform client.
pub struct MockPlatform {
    state: Mutex<MockState>,
}

impl Default for MockPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().expect("mock state lock")
    }

    pub fn peer(kind: PeerKind, id: i64) -> PeerRef {
        PeerRef {
            kind,
            id,
            access_hash: Some(id * 7),
        }
    }

    pub fn authorized(self, account: Account) -> Self {
        {
            let mut s = self.state();
            s.authorized = true;
            s.account = Some(account);
        }
        self
    }

    pub fn connected(self) -> Self {
        self.state().connected = true;
        self
    }

    pub fn with_dialog(self, id: i64, name: &str, entity: Entity) -> Self {
        self.state().dialogs.push(RawDialog {
            id,
            name: name.to_string(),
            entity,
        });
        self
    }

    /// Peer resolvable straight away.
    pub fn with_peer(self, raw: &str, peer: PeerRef) -> Self {
        self.state().peers.insert(PeerId::parse(raw), peer);
        self
    }

    /// Peer resolvable only once the dialog list has been fetched.
    pub fn with_peer_after_refresh(self, raw: &str, peer: PeerRef) -> Self {
        self.state()
            .peers_after_refresh
            .insert(PeerId::parse(raw), peer);
        self
    }

    pub fn with_message(self, peer_id: i64, message: RawMessage) -> Self {
        self.state().messages.insert((peer_id, message.id), message);
        self
    }

    pub fn failing_message(self, message_id: i32) -> Self {
        self.state().failing_messages.insert(message_id);
        self
    }

    pub fn failing_delete(self, peer_id: i64, error: &str) -> Self {
        self.state()
            .delete_failures
            .insert(peer_id, error.to_string());
        self
    }

    pub fn with_broadcast_stats(self, stats: BroadcastStats) -> Self {
        self.state().broadcast_stats = Some(stats);
        self
    }

    pub fn with_megagroup_stats(self, stats: MegagroupStats) -> Self {
        self.state().megagroup_stats = Some(stats);
        self
    }

    pub fn failing_disconnect(self) -> Self {
        self.state().fail_disconnect = true;
        self
    }

    pub fn failing_log_out(self) -> Self {
        self.state().fail_log_out = true;
        self
    }

    pub fn drop_connection(&self) {
        self.state().connected = false;
    }

    pub fn connects(&self) -> usize {
        self.state().connects
    }

    pub fn disconnects(&self) -> usize {
        self.state().disconnects
    }

    pub fn dialog_fetches(&self) -> usize {
        self.state().dialog_fetches
    }

    pub fn logged_out(&self) -> bool {
        self.state().logged_out
    }

    pub fn deleted(&self) -> Vec<(PeerTarget, Vec<i32>)> {
        self.state().deleted.clone()
    }

    fn target_id(target: &PeerTarget) -> PlatformResult<i64> {
        match target {
            PeerTarget::Resolved(peer) => Ok(peer.id),
            PeerTarget::Unresolved(raw) => Err(PlatformError::EntityNotFound(raw.to_string())),
        }
    }
}

#[async_trait]
impl PlatformClient for MockPlatform {
    fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn connect(&self) -> PlatformResult<()> {
        // Yield so concurrent callers get a chance to interleave.
        tokio::time::sleep(Duration::from_millis(5)).await;
        let mut s = self.state();
        s.connects += 1;
        s.connected = true;
        Ok(())
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        let mut s = self.state();
        s.disconnects += 1;
        s.connected = false;
        if s.fail_disconnect {
            return Err(PlatformError::other("socket already closed"));
        }
        Ok(())
    }

    async fn is_authorized(&self) -> PlatformResult<bool> {
        Ok(self.state().authorized)
    }

    async fn send_code(&self, phone: &str) -> PlatformResult<String> {
        if phone.starts_with('+') {
            Ok(format!("hash-{}", phone.trim_start_matches('+')))
        } else {
            Err(PlatformError::Rpc {
                code: 400,
                name: "PHONE_NUMBER_INVALID".to_string(),
            })
        }
    }

    async fn sign_in(
        &self,
        phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> PlatformResult<Account> {
        let expected = format!("hash-{}", phone.trim_start_matches('+'));
        if phone_code_hash != expected || code != "12345" {
            return Err(PlatformError::Rpc {
                code: 400,
                name: "PHONE_CODE_INVALID".to_string(),
            });
        }
        let account = Account {
            id: 777,
            username: Some("tenant".to_string()),
            first_name: Some("Ten".to_string()),
            last_name: None,
        };
        let mut s = self.state();
        s.authorized = true;
        s.account = Some(account.clone());
        Ok(account)
    }

    async fn get_me(&self) -> PlatformResult<Option<Account>> {
        Ok(self.state().account.clone())
    }

    async fn log_out(&self) -> PlatformResult<()> {
        let mut s = self.state();
        if s.fail_log_out {
            return Err(PlatformError::other("AUTH_KEY_UNREGISTERED"));
        }
        s.logged_out = true;
        s.authorized = false;
        s.account = None;
        Ok(())
    }

    async fn dialogs(&self) -> PlatformResult<Vec<RawDialog>> {
        let mut s = self.state();
        s.dialog_fetches += 1;
        let learned: Vec<_> = s.peers_after_refresh.drain().collect();
        s.peers.extend(learned);
        Ok(s.dialogs.clone())
    }

    async fn resolve_peer(&self, id: &PeerId) -> PlatformResult<PeerRef> {
        self.state()
            .peers
            .get(id)
            .cloned()
            .ok_or_else(|| PlatformError::EntityNotFound(id.to_string()))
    }

    async fn get_message(
        &self,
        peer: &PeerTarget,
        message_id: i32,
    ) -> PlatformResult<Option<RawMessage>> {
        let peer_id = Self::target_id(peer)?;
        let s = self.state();
        if s.failing_messages.contains(&message_id) {
            return Err(PlatformError::Rpc {
                code: 400,
                name: "MESSAGE_ID_INVALID".to_string(),
            });
        }
        Ok(s.messages.get(&(peer_id, message_id)).cloned())
    }

    async fn delete_messages(
        &self,
        peer: &PeerTarget,
        message_ids: &[i32],
    ) -> PlatformResult<usize> {
        let peer_id = Self::target_id(peer)?;
        let mut s = self.state();
        if let Some(err) = s.delete_failures.get(&peer_id) {
            return Err(PlatformError::other(err));
        }
        s.deleted.push((peer.clone(), message_ids.to_vec()));
        Ok(message_ids.len())
    }

    async fn broadcast_stats(&self, peer: &PeerTarget) -> PlatformResult<BroadcastStats> {
        Self::target_id(peer)?;
        self.state()
            .broadcast_stats
            .clone()
            .ok_or_else(|| PlatformError::Rpc {
                code: 400,
                name: "BROADCAST_REQUIRED".to_string(),
            })
    }

    async fn megagroup_stats(&self, peer: &PeerTarget) -> PlatformResult<MegagroupStats> {
        Self::target_id(peer)?;
        self.state()
            .megagroup_stats
            .clone()
            .ok_or_else(|| PlatformError::Rpc {
                code: 400,
                name: "CHAT_ADMIN_REQUIRED".to_string(),
            })
    }
}

type Template = Box<dyn Fn() -> MockPlatform + Send + Sync>;

/// Factory handing out fresh [`MockPlatform`]s built from a template.
pub struct MockFactory {
    template: Template,
    created: Mutex<Vec<(PathBuf, Arc<MockPlatform>)>>,
    fail: Option<String>,
}

impl MockFactory {
    pub fn new(template: impl Fn() -> MockPlatform + Send + Sync + 'static) -> Arc<Self> {
        Arc::new(Self {
            template: Box::new(template),
            created: Mutex::new(Vec::new()),
            fail: None,
        })
    }

    pub fn failing(error: &str) -> Arc<Self> {
        Arc::new(Self {
            template: Box::new(MockPlatform::new),
            created: Mutex::new(Vec::new()),
            fail: Some(error.to_string()),
        })
    }

    pub fn created(&self) -> Vec<Arc<MockPlatform>> {
        self.created
            .lock()
            .expect("created lock")
            .iter()
            .map(|(_, c)| c.clone())
            .collect()
    }

    pub fn session_paths(&self) -> Vec<PathBuf> {
        self.created
            .lock()
            .expect("created lock")
            .iter()
            .map(|(p, _)| p.clone())
            .collect()
    }

    pub fn last(&self) -> Arc<MockPlatform> {
        self.created()
            .pop()
            .expect("factory has created a client")
    }
}

#[async_trait]
impl ClientFactory for MockFactory {
    async fn create(
        &self,
        session_path: &Path,
        _credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>> {
        if let Some(err) = &self.fail {
            return Err(PlatformError::other(err));
        }
        let client = Arc::new((self.template)());
        self.created
            .lock()
            .expect("created lock")
            .push((session_path.to_path_buf(), client.clone()));
        Ok(client)
    }
}

pub fn account() -> Account {
    Account {
        id: 42,
        username: Some("alice".to_string()),
        first_name: Some("Alice".to_string()),
        last_name: Some("Liddell".to_string()),
    }
}
