//! [`PlatformClient`] over the grammers MTProto client.

use super::peer_cache::PeerCache;
use super::*;
use dashmap::DashMap;
use grammers_client::types::{Chat, LoginToken, PackedChat};
use grammers_session::PackedType;
use grammers_client::{Client, Config, InitParams, InvocationError, SignInError};
use grammers_session::Session;
use grammers_tl_types as tl;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// Offset applied to channel ids in the marked id space
const CHANNEL_ID_OFFSET: i64 = 1_000_000_000_000;

impl From<InvocationError> for PlatformError {
    fn from(e: InvocationError) -> Self {
        match e {
            InvocationError::Rpc(rpc) => PlatformError::Rpc {
                code: rpc.code,
                name: rpc.name,
            },
            other => PlatformError::other(other),
        }
    }
}

/// Creates one [`GrammersClient`] per tenant session file
#[derive(Debug, Default)]
pub struct GrammersFactory;

#[async_trait]
impl ClientFactory for GrammersFactory {
    async fn create(
        &self,
        session_path: &Path,
        credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>> {
        Ok(Arc::new(GrammersClient::new(
            session_path.to_path_buf(),
            credentials.clone(),
        )))
    }
}

pub struct GrammersClient {
    session_path: PathBuf,
    credentials: Credentials,
    inner: RwLock<Option<Client>>,
    connected: AtomicBool,
    /// Peers filled by dialog iteration, saved next to the session file
    peers: PeerCache,
    /// Set once a cache miss has triggered a dialog pass
    warmed: AtomicBool,
    /// Pending logins keyed by the opaque hash handed to callers
    logins: DashMap<String, LoginToken>,
}

impl GrammersClient {
    pub fn new(session_path: PathBuf, credentials: Credentials) -> Self {
        let peers = PeerCache::new(Some(PeerCache::path_for(&session_path)));
        Self {
            session_path,
            credentials,
            inner: RwLock::new(None),
            connected: AtomicBool::new(false),
            peers,
            warmed: AtomicBool::new(false),
            logins: DashMap::new(),
        }
    }

    async fn client(&self) -> PlatformResult<Client> {
        self.inner
            .read()
            .await
            .clone()
            .ok_or(PlatformError::Disconnected)
    }

    fn save_session(&self, client: &Client) {
        if let Err(e) = client.session().save_to_file(&self.session_path) {
            warn!("failed to save session {}: {e}", self.session_path.display());
        }
    }

    /// Record a chat in the peer cache. The caller persists the cache.
    fn remember(&self, chat: &Chat) -> PackedChat {
        let packed = chat.pack();
        self.peers.insert(peer_ref(&packed), chat.username());
        packed
    }

    fn packed(&self, target: &PeerTarget) -> PlatformResult<PackedChat> {
        match target {
            PeerTarget::Resolved(peer) => Ok(unpack(peer)),
            PeerTarget::Unresolved(id) => self.cached(id).map(|peer| unpack(&peer)),
        }
    }

    fn cached(&self, id: &PeerId) -> PlatformResult<PeerRef> {
        self.peers
            .get(id)
            .ok_or_else(|| PlatformError::EntityNotFound(id.to_string()))
    }

    async fn input_channel(&self, target: &PeerTarget) -> PlatformResult<tl::enums::InputChannel> {
        let packed = self.packed(target)?;
        match packed.ty {
            PackedType::Megagroup | PackedType::Broadcast | PackedType::Gigagroup => {
                Ok(tl::types::InputChannel {
                    channel_id: packed.id,
                    access_hash: packed.access_hash.unwrap_or(0),
                }
                .into())
            }
            _ => Err(PlatformError::Rpc {
                code: 400,
                name: "CHANNEL_INVALID".to_string(),
            }),
        }
    }
}

fn marked_id(packed: &PackedChat) -> i64 {
    match packed.ty {
        PackedType::User | PackedType::Bot => packed.id,
        PackedType::Chat => -packed.id,
        PackedType::Megagroup | PackedType::Broadcast | PackedType::Gigagroup => {
            -CHANNEL_ID_OFFSET - packed.id
        }
    }
}

fn peer_ref(packed: &PackedChat) -> PeerRef {
    let kind = match packed.ty {
        PackedType::User | PackedType::Bot => PeerKind::User,
        PackedType::Chat => PeerKind::Chat,
        PackedType::Megagroup | PackedType::Broadcast | PackedType::Gigagroup => PeerKind::Channel,
    };
    PeerRef {
        kind,
        id: marked_id(packed),
        access_hash: packed.access_hash,
    }
}

fn unpack(peer: &PeerRef) -> PackedChat {
    let (ty, id) = match peer.kind {
        PeerKind::User => (PackedType::User, peer.id),
        PeerKind::Chat => (PackedType::Chat, -peer.id),
        PeerKind::Channel => (PackedType::Megagroup, -peer.id - CHANNEL_ID_OFFSET),
    };
    PackedChat {
        ty,
        id,
        access_hash: peer.access_hash,
    }
}

fn admin_rights(rights: &Option<tl::enums::ChatAdminRights>) -> Option<AdminRights> {
    rights.as_ref().map(|tl::enums::ChatAdminRights::Rights(r)| AdminRights {
        post_messages: r.post_messages,
        edit_messages: r.edit_messages,
        delete_messages: r.delete_messages,
    })
}

fn channel_entity(id: i64, channel: &tl::types::Channel) -> ChannelEntity {
    ChannelEntity {
        id,
        title: channel.title.clone(),
        username: channel.username.clone(),
        access_hash: channel.access_hash,
        broadcast: channel.broadcast,
        megagroup: channel.megagroup,
        creator: channel.creator,
        left: channel.left,
        admin_rights: admin_rights(&channel.admin_rights),
    }
}

fn basic_group(id: i64, title: &str, left: bool, kicked: bool) -> Entity {
    Entity::Group(GroupEntity {
        id,
        title: title.to_string(),
        left,
        kicked,
    })
}

fn entity(chat: &Chat, packed: &PackedChat) -> Entity {
    let id = marked_id(packed);
    match chat {
        Chat::User(user) => Entity::User(UserEntity {
            id,
            username: user.username().map(str::to_string),
            access_hash: packed.access_hash,
            bot: user.is_bot(),
        }),
        Chat::Group(group) => match &group.raw {
            tl::enums::Chat::Channel(channel) => Entity::Channel(channel_entity(id, channel)),
            // A deactivated group was migrated to a supergroup; membership is unchanged
            tl::enums::Chat::Chat(basic) => basic_group(id, &basic.title, basic.left, false),
            tl::enums::Chat::Forbidden(forbidden) => basic_group(id, &forbidden.title, false, true),
            other => basic_group(
                id,
                chat.name(),
                matches!(other, tl::enums::Chat::ChannelForbidden(_)),
                false,
            ),
        },
        Chat::Channel(channel) => Entity::Channel(channel_entity(id, &channel.raw)),
    }
}

fn account(user: &grammers_client::types::User) -> Account {
    Account {
        id: user.id(),
        username: user.username().map(str::to_string),
        first_name: Some(user.first_name().to_string()).filter(|s| !s.is_empty()),
        last_name: user.last_name().map(str::to_string),
    }
}

fn reaction_label(reaction: &tl::enums::Reaction) -> String {
    match reaction {
        tl::enums::Reaction::Emoji(emoji) => emoji.emoticon.clone(),
        tl::enums::Reaction::CustomEmoji(custom) => custom.document_id.to_string(),
        _ => String::new(),
    }
}

fn poll(media: &tl::enums::MessageMedia) -> Option<Poll> {
    match media {
        tl::enums::MessageMedia::Poll(poll) => {
            let tl::enums::PollResults::Results(results) = &poll.results;
            Some(Poll {
                results: Some(PollResults {
                    total_voters: results.total_voters,
                }),
            })
        }
        _ => None,
    }
}

fn raw_message(raw: &tl::types::Message) -> RawMessage {
    let reactions = match &raw.reactions {
        Some(tl::enums::MessageReactions::Reactions(r)) => r
            .results
            .iter()
            .map(|tl::enums::ReactionCount::Count(c)| ReactionCount {
                reaction: reaction_label(&c.reaction),
                count: c.count,
            })
            .collect(),
        None => Vec::new(),
    };
    let poll = raw.media.as_ref().and_then(poll);
    let media = raw.media.as_ref().map(|_| match &poll {
        Some(poll) => MessageMedia::Poll(poll.clone()),
        None => MessageMedia::Other,
    });

    RawMessage {
        id: raw.id,
        views: raw.views,
        forwards: raw.forwards,
        replies: raw
            .replies
            .as_ref()
            .map(|tl::enums::MessageReplies::Replies(r)| r.replies),
        reactions,
        poll,
        media,
    }
}

fn graph(graph: tl::enums::StatsGraph) -> StatsGraph {
    match graph {
        tl::enums::StatsGraph::Graph(g) => {
            let tl::enums::DataJson::Json(data) = g.json;
            StatsGraph::Data { json: data.data }
        }
        tl::enums::StatsGraph::Error(e) => StatsGraph::Error { error: e.error },
        tl::enums::StatsGraph::Async(a) => StatsGraph::Async { token: a.token },
    }
}

fn period(range: tl::enums::StatsDateRangeDays) -> StatsPeriod {
    let tl::enums::StatsDateRangeDays::Days(days) = range;
    StatsPeriod {
        min_date: days.min_date as i64,
        max_date: days.max_date as i64,
    }
}

fn abs_value(value: tl::enums::StatsAbsValueAndPrev) -> AbsValueAndPrev {
    let tl::enums::StatsAbsValueAndPrev::Prev(value) = value;
    AbsValueAndPrev {
        current: value.current,
        previous: value.previous,
    }
}

#[async_trait]
impl PlatformClient for GrammersClient {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> PlatformResult<()> {
        let session = Session::load_file_or_create(&self.session_path)
            .map_err(|e| PlatformError::other(format!("cannot load session: {e}")))?;

        let client = Client::connect(Config {
            session,
            api_id: self.credentials.api_id,
            api_hash: self.credentials.api_hash().to_string(),
            params: InitParams::default(),
        })
        .await
        .map_err(PlatformError::other)?;

        self.save_session(&client);
        *self.inner.write().await = Some(client);
        self.connected.store(true, Ordering::SeqCst);
        debug!("connected with session {}", self.session_path.display());
        Ok(())
    }

    async fn disconnect(&self) -> PlatformResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        if let Some(client) = self.inner.write().await.take() {
            self.save_session(&client);
        }
        Ok(())
    }

    async fn is_authorized(&self) -> PlatformResult<bool> {
        Ok(self.client().await?.is_authorized().await?)
    }

    async fn send_code(&self, phone: &str) -> PlatformResult<String> {
        let client = self.client().await?;
        let token = client
            .request_login_code(phone)
            .await
            .map_err(PlatformError::other)?;

        let hash = uuid::Uuid::new_v4().to_string();
        self.logins.insert(hash.clone(), token);
        Ok(hash)
    }

    async fn sign_in(
        &self,
        _phone: &str,
        code: &str,
        phone_code_hash: &str,
    ) -> PlatformResult<Account> {
        let client = self.client().await?;
        let (_, token) = self.logins.remove(phone_code_hash).ok_or_else(|| PlatformError::Rpc {
            code: 400,
            name: "PHONE_CODE_EXPIRED".to_string(),
        })?;

        match client.sign_in(&token, code).await {
            Ok(user) => {
                self.save_session(&client);
                Ok(account(&user))
            }
            Err(SignInError::PasswordRequired(_)) => Err(PlatformError::Rpc {
                code: 401,
                name: "SESSION_PASSWORD_NEEDED".to_string(),
            }),
            Err(SignInError::InvalidCode) => {
                self.logins.insert(phone_code_hash.to_string(), token);
                Err(PlatformError::Rpc {
                    code: 400,
                    name: "PHONE_CODE_INVALID".to_string(),
                })
            }
            Err(SignInError::Other(e)) => Err(e.into()),
            Err(e) => Err(PlatformError::other(e)),
        }
    }

    async fn get_me(&self) -> PlatformResult<Option<Account>> {
        let client = self.client().await?;
        if !client.is_authorized().await? {
            return Ok(None);
        }
        Ok(Some(account(&client.get_me().await?)))
    }

    async fn log_out(&self) -> PlatformResult<()> {
        let client = self.client().await?;
        client.sign_out().await?;
        self.peers.clear();
        self.logins.clear();
        Ok(())
    }

    async fn dialogs(&self) -> PlatformResult<Vec<RawDialog>> {
        let client = self.client().await?;
        let mut iter = client.iter_dialogs();
        let mut dialogs = Vec::new();

        while let Some(dialog) = iter.next().await? {
            let chat = dialog.chat();
            let packed = self.remember(chat);
            dialogs.push(RawDialog {
                id: marked_id(&packed),
                name: chat.name().to_string(),
                entity: entity(chat, &packed),
            });
        }

        self.peers.persist();
        self.warmed.store(true, Ordering::SeqCst);
        debug!("fetched {} dialogs, {} peers cached", dialogs.len(), self.peers.len());
        Ok(dialogs)
    }

    async fn resolve_peer(&self, id: &PeerId) -> PlatformResult<PeerRef> {
        if let Ok(peer) = self.cached(id) {
            return Ok(peer);
        }

        let PeerId::Username(name) = id else {
            // Numeric ids need an access hash, which only a dialog pass provides
            if !self.warmed.swap(true, Ordering::SeqCst) {
                self.dialogs().await?;
            }
            return self.cached(id);
        };

        let client = self.client().await?;
        match client.resolve_username(name).await? {
            Some(chat) => {
                let peer = peer_ref(&self.remember(&chat));
                self.peers.persist();
                Ok(peer)
            }
            None => Err(PlatformError::EntityNotFound(id.to_string())),
        }
    }

    async fn get_message(
        &self,
        peer: &PeerTarget,
        message_id: i32,
    ) -> PlatformResult<Option<RawMessage>> {
        let client = self.client().await?;
        let packed = self.packed(peer)?;
        let mut messages = client.get_messages_by_id(packed, &[message_id]).await?;

        Ok(messages
            .pop()
            .flatten()
            .map(|message| raw_message(&message.raw)))
    }

    async fn delete_messages(&self, peer: &PeerTarget, message_ids: &[i32]) -> PlatformResult<usize> {
        let client = self.client().await?;
        let packed = self.packed(peer)?;
        Ok(client.delete_messages(packed, message_ids).await?)
    }

    async fn broadcast_stats(&self, peer: &PeerTarget) -> PlatformResult<BroadcastStats> {
        let client = self.client().await?;
        let channel = self.input_channel(peer).await?;

        let tl::enums::stats::BroadcastStats::Stats(stats) = client
            .invoke(&tl::functions::stats::GetBroadcastStats {
                dark: false,
                channel,
            })
            .await?;

        Ok(BroadcastStats {
            period: period(stats.period),
            followers: abs_value(stats.followers),
            growth_graph: graph(stats.growth_graph),
            followers_graph: graph(stats.followers_graph),
        })
    }

    async fn megagroup_stats(&self, peer: &PeerTarget) -> PlatformResult<MegagroupStats> {
        let client = self.client().await?;
        let channel = self.input_channel(peer).await?;

        let tl::enums::stats::MegagroupStats::Stats(stats) = client
            .invoke(&tl::functions::stats::GetMegagroupStats {
                dark: false,
                channel,
            })
            .await?;

        Ok(MegagroupStats {
            period: period(stats.period),
            members: abs_value(stats.members),
            growth_graph: graph(stats.growth_graph),
            members_graph: graph(stats.members_graph),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marked_ids_round_trip() {
        for (ty, id, marked) in [
            (PackedType::User, 42, 42),
            (PackedType::Chat, 42, -42),
            (PackedType::Broadcast, 42, -1_000_000_000_042),
        ] {
            let packed = PackedChat {
                ty,
                id,
                access_hash: Some(7),
            };
            let peer = peer_ref(&packed);
            assert_eq!(peer.id, marked);
            assert_eq!(unpack(&peer).id, id);
        }
    }

    #[tokio::test]
    async fn test_peers_resolve_after_restart_without_dialog_pass() {
        let dir = tempfile::tempdir().unwrap();
        let session_path = dir.path().join("session_t1");
        let channel = peer_ref(&PackedChat {
            ty: PackedType::Broadcast,
            id: 123,
            access_hash: Some(77),
        });

        let cache = PeerCache::new(Some(PeerCache::path_for(&session_path)));
        cache.insert(channel.clone(), Some("news"));
        cache.persist();

        // Fresh handle, never connected: hits come from the saved cache
        let client = GrammersClient::new(session_path, Credentials::new(1, "h"));
        let peer = client.resolve_peer(&PeerId::parse("-1000000000123")).await.unwrap();
        assert_eq!(peer, channel);
        assert_eq!(client.resolve_peer(&PeerId::parse("@News")).await.unwrap(), channel);

        let target = client.packed(&PeerTarget::Resolved(peer)).unwrap();
        assert_eq!(target.id, 123);
        assert_eq!(target.access_hash, Some(77));
    }

    #[test]
    fn test_migrated_basic_group_is_kept() {
        let dialogs = vec![
            RawDialog {
                id: -42,
                name: "Migrated".to_string(),
                entity: basic_group(-42, "Migrated", false, false),
            },
            RawDialog {
                id: -43,
                name: "Removed".to_string(),
                entity: basic_group(-43, "Removed", false, true),
            },
        ];

        let records = crate::dialogs::classify(&dialogs);

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].external_id, "-42");
    }
}
