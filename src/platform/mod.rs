//! Port to the remote messaging platform's client library.
//!
//! The gateway never talks to the wire protocol directly. Everything it needs
//! from a tenant's connected client goes through [`PlatformClient`]. Response
//! shapes the gateway inspects are modelled here as explicit enums.
//!
//! Adapters:
//! - `grammers` (feature `grammers`): MTProto client via the grammers crates
//! - `test_utils::MockPlatform` (tests only)

#[cfg(feature = "grammers")]
pub mod grammers;
pub mod peer_cache;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Errors surfaced by a platform client.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Cannot find any entity corresponding to \"{0}\"")]
    EntityNotFound(String),

    #[error("RPC error {code}: {name}")]
    Rpc { code: i32, name: String },

    #[error("client is not connected")]
    Disconnected,

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    pub fn other(msg: impl fmt::Display) -> Self {
        Self::Other(msg.to_string())
    }
}

pub type PlatformResult<T> = std::result::Result<T, PlatformError>;

/// API credentials a client is created with.
#[derive(Clone)]
pub struct Credentials {
    pub api_id: i32,
    pub api_hash: SecretString,
}

impl Credentials {
    pub fn new(api_id: i32, api_hash: impl Into<String>) -> Self {
        Self {
            api_id,
            api_hash: SecretString::from(api_hash.into()),
        }
    }

    /// Parse credentials from their textual form (headers, env, request body).
    /// Returns `None` when either part is missing or blank.
    pub fn parse(api_id: Option<&str>, api_hash: Option<&str>) -> Option<Result<Self, String>> {
        let api_id = api_id.map(str::trim).filter(|s| !s.is_empty())?;
        let api_hash = api_hash.map(str::trim).filter(|s| !s.is_empty())?;
        Some(
            api_id
                .parse::<i32>()
                .map(|id| Self::new(id, api_hash))
                .map_err(|_| format!("api_id must be numeric, got {api_id:?}")),
        )
    }

    pub fn api_hash(&self) -> &str {
        self.api_hash.expose_secret()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_id", &self.api_id)
            .field("api_hash", &"[REDACTED]")
            .finish()
    }
}

/// The logged-in account behind a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

// -----------------------------------------------------------------------------
// Peers

/// Externally supplied conversation identifier, after syntactic dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PeerId {
    Numeric(i64),
    Username(String),
}

impl PeerId {
    /// Numeric if the whole string parses as an integer, username otherwise.
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        match raw.parse::<i64>() {
            Ok(id) => Self::Numeric(id),
            Err(_) => Self::Username(raw.trim_start_matches('@').to_string()),
        }
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(id) => write!(f, "{id}"),
            Self::Username(name) => write!(f, "{name}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerKind {
    User,
    Chat,
    Channel,
}

/// Addressable reference the client library requires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRef {
    pub kind: PeerKind,
    pub id: i64,
    pub access_hash: Option<i64>,
}

/// What a call is addressed to: a resolved peer, or the raw id when
/// resolution failed and the caller opted to pass it through anyway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerTarget {
    Resolved(PeerRef),
    Unresolved(PeerId),
}

// -----------------------------------------------------------------------------
// Dialogs

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminRights {
    pub post_messages: bool,
    pub edit_messages: bool,
    pub delete_messages: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntity {
    pub id: i64,
    pub username: Option<String>,
    pub access_hash: Option<i64>,
    pub bot: bool,
}

/// Basic (non-channel) group chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupEntity {
    pub id: i64,
    pub title: String,
    pub left: bool,
    pub kicked: bool,
}

/// Broadcast channel or megagroup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelEntity {
    pub id: i64,
    pub title: String,
    pub username: Option<String>,
    pub access_hash: Option<i64>,
    pub broadcast: bool,
    pub megagroup: bool,
    pub creator: bool,
    pub left: bool,
    pub admin_rights: Option<AdminRights>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entity {
    User(UserEntity),
    Group(GroupEntity),
    Channel(ChannelEntity),
}

impl Entity {
    /// True when the account has left the conversation or was removed from it.
    pub fn has_left(&self) -> bool {
        match self {
            Entity::User(_) => false,
            Entity::Group(g) => g.left || g.kicked,
            Entity::Channel(c) => c.left,
        }
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Entity::User(u) => u.username.as_deref(),
            Entity::Group(_) => None,
            Entity::Channel(c) => c.username.as_deref(),
        }
    }

    pub fn access_hash(&self) -> Option<i64> {
        match self {
            Entity::User(u) => u.access_hash,
            Entity::Group(_) => None,
            Entity::Channel(c) => c.access_hash,
        }
    }
}

/// One conversation as listed by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDialog {
    /// Platform-native (marked) id.
    pub id: i64,
    pub name: String,
    pub entity: Entity,
}

// -----------------------------------------------------------------------------
// Messages

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReactionCount {
    pub reaction: String,
    pub count: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollResults {
    pub total_voters: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Poll {
    pub results: Option<PollResults>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageMedia {
    Poll(Poll),
    Other,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub id: i32,
    pub views: Option<i32>,
    pub forwards: Option<i32>,
    pub replies: Option<i32>,
    pub reactions: Vec<ReactionCount>,
    /// Poll attached directly to the message.
    pub poll: Option<Poll>,
    pub media: Option<MessageMedia>,
}

// -----------------------------------------------------------------------------
// Statistics

#[derive(Debug, Clone, PartialEq)]
pub enum StatsGraph {
    /// Graph with embedded JSON data.
    Data { json: String },
    /// Graph the platform could not build.
    Error { error: String },
    /// Graph that must be loaded separately with the given token.
    Async { token: String },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatsPeriod {
    pub min_date: i64,
    pub max_date: i64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AbsValueAndPrev {
    pub current: f64,
    pub previous: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastStats {
    pub period: StatsPeriod,
    pub followers: AbsValueAndPrev,
    pub growth_graph: StatsGraph,
    pub followers_graph: StatsGraph,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MegagroupStats {
    pub period: StatsPeriod,
    pub members: AbsValueAndPrev,
    pub growth_graph: StatsGraph,
    pub members_graph: StatsGraph,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelStatsResponse {
    Broadcast(BroadcastStats),
    Megagroup(MegagroupStats),
}

impl ChannelStatsResponse {
    pub fn period(&self) -> StatsPeriod {
        match self {
            Self::Broadcast(s) => s.period,
            Self::Megagroup(s) => s.period,
        }
    }

    /// Follower counts for channels, member counts for megagroups.
    pub fn audience(&self) -> AbsValueAndPrev {
        match self {
            Self::Broadcast(s) => s.followers,
            Self::Megagroup(s) => s.members,
        }
    }

    pub fn growth_graph(&self) -> &StatsGraph {
        match self {
            Self::Broadcast(s) => &s.growth_graph,
            Self::Megagroup(s) => &s.growth_graph,
        }
    }

    pub fn audience_graph(&self) -> &StatsGraph {
        match self {
            Self::Broadcast(s) => &s.followers_graph,
            Self::Megagroup(s) => &s.members_graph,
        }
    }
}

// -----------------------------------------------------------------------------
// Traits

/// A tenant's connected session with the platform.
#[async_trait]
pub trait PlatformClient: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn connect(&self) -> PlatformResult<()>;

    async fn disconnect(&self) -> PlatformResult<()>;

    async fn is_authorized(&self) -> PlatformResult<bool>;

    /// Request a login code; returns the opaque phone code hash.
    async fn send_code(&self, phone: &str) -> PlatformResult<String>;

    async fn sign_in(&self, phone: &str, code: &str, phone_code_hash: &str)
        -> PlatformResult<Account>;

    async fn get_me(&self) -> PlatformResult<Option<Account>>;

    async fn log_out(&self) -> PlatformResult<()>;

    /// Full conversation list. Also (re)populates the client's entity cache.
    async fn dialogs(&self) -> PlatformResult<Vec<RawDialog>>;

    async fn resolve_peer(&self, id: &PeerId) -> PlatformResult<PeerRef>;

    async fn get_message(
        &self,
        peer: &PeerTarget,
        message_id: i32,
    ) -> PlatformResult<Option<RawMessage>>;

    /// Delete messages for both sides. Returns the number the platform reported.
    async fn delete_messages(&self, peer: &PeerTarget, message_ids: &[i32])
        -> PlatformResult<usize>;

    async fn broadcast_stats(&self, peer: &PeerTarget) -> PlatformResult<BroadcastStats>;

    async fn megagroup_stats(&self, peer: &PeerTarget) -> PlatformResult<MegagroupStats>;
}

/// Creates unconnected clients bound to a persistent session file.
#[async_trait]
pub trait ClientFactory: Send + Sync {
    async fn create(
        &self,
        session_path: &Path,
        credentials: &Credentials,
    ) -> PlatformResult<Arc<dyn PlatformClient>>;
}
