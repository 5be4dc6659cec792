//! Message analytics: view/forward/reply/reaction/poll counts.

use crate::error::{GatewayError, Result};
use crate::items::MessageItem;
use crate::peers::PeerResolver;
use crate::platform::{MessageMedia, PeerTarget, PlatformClient, PlatformError, Poll, RawMessage};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AnalyticsResult {
    pub views: u64,
    pub forwards: u64,
    pub replies: u64,
    pub reactions: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voters: Option<u64>,
}

/// Counts for one message. `voters` is set only when the message has a poll.
pub fn extract(message: &RawMessage) -> AnalyticsResult {
    AnalyticsResult {
        views: count(message.views),
        forwards: count(message.forwards),
        replies: count(message.replies),
        reactions: message
            .reactions
            .iter()
            .map(|r| count(Some(r.count)))
            .sum(),
        voters: poll_voters(message),
    }
}

fn count(value: Option<i32>) -> u64 {
    value.map_or(0, |n| n.max(0) as u64)
}

fn poll_voters(message: &RawMessage) -> Option<u64> {
    let poll = match (&message.poll, &message.media) {
        (Some(poll), _) => poll,
        (None, Some(MessageMedia::Poll(poll))) => poll,
        _ => return None,
    };
    Some(total_voters(poll))
}

fn total_voters(poll: &Poll) -> u64 {
    count(poll.results.as_ref().and_then(|r| r.total_voters))
}

fn lookup_error(e: PlatformError) -> GatewayError {
    match e {
        PlatformError::EntityNotFound(_) => {
            GatewayError::NotFound("Channel/Group not found or not accessible".to_string())
        }
        other => GatewayError::Platform(other),
    }
}

/// Analytics for a single message.
pub async fn analyze_one(
    client: &dyn PlatformClient,
    chat_id: &str,
    message_id: i32,
) -> Result<AnalyticsResult> {
    let peer = PeerResolver::new(client)
        .resolve_direct(chat_id)
        .await
        .map_err(lookup_error)?;

    let message = client
        .get_message(&PeerTarget::Resolved(peer), message_id)
        .await
        .map_err(lookup_error)?
        .ok_or_else(|| GatewayError::NotFound("Message not found".to_string()))?;

    Ok(extract(&message))
}

/// Analytics for many messages, keyed by message ID.
///
/// Items that are incomplete, unresolvable or missing are left out of the
/// result; one bad item never fails the batch.
pub async fn analyze_batch(
    client: &dyn PlatformClient,
    items: &[MessageItem],
) -> BTreeMap<String, AnalyticsResult> {
    let resolver = PeerResolver::new(client);
    let mut results = BTreeMap::new();

    for item in items {
        let (Some(chat_id), Some(message_id)) = (item.recipient(), item.message()) else {
            continue;
        };

        let message = match resolver.resolve_direct(chat_id).await {
            Ok(peer) => {
                client
                    .get_message(&PeerTarget::Resolved(peer), message_id)
                    .await
            }
            Err(e) => Err(e),
        };

        match message {
            Ok(Some(message)) => {
                let mut result = extract(&message);
                result.voters = Some(result.voters.unwrap_or(0));
                debug!(
                    chat = chat_id,
                    message_id,
                    views = result.views,
                    reactions = result.reactions,
                    "analyzed message"
                );
                results.insert(message_id.to_string(), result);
            }
            Ok(None) => warn!(chat = chat_id, message_id, "message not found"),
            Err(e) => warn!(chat = chat_id, message_id, "failed to analyze message: {e}"),
        }
    }

    results
}
