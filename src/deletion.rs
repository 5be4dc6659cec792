//! Batch deletion of messages, grouped by conversation.

use crate::error::{GatewayError, Result};
use crate::items::MessageItem;
use crate::peers::PeerResolver;
use crate::platform::PlatformClient;
use serde::Serialize;
use tracing::{info, warn};

/// Aggregated result of one deletion request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionOutcome {
    #[serde(rename = "success")]
    pub success_count: usize,
    #[serde(rename = "failed")]
    pub failed_count: usize,
    pub errors: Vec<String>,
}

/// Group message IDs by conversation, keeping first-seen order.
/// Returns the groups and the number of incomplete items.
pub fn group_by_conversation(items: &[MessageItem]) -> (Vec<(String, Vec<i32>)>, usize) {
    let mut groups: Vec<(String, Vec<i32>)> = Vec::new();
    let mut incomplete = 0;

    for item in items {
        let (Some(recipient), Some(message_id)) = (item.recipient(), item.message()) else {
            incomplete += 1;
            continue;
        };

        match groups.iter_mut().find(|(id, _)| id.as_str() == recipient) {
            Some((_, ids)) => ids.push(message_id),
            None => groups.push((recipient.to_string(), vec![message_id])),
        }
    }

    (groups, incomplete)
}

/// Delete messages for both sides, one request per conversation.
///
/// A failing conversation is counted and reported, then the next one is
/// processed. The caller is expected to have checked authorization.
pub async fn delete_batch(
    client: &dyn PlatformClient,
    items: &[MessageItem],
) -> Result<DeletionOutcome> {
    if items.is_empty() {
        return Err(GatewayError::BadRequest("No messages provided".to_string()));
    }

    let (groups, incomplete) = group_by_conversation(items);
    let mut outcome = DeletionOutcome {
        failed_count: incomplete,
        ..Default::default()
    };

    let resolver = PeerResolver::new(client);

    for (recipient, message_ids) in groups {
        let target = resolver.resolve(&recipient).await;

        match client.delete_messages(&target, &message_ids).await {
            Ok(_) => {
                info!(chat = %recipient, count = message_ids.len(), "deleted messages");
                outcome.success_count += message_ids.len();
            }
            Err(e) => {
                warn!(chat = %recipient, "failed to delete messages: {e}");
                outcome.failed_count += message_ids.len();
                outcome.errors.push(format!("{recipient}: {e}"));
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::{PeerKind, PeerTarget};
    use crate::test_utils::MockPlatform;

    #[test]
    fn test_grouping() {
        let items = vec![
            MessageItem::new("A", 1),
            MessageItem::new("B", 2),
            MessageItem::new("A", 3),
            MessageItem {
                recipient_id: None,
                message_id: Some("4".to_string()),
            },
        ];

        let (groups, incomplete) = group_by_conversation(&items);

        assert_eq!(incomplete, 1);
        assert_eq!(
            groups,
            vec![
                ("A".to_string(), vec![1, 3]),
                ("B".to_string(), vec![2]),
            ]
        );
    }

    #[tokio::test]
    async fn test_empty_batch_rejected() {
        let mock = MockPlatform::new();
        let err = delete_batch(&mock, &[]).await.unwrap_err();
        assert!(matches!(err, GatewayError::BadRequest(_)));
    }

    #[tokio::test]
    async fn test_unresolvable_group_does_not_abort_others() {
        let mock = MockPlatform::new().with_peer("A", MockPlatform::peer(PeerKind::Chat, 1));

        let items = vec![
            MessageItem::new("A", 10),
            MessageItem::new("A", 11),
            MessageItem::new("B", 12),
        ];
        let outcome = delete_batch(&mock, &items).await.unwrap();

        assert_eq!(outcome.success_count, 2);
        assert_eq!(outcome.failed_count, 1);
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors[0].starts_with("B: "));

        let deleted = mock.deleted();
        assert_eq!(deleted.len(), 1);
        assert_eq!(deleted[0].1, vec![10, 11]);
    }

    #[tokio::test]
    async fn test_group_failure_and_incomplete_items() {
        let mock = MockPlatform::new()
            .with_peer("A", MockPlatform::peer(PeerKind::Chat, 1))
            .with_peer("C", MockPlatform::peer(PeerKind::Channel, 3))
            .failing_delete(3, "MESSAGE_DELETE_FORBIDDEN");

        let items = vec![
            MessageItem::new("A", 1),
            MessageItem::new("C", 2),
            MessageItem::new("C", 3),
            MessageItem {
                recipient_id: Some("A".to_string()),
                message_id: None,
            },
        ];
        let outcome = delete_batch(&mock, &items).await.unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(outcome.failed_count, 3);
        assert_eq!(outcome.errors, vec!["C: MESSAGE_DELETE_FORBIDDEN".to_string()]);
    }

    #[tokio::test]
    async fn test_refresh_resolves_late_peer() {
        let peer = MockPlatform::peer(PeerKind::User, 8);
        let mock = MockPlatform::new().with_peer_after_refresh("8", peer.clone());

        let outcome = delete_batch(&mock, &[MessageItem::new("8", 5)]).await.unwrap();

        assert_eq!(outcome.success_count, 1);
        assert_eq!(mock.deleted()[0].0, PeerTarget::Resolved(peer));
    }

    #[test]
    fn test_wire_format() {
        let outcome = DeletionOutcome {
            success_count: 2,
            failed_count: 1,
            errors: vec!["B: nope".to_string()],
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"success": 2, "failed": 1, "errors": ["B: nope"]})
        );
    }
}
