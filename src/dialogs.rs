//! Dialog classification: which conversations a tenant can post to.

use crate::platform::{ChannelEntity, Entity, RawDialog};
use serde::Serialize;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogType {
    User,
    Group,
    Channel,
}

/// A conversation the tenant can send messages to
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogRecord {
    #[serde(rename = "telegramId")]
    pub external_id: String,
    #[serde(rename = "name")]
    pub display_name: String,
    pub username: Option<String>,
    #[serde(rename = "type")]
    pub kind: DialogType,
    pub can_send: bool,
    pub access_hash: Option<String>,
}

/// Type and send permission of a single entity
pub fn permissions(entity: &Entity) -> (DialogType, bool) {
    match entity {
        Entity::User(_) => (DialogType::User, true),
        Entity::Group(_) => (DialogType::Group, true),
        Entity::Channel(channel) if channel.megagroup => (DialogType::Group, true),
        Entity::Channel(channel) if channel.broadcast => {
            (DialogType::Channel, can_post_to_broadcast(channel))
        }
        Entity::Channel(_) => (DialogType::Channel, false),
    }
}

fn can_post_to_broadcast(channel: &ChannelEntity) -> bool {
    channel.creator
        || channel
            .admin_rights
            .as_ref()
            .is_some_and(|rights| rights.post_messages)
}

/// Keep the conversations the tenant can post to, in input order.
pub fn classify(dialogs: &[RawDialog]) -> Vec<DialogRecord> {
    let mut records = Vec::with_capacity(dialogs.len());

    for dialog in dialogs {
        if dialog.entity.has_left() {
            debug!(dialog = dialog.id, "skipped: left or kicked");
            continue;
        }

        let (kind, can_send) = permissions(&dialog.entity);
        if !can_send {
            debug!(dialog = dialog.id, "skipped: cannot post");
            continue;
        }

        let display_name = if dialog.name.trim().is_empty() {
            "Unknown".to_string()
        } else {
            dialog.name.clone()
        };

        records.push(DialogRecord {
            external_id: dialog.id.to_string(),
            display_name,
            username: dialog.entity.username().map(str::to_string),
            kind,
            can_send,
            access_hash: dialog.entity.access_hash().map(|h| h.to_string()),
        });
    }

    info!(
        total = dialogs.len(),
        sendable = records.len(),
        "classified dialogs"
    );
    records
}
