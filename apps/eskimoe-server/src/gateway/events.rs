//! Change events and the wire messages exchanged with subscribers.

use eskimoe_common::{BroadcastType, Envelope};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::models::category::Category;
use crate::models::member::Member;
use crate::models::message::Message;
use crate::models::ordered_ids::OrderedIds;
use crate::models::reaction::MessageReaction;
use crate::models::role::Role;
use crate::models::room::Room;

// ---------------------------------------------------------------------------
// Change events
// ---------------------------------------------------------------------------

/// A committed state change, announced to every subscriber.
///
/// Only constructed after the store accepted the mutation. Entity payloads
/// serialize through the models' public projection, which omits secrets.
#[derive(Debug, Clone)]
pub enum ChangeEvent {
    MessageCreated(Message),
    MessageDeleted { message_id: i32, room_id: i32 },
    MessageEdited(Message),
    MessageBulkDeleted { room_id: i32, message_ids: Vec<i32> },
    MessageReactionCreated { room_id: i32, reaction: MessageReaction },
    MessageReactionDeleted { room_id: i32, message_id: i32, reaction_id: i32 },
    MessageReactionUpdated { room_id: i32, reaction: MessageReaction },
    RoomCreated(Room),
    RoomDeleted { room_id: i32, category_id: i32 },
    RoomUpdated(Room),
    CategoryCreated(Category),
    CategoryDeleted { category_id: i32 },
    CategoryUpdated(Category),
    CategoryOrderUpdated { category_order: OrderedIds },
    MemberJoined(Member),
    MemberLeft(Member),
    MemberBanned(Member),
    MemberKicked(Member),
    MemberUnbanned(Member),
    MemberUpdated(Member),
    RoleCreated(Role),
    RoleDeleted { role_id: i32 },
    RoleUpdated(Role),
}

impl ChangeEvent {
    pub fn kind(&self) -> BroadcastType {
        match self {
            Self::MessageCreated(_) => BroadcastType::MessageCreated,
            Self::MessageDeleted { .. } => BroadcastType::MessageDeleted,
            Self::MessageEdited(_) => BroadcastType::MessageEdited,
            Self::MessageBulkDeleted { .. } => BroadcastType::MessageBulkDeleted,
            Self::MessageReactionCreated { .. } => BroadcastType::MessageReactionCreated,
            Self::MessageReactionDeleted { .. } => BroadcastType::MessageReactionDeleted,
            Self::MessageReactionUpdated { .. } => BroadcastType::MessageReactionUpdated,
            Self::RoomCreated(_) => BroadcastType::RoomCreated,
            Self::RoomDeleted { .. } => BroadcastType::RoomDeleted,
            Self::RoomUpdated(_) => BroadcastType::RoomUpdated,
            Self::CategoryCreated(_) => BroadcastType::CategoryCreated,
            Self::CategoryDeleted { .. } => BroadcastType::CategoryDeleted,
            Self::CategoryUpdated(_) => BroadcastType::CategoryUpdated,
            Self::CategoryOrderUpdated { .. } => BroadcastType::CategoryOrderUpdated,
            Self::MemberJoined(_) => BroadcastType::MemberJoined,
            Self::MemberLeft(_) => BroadcastType::MemberLeft,
            Self::MemberBanned(_) => BroadcastType::MemberBanned,
            Self::MemberKicked(_) => BroadcastType::MemberKicked,
            Self::MemberUnbanned(_) => BroadcastType::MemberUnbanned,
            Self::MemberUpdated(_) => BroadcastType::MemberUpdated,
            Self::RoleCreated(_) => BroadcastType::RoleCreated,
            Self::RoleDeleted { .. } => BroadcastType::RoleDeleted,
            Self::RoleUpdated(_) => BroadcastType::RoleUpdated,
        }
    }

    fn data(&self) -> serde_json::Result<Value> {
        match self {
            Self::MessageCreated(message) | Self::MessageEdited(message) => {
                serde_json::to_value(message)
            }
            Self::MessageDeleted {
                message_id,
                room_id,
            } => Ok(json!({
                "message_id": message_id,
                "room_id": room_id,
                "deleted": true,
            })),
            Self::MessageBulkDeleted {
                room_id,
                message_ids,
            } => Ok(json!({ "room_id": room_id, "message_ids": message_ids })),
            Self::MessageReactionCreated { room_id, reaction }
            | Self::MessageReactionUpdated { room_id, reaction } => {
                let mut data = serde_json::to_value(reaction)?;
                if let Value::Object(map) = &mut data {
                    map.insert("room_id".into(), json!(room_id));
                }
                Ok(data)
            }
            Self::MessageReactionDeleted {
                room_id,
                message_id,
                reaction_id,
            } => Ok(json!({
                "room_id": room_id,
                "message_id": message_id,
                "reaction_id": reaction_id,
            })),
            Self::RoomCreated(room) | Self::RoomUpdated(room) => serde_json::to_value(room),
            Self::RoomDeleted {
                room_id,
                category_id,
            } => Ok(json!({ "room_id": room_id, "category_id": category_id })),
            Self::CategoryCreated(category) | Self::CategoryUpdated(category) => {
                serde_json::to_value(category)
            }
            Self::CategoryDeleted { category_id } => Ok(json!({ "category_id": category_id })),
            Self::CategoryOrderUpdated { category_order } => {
                Ok(json!({ "category_order": category_order }))
            }
            Self::MemberJoined(member)
            | Self::MemberLeft(member)
            | Self::MemberBanned(member)
            | Self::MemberKicked(member)
            | Self::MemberUnbanned(member)
            | Self::MemberUpdated(member) => serde_json::to_value(member),
            Self::RoleCreated(role) | Self::RoleUpdated(role) => serde_json::to_value(role),
            Self::RoleDeleted { role_id } => Ok(json!({ "role_id": role_id })),
        }
    }

    /// Serializes the event into its wire envelope,
    /// `{"broadcast_type": n, "data": ...}`.
    pub fn encode(&self) -> serde_json::Result<String> {
        serde_json::to_string(&Envelope::new(self.kind(), self.data()?))
    }
}

// ---------------------------------------------------------------------------
// Control messages
// ---------------------------------------------------------------------------

/// Application messages a subscriber may send. Anything else is ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Heartbeat,
}

/// Replies written by the connection itself, outside the broadcast path.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    HeartbeatAck,
}
