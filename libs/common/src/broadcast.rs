//! Wire contract for change notifications pushed to gateway subscribers.
//!
//! Every frame is a JSON object `{"broadcast_type": <int>, "data": <payload>}`.
//! The integer codes are part of the client contract and must stay stable.

use std::fmt;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BroadcastType {
    MessageCreated = 0,
    MessageDeleted = 1,
    MessageEdited = 2,
    MessageBulkDeleted = 3,
    MessageReactionCreated = 4,
    MessageReactionDeleted = 5,
    MessageReactionUpdated = 6,
    RoomCreated = 7,
    RoomDeleted = 8,
    RoomUpdated = 9,
    CategoryCreated = 10,
    CategoryDeleted = 11,
    CategoryUpdated = 12,
    CategoryOrderUpdated = 13,
    MemberJoined = 14,
    MemberLeft = 15,
    MemberBanned = 16,
    MemberKicked = 17,
    MemberUnbanned = 18,
    MemberUpdated = 19,
    RoleCreated = 20,
    RoleDeleted = 21,
    RoleUpdated = 22,
}

impl BroadcastType {
    pub const ALL: [BroadcastType; 23] = [
        Self::MessageCreated,
        Self::MessageDeleted,
        Self::MessageEdited,
        Self::MessageBulkDeleted,
        Self::MessageReactionCreated,
        Self::MessageReactionDeleted,
        Self::MessageReactionUpdated,
        Self::RoomCreated,
        Self::RoomDeleted,
        Self::RoomUpdated,
        Self::CategoryCreated,
        Self::CategoryDeleted,
        Self::CategoryUpdated,
        Self::CategoryOrderUpdated,
        Self::MemberJoined,
        Self::MemberLeft,
        Self::MemberBanned,
        Self::MemberKicked,
        Self::MemberUnbanned,
        Self::MemberUpdated,
        Self::RoleCreated,
        Self::RoleDeleted,
        Self::RoleUpdated,
    ];

    pub const fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(usize::from(code)).copied()
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::MessageCreated => "message_created",
            Self::MessageDeleted => "message_deleted",
            Self::MessageEdited => "message_edited",
            Self::MessageBulkDeleted => "message_bulk_deleted",
            Self::MessageReactionCreated => "message_reaction_created",
            Self::MessageReactionDeleted => "message_reaction_deleted",
            Self::MessageReactionUpdated => "message_reaction_updated",
            Self::RoomCreated => "room_created",
            Self::RoomDeleted => "room_deleted",
            Self::RoomUpdated => "room_updated",
            Self::CategoryCreated => "category_created",
            Self::CategoryDeleted => "category_deleted",
            Self::CategoryUpdated => "category_updated",
            Self::CategoryOrderUpdated => "category_order_updated",
            Self::MemberJoined => "member_joined",
            Self::MemberLeft => "member_left",
            Self::MemberBanned => "member_banned",
            Self::MemberKicked => "member_kicked",
            Self::MemberUnbanned => "member_unbanned",
            Self::MemberUpdated => "member_updated",
            Self::RoleCreated => "role_created",
            Self::RoleDeleted => "role_deleted",
            Self::RoleUpdated => "role_updated",
        }
    }
}

impl fmt::Display for BroadcastType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for BroadcastType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for BroadcastType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct CodeVisitor;

        impl Visitor<'_> for CodeVisitor {
            type Value = BroadcastType;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a broadcast type code between 0 and 22")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
                u8::try_from(v)
                    .ok()
                    .and_then(BroadcastType::from_code)
                    .ok_or_else(|| E::invalid_value(de::Unexpected::Unsigned(v), &self))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
                u64::try_from(v)
                    .map_err(|_| E::invalid_value(de::Unexpected::Signed(v), &self))
                    .and_then(|v| self.visit_u64(v))
            }
        }

        deserializer.deserialize_u64(CodeVisitor)
    }
}

/// A single outbound frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    pub broadcast_type: BroadcastType,
    pub data: T,
}

impl<T> Envelope<T> {
    pub fn new(broadcast_type: BroadcastType, data: T) -> Self {
        Self {
            broadcast_type,
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[test]
    fn codes_follow_declaration_order() {
        for (index, kind) in BroadcastType::ALL.iter().enumerate() {
            assert_eq!(usize::from(kind.code()), index);
            assert_eq!(BroadcastType::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(BroadcastType::MessageCreated.code(), 0);
        assert_eq!(BroadcastType::RoleUpdated.code(), 22);
        assert_eq!(BroadcastType::from_code(23), None);
    }

    #[test]
    fn envelope_serializes_numeric_type() {
        let envelope = Envelope::new(
            BroadcastType::MessageDeleted,
            json!({ "message_id": 7, "room_id": 3, "deleted": true }),
        );
        let text = serde_json::to_string(&envelope).unwrap();
        let parsed: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed["broadcast_type"], 1);
        assert_eq!(parsed["data"]["message_id"], 7);
    }

    #[test]
    fn unknown_code_is_rejected() {
        let err = serde_json::from_str::<Envelope<Value>>(r#"{"broadcast_type":99,"data":null}"#);
        assert!(err.is_err());
    }
}
