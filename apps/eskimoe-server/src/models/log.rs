use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::text_enum;

/// Audit actions recorded in the server log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LogType {
    CategoryCreated,
    CategoryDeleted,
    CategoryUpdated,
    RoomCreated,
    RoomDeleted,
    RoomUpdated,
    MessageDeleted,
    MessageBulkDeleted,
    MemberBanned,
    MemberKicked,
    MemberUnbanned,
    MemberUpdated,
    RoleCreated,
    RoleDeleted,
    RoleUpdated,
    InviteGenerated,
    InviteUsed,
    InviteDeleted,
}

text_enum!(LogType {
    CategoryCreated => "category_created",
    CategoryDeleted => "category_deleted",
    CategoryUpdated => "category_updated",
    RoomCreated => "room_created",
    RoomDeleted => "room_deleted",
    RoomUpdated => "room_updated",
    MessageDeleted => "message_deleted",
    MessageBulkDeleted => "message_bulk_deleted",
    MemberBanned => "member_banned",
    MemberKicked => "member_kicked",
    MemberUnbanned => "member_unbanned",
    MemberUpdated => "member_updated",
    RoleCreated => "role_created",
    RoleDeleted => "role_deleted",
    RoleUpdated => "role_updated",
    InviteGenerated => "invite_generated",
    InviteUsed => "invite_used",
    InviteDeleted => "invite_deleted",
});

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct LogEntry {
    pub id: i32,
    #[serde(rename = "type")]
    pub log_type: LogType,
    pub content: String,
    /// The member who performed the action.
    pub member_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewLogEntry {
    pub log_type: LogType,
    pub content: String,
    pub member_id: i32,
}
