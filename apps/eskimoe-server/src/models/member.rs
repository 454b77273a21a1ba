use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::text_enum;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    Online,
    Idle,
    Offline,
    Left,
    Banned,
}

text_enum!(MemberStatus {
    Online => "online",
    Idle => "idle",
    Offline => "offline",
    Left => "left",
    Banned => "banned",
});

impl MemberStatus {
    /// Whether a member with this status currently belongs to the server.
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Left | Self::Banned)
    }
}

/// A server member. Serializing a member never exposes its token hash.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Member {
    pub id: i32,
    pub unique_id: String,
    #[serde(skip)]
    pub token_hash: Option<String>,
    pub display_name: String,
    pub about: String,
    pub pronouns: String,
    pub status: MemberStatus,
    pub role_ids: Vec<i32>,
    pub joined_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMember {
    pub unique_id: String,
    pub token_hash: String,
    pub display_name: String,
    pub role_ids: Vec<i32>,
}
