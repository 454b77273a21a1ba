use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::ordered_ids::OrderedIds;
use super::text_enum;

/// How new members are admitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ServerMode {
    #[default]
    Open,
    InviteOnly,
    Passphrase,
}

text_enum!(ServerMode {
    Open => "open",
    InviteOnly => "invite_only",
    Passphrase => "passphrase",
});

/// The singleton server record.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServerSettings {
    pub name: String,
    pub message: String,
    pub mode: ServerMode,
    #[serde(skip)]
    pub passphrase: Option<String>,
    #[schema(value_type = Vec<i32>)]
    pub category_order: OrderedIds,
    #[schema(value_type = Vec<i32>)]
    pub role_order: OrderedIds,
    pub created_at: DateTime<Utc>,
}
