use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::text_enum;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Announcement,
    #[default]
    Text,
    Commands,
    Archive,
}

text_enum!(RoomType {
    Announcement => "announcement",
    Text => "text",
    Commands => "commands",
    Archive => "archive",
});

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Room {
    pub id: i32,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub category_id: i32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewRoom {
    pub name: String,
    pub description: String,
    pub room_type: RoomType,
    pub category_id: i32,
}
