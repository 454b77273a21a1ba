use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct Message {
    pub id: i32,
    pub content: String,
    pub author_id: i32,
    pub room_id: i32,
    pub edited: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub content: String,
    pub author_id: i32,
    pub room_id: i32,
}

/// Number of messages returned by a room history request.
pub const HISTORY_LIMIT: i64 = 25;
pub const MAX_CONTENT_LEN: usize = 4000;
