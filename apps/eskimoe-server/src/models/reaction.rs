use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// An emoji or shortcode members can react with.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ServerReaction {
    pub id: i32,
    pub reaction: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewServerReaction {
    pub reaction: String,
    pub color: String,
}

/// Members who reacted to one message with one server reaction.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct MessageReaction {
    pub id: i32,
    pub message_id: i32,
    pub reaction_id: i32,
    pub member_ids: Vec<i32>,
    pub count: i32,
}

impl MessageReaction {
    /// Adds `member_id`. Returns false if it already reacted.
    pub fn add_member(&mut self, member_id: i32) -> bool {
        if self.member_ids.contains(&member_id) {
            return false;
        }
        self.member_ids.push(member_id);
        self.count = self.member_ids.len() as i32;
        true
    }

    /// Removes `member_id`. Returns false if it had not reacted.
    pub fn remove_member(&mut self, member_id: i32) -> bool {
        let before = self.member_ids.len();
        self.member_ids.retain(|id| *id != member_id);
        self.count = self.member_ids.len() as i32;
        before != self.member_ids.len()
    }
}
