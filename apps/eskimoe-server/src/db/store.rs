use async_trait::async_trait;
use thiserror::Error;

use crate::models::category::{Category, NewCategory};
use crate::models::invite::{Invite, NewInvite};
use crate::models::log::{LogEntry, NewLogEntry};
use crate::models::member::{Member, NewMember};
use crate::models::message::{Message, NewMessage};
use crate::models::ordered_ids::{OrderedIds, ReorderError};
use crate::models::reaction::{MessageReaction, NewServerReaction, ServerReaction};
use crate::models::role::{NewRole, Role};
use crate::models::room::{NewRoom, Room};
use crate::models::server::ServerSettings;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("{0}")]
    Conflict(String),
    #[error("store backend failure: {0}")]
    Backend(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// One of the ordering arrays: categories and roles on the server record,
/// rooms on each category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderKey {
    Categories,
    Roles,
    Rooms { category_id: i32 },
}

impl OrderKey {
    /// The record that owns the array.
    pub fn owner(self) -> &'static str {
        match self {
            Self::Categories | Self::Roles => "server",
            Self::Rooms { .. } => "category",
        }
    }
}

/// Result of [`EntityStore::add_reaction_member`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionAdded {
    /// The member is the first to use this reaction on the message.
    Created(MessageReaction),
    Joined(MessageReaction),
    AlreadyPresent(MessageReaction),
}

/// Result of [`EntityStore::remove_reaction_member`].
#[derive(Debug, Clone, PartialEq)]
pub enum ReactionRemoved {
    Left(MessageReaction),
    /// The member was the last one; the row is gone.
    Deleted(MessageReaction),
    NotReacted,
}

/// Persistence for every server entity.
///
/// Lookups return `Ok(None)` for missing rows; updates and deletes of a
/// missing row return [`StoreError::NotFound`].
#[async_trait]
pub trait EntityStore: Send + Sync {
    // -- server -------------------------------------------------------------

    async fn load_server(&self) -> StoreResult<Option<ServerSettings>>;
    /// Inserts or replaces the singleton server record.
    async fn save_server(&self, server: &ServerSettings) -> StoreResult<()>;

    // -- ordering -----------------------------------------------------------
    //
    // Each call reads and writes one array as a single unit, so concurrent
    // callers never overwrite each other's ids.

    /// Inserts `id` at `position`, or appends it when `position` is `None`
    /// or past the end. Ids already present stay where they are.
    async fn link_ordered(&self, key: OrderKey, id: i32, position: Option<usize>) -> StoreResult<()>;
    /// Removes `id` and returns the index it held, if it was present.
    async fn unlink_ordered(&self, key: OrderKey, id: i32) -> StoreResult<Option<usize>>;
    /// Replaces the array with `proposed` if it is a permutation of the
    /// stored ids.
    async fn reorder(
        &self,
        key: OrderKey,
        proposed: Vec<i32>,
    ) -> StoreResult<Result<OrderedIds, ReorderError>>;

    // -- members ------------------------------------------------------------

    async fn member(&self, id: i32) -> StoreResult<Option<Member>>;
    async fn member_by_unique_id(&self, unique_id: &str) -> StoreResult<Option<Member>>;
    async fn member_by_token_hash(&self, token_hash: &str) -> StoreResult<Option<Member>>;
    async fn list_members(&self) -> StoreResult<Vec<Member>>;
    async fn create_member(&self, new: NewMember) -> StoreResult<Member>;
    async fn update_member(&self, member: &Member) -> StoreResult<Member>;

    // -- roles --------------------------------------------------------------

    async fn role(&self, id: i32) -> StoreResult<Option<Role>>;
    async fn role_by_name(&self, name: &str) -> StoreResult<Option<Role>>;
    /// The system role every member implicitly holds.
    async fn default_role(&self) -> StoreResult<Option<Role>>;
    async fn roles_by_ids(&self, ids: &[i32]) -> StoreResult<Vec<Role>>;
    async fn list_roles(&self) -> StoreResult<Vec<Role>>;
    async fn create_role(&self, new: NewRole) -> StoreResult<Role>;
    async fn update_role(&self, role: &Role) -> StoreResult<Role>;
    /// Deletes the role and strips it from every member that holds it.
    async fn delete_role(&self, id: i32) -> StoreResult<()>;

    // -- categories ---------------------------------------------------------

    async fn category(&self, id: i32) -> StoreResult<Option<Category>>;
    async fn list_categories(&self) -> StoreResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> StoreResult<Category>;
    /// Renames the category. Its room order is left alone.
    async fn update_category(&self, category: &Category) -> StoreResult<Category>;
    async fn delete_category(&self, id: i32) -> StoreResult<()>;

    // -- rooms --------------------------------------------------------------

    async fn room(&self, id: i32) -> StoreResult<Option<Room>>;
    async fn list_rooms(&self) -> StoreResult<Vec<Room>>;
    async fn create_room(&self, new: NewRoom) -> StoreResult<Room>;
    async fn update_room(&self, room: &Room) -> StoreResult<Room>;
    /// Deletes the room together with its messages.
    async fn delete_room(&self, id: i32) -> StoreResult<()>;

    // -- messages -----------------------------------------------------------

    async fn message(&self, id: i32) -> StoreResult<Option<Message>>;
    /// The newest `limit` messages of a room, oldest first.
    async fn recent_messages(&self, room_id: i32, limit: i64) -> StoreResult<Vec<Message>>;
    async fn create_message(&self, new: NewMessage) -> StoreResult<Message>;
    async fn update_message(&self, message: &Message) -> StoreResult<Message>;
    async fn delete_message(&self, id: i32) -> StoreResult<()>;
    /// Deletes the listed messages that belong to `room_id` and returns the
    /// ids actually removed.
    async fn delete_messages(&self, room_id: i32, ids: &[i32]) -> StoreResult<Vec<i32>>;

    // -- reactions ----------------------------------------------------------

    async fn server_reaction(&self, id: i32) -> StoreResult<Option<ServerReaction>>;
    async fn list_server_reactions(&self) -> StoreResult<Vec<ServerReaction>>;
    async fn create_server_reaction(&self, new: NewServerReaction) -> StoreResult<ServerReaction>;
    async fn message_reaction(
        &self,
        message_id: i32,
        reaction_id: i32,
    ) -> StoreResult<Option<MessageReaction>>;
    async fn reactions_for_messages(&self, message_ids: &[i32]) -> StoreResult<Vec<MessageReaction>>;
    /// Records that `member_id` reacted, creating the row on first use.
    async fn add_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionAdded>;
    /// Withdraws the member's reaction, deleting the row when it empties.
    async fn remove_reaction_member(
        &self,
        message_id: i32,
        reaction_id: i32,
        member_id: i32,
    ) -> StoreResult<ReactionRemoved>;

    // -- invites ------------------------------------------------------------

    async fn invite_by_code(&self, code: &str) -> StoreResult<Option<Invite>>;
    async fn list_invites(&self) -> StoreResult<Vec<Invite>>;
    async fn create_invite(&self, new: NewInvite) -> StoreResult<Invite>;
    async fn update_invite(&self, invite: &Invite) -> StoreResult<Invite>;
    async fn delete_invite(&self, id: i32) -> StoreResult<()>;

    // -- logs ---------------------------------------------------------------

    async fn append_log(&self, new: NewLogEntry) -> StoreResult<LogEntry>;
    /// Newest entries first.
    async fn list_logs(&self, limit: i64) -> StoreResult<Vec<LogEntry>>;
}
