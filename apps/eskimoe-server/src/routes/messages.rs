//! Message and reaction endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{logs, required_text};
use crate::auth::middleware::Authenticated;
use crate::db::store::{ReactionAdded, ReactionRemoved};
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::ChangeEvent;
use crate::models::log::LogType;
use crate::models::message::{Message, NewMessage, HISTORY_LIMIT, MAX_CONTENT_LEN};
use crate::models::reaction::MessageReaction;
use crate::models::room::Room;
use crate::permissions::{self, Permission};
use crate::AppState;

pub const MAX_BULK_DELETE: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/rooms/{room_id}/messages",
            get(list_messages).post(send_message),
        )
        .route(
            "/rooms/{room_id}/messages/bulk-delete",
            post(bulk_delete_messages),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}",
            patch(edit_message).delete(delete_message),
        )
        .route(
            "/rooms/{room_id}/messages/{message_id}/reactions/{reaction_id}",
            put(add_reaction).delete(remove_reaction),
        )
}

async fn find_room(state: &AppState, room_id: i32) -> Result<Room, ApiError> {
    state
        .store
        .room(room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))
}

/// A message addressed through a room that does not hold it is not found.
async fn find_message(state: &AppState, room_id: i32, message_id: i32) -> Result<Message, ApiError> {
    state
        .store
        .message(message_id)
        .await?
        .filter(|message| message.room_id == room_id)
        .ok_or_else(|| ApiError::not_found("Message not found"))
}

// ---------------------------------------------------------------------------
// GET /rooms/{room_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageWithReactions {
    #[serde(flatten)]
    pub message: Message,
    pub reactions: Vec<MessageReaction>,
}

#[utoipa::path(
    get,
    path = "/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
    ),
    responses(
        (status = 200, description = "Latest messages, oldest first", body = [MessageWithReactions]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn list_messages(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(room_id): Path<i32>,
) -> Result<Json<Vec<MessageWithReactions>>, ApiError> {
    permissions::require(&principal, Permission::ViewMessageHistory)?;
    find_room(&state, room_id).await?;

    let messages = state.store.recent_messages(room_id, HISTORY_LIMIT).await?;
    let ids: Vec<i32> = messages.iter().map(|message| message.id).collect();
    let reactions = state.store.reactions_for_messages(&ids).await?;

    let data = messages
        .into_iter()
        .map(|message| MessageWithReactions {
            reactions: reactions
                .iter()
                .filter(|reaction| reaction.message_id == message.id)
                .cloned()
                .collect(),
            message,
        })
        .collect();

    Ok(Json(data))
}

// ---------------------------------------------------------------------------
// POST /rooms/{room_id}/messages
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendMessageRequest {
    pub content: Option<String>,
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/messages",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
    ),
    request_body = SendMessageRequest,
    responses(
        (status = 201, description = "Message sent", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn send_message(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(room_id): Path<i32>,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<Message>), ApiError> {
    permissions::require(&principal, Permission::SendMessage)?;
    let room = find_room(&state, room_id).await?;
    let content = required_text("content", body.content.as_deref(), MAX_CONTENT_LEN)?;

    let message = state
        .store
        .create_message(NewMessage {
            content,
            author_id: principal.id(),
            room_id: room.id,
        })
        .await?;

    state.hub.broadcast(ChangeEvent::MessageCreated(message.clone()));

    Ok((StatusCode::CREATED, Json(message)))
}

// ---------------------------------------------------------------------------
// PATCH /rooms/{room_id}/messages/{message_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct EditMessageRequest {
    pub content: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/rooms/{room_id}/messages/{message_id}",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
        ("message_id" = i32, Path, description = "Message ID"),
    ),
    request_body = EditMessageRequest,
    responses(
        (status = 200, description = "Message edited", body = Message),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Only the author can edit", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn edit_message(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(i32, i32)>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let mut message = find_message(&state, room_id, message_id).await?;
    if message.author_id != principal.id() {
        return Err(ApiError::forbidden("Only the author can edit a message"));
    }
    let content = required_text("content", body.content.as_deref(), MAX_CONTENT_LEN)?;
    if content == message.content {
        return Ok(Json(message));
    }

    message.content = content;
    message.edited = true;
    let message = state.store.update_message(&message).await?;

    state.hub.broadcast(ChangeEvent::MessageEdited(message.clone()));

    Ok(Json(message))
}

// ---------------------------------------------------------------------------
// DELETE /rooms/{room_id}/messages/{message_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/rooms/{room_id}/messages/{message_id}",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
        ("message_id" = i32, Path, description = "Message ID"),
    ),
    responses(
        (status = 204, description = "Message deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Message not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_message(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path((room_id, message_id)): Path<(i32, i32)>,
) -> Result<StatusCode, ApiError> {
    let message = find_message(&state, room_id, message_id).await?;
    let is_author = message.author_id == principal.id();
    if !is_author {
        permissions::require(&principal, Permission::DeleteMessage)?;
    }

    state.store.delete_message(message.id).await?;

    state.hub.broadcast(ChangeEvent::MessageDeleted {
        message_id: message.id,
        room_id: message.room_id,
    });
    if !is_author {
        logs::record(
            &state,
            LogType::MessageDeleted,
            principal.id(),
            format!(
                "{} deleted message {} in room {}",
                principal.member.display_name, message.id, message.room_id
            ),
        )
        .await;
    }

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// POST /rooms/{room_id}/messages/bulk-delete
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct BulkDeleteRequest {
    pub message_ids: Vec<i32>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BulkDeleteResponse {
    /// Ids that were removed. Ids from other rooms are skipped.
    pub deleted: Vec<i32>,
}

#[utoipa::path(
    post,
    path = "/rooms/{room_id}/messages/bulk-delete",
    tag = "Messages",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
    ),
    request_body = BulkDeleteRequest,
    responses(
        (status = 200, description = "Messages deleted", body = BulkDeleteResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn bulk_delete_messages(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(room_id): Path<i32>,
    Json(body): Json<BulkDeleteRequest>,
) -> Result<Json<BulkDeleteResponse>, ApiError> {
    permissions::require(&principal, Permission::DeleteMessage)?;
    let room = find_room(&state, room_id).await?;

    let mut ids = body.message_ids;
    ids.sort_unstable();
    ids.dedup();
    if ids.is_empty() {
        return Err(ApiError::field("message_ids", "At least one message id is required"));
    }
    if ids.len() > MAX_BULK_DELETE {
        return Err(ApiError::field(
            "message_ids",
            format!("At most {MAX_BULK_DELETE} messages can be deleted at once"),
        ));
    }

    let deleted = state.store.delete_messages(room.id, &ids).await?;
    if deleted.is_empty() {
        return Ok(Json(BulkDeleteResponse { deleted }));
    }

    state.hub.broadcast(ChangeEvent::MessageBulkDeleted {
        room_id: room.id,
        message_ids: deleted.clone(),
    });
    logs::record(
        &state,
        LogType::MessageBulkDeleted,
        principal.id(),
        format!(
            "{} deleted {} messages in room {}",
            principal.member.display_name,
            deleted.len(),
            room.name
        ),
    )
    .await;

    Ok(Json(BulkDeleteResponse { deleted }))
}

// ---------------------------------------------------------------------------
// PUT /rooms/{room_id}/messages/{message_id}/reactions/{reaction_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    put,
    path = "/rooms/{room_id}/messages/{message_id}/reactions/{reaction_id}",
    tag = "Reactions",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
        ("message_id" = i32, Path, description = "Message ID"),
        ("reaction_id" = i32, Path, description = "Server reaction ID"),
    ),
    responses(
        (status = 200, description = "Reaction added or already present", body = MessageReaction),
        (status = 201, description = "First reaction of this kind", body = MessageReaction),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Message or reaction not found", body = ApiErrorBody),
    ),
)]
pub async fn add_reaction(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path((room_id, message_id, reaction_id)): Path<(i32, i32, i32)>,
) -> Result<(StatusCode, Json<MessageReaction>), ApiError> {
    permissions::require(&principal, Permission::AddReaction)?;
    let message = find_message(&state, room_id, message_id).await?;
    state
        .store
        .server_reaction(reaction_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Reaction not found"))?;

    let added = state
        .store
        .add_reaction_member(message.id, reaction_id, principal.id())
        .await?;

    match added {
        ReactionAdded::Created(reaction) => {
            state.hub.broadcast(ChangeEvent::MessageReactionCreated {
                room_id: message.room_id,
                reaction: reaction.clone(),
            });
            Ok((StatusCode::CREATED, Json(reaction)))
        }
        ReactionAdded::Joined(reaction) => {
            state.hub.broadcast(ChangeEvent::MessageReactionUpdated {
                room_id: message.room_id,
                reaction: reaction.clone(),
            });
            Ok((StatusCode::OK, Json(reaction)))
        }
        ReactionAdded::AlreadyPresent(reaction) => Ok((StatusCode::OK, Json(reaction))),
    }
}

// ---------------------------------------------------------------------------
// DELETE /rooms/{room_id}/messages/{message_id}/reactions/{reaction_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/rooms/{room_id}/messages/{message_id}/reactions/{reaction_id}",
    tag = "Reactions",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
        ("message_id" = i32, Path, description = "Message ID"),
        ("reaction_id" = i32, Path, description = "Server reaction ID"),
    ),
    responses(
        (status = 204, description = "Reaction removed"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "No such reaction from this member", body = ApiErrorBody),
    ),
)]
pub async fn remove_reaction(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path((room_id, message_id, reaction_id)): Path<(i32, i32, i32)>,
) -> Result<StatusCode, ApiError> {
    permissions::require(&principal, Permission::AddReaction)?;
    let message = find_message(&state, room_id, message_id).await?;

    let removed = state
        .store
        .remove_reaction_member(message.id, reaction_id, principal.id())
        .await?;

    match removed {
        ReactionRemoved::NotReacted => return Err(ApiError::not_found("Reaction not found")),
        ReactionRemoved::Deleted(_) => state.hub.broadcast(ChangeEvent::MessageReactionDeleted {
            room_id: message.room_id,
            message_id: message.id,
            reaction_id,
        }),
        ReactionRemoved::Left(reaction) => state.hub.broadcast(ChangeEvent::MessageReactionUpdated {
            room_id: message.room_id,
            reaction,
        }),
    }

    Ok(StatusCode::NO_CONTENT)
}
