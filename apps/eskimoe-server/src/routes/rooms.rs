//! Room endpoints. Each room is listed in its category's room order.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use super::ordering::{complete_or_compensate, unlink_then_delete};
use super::{logs, optional_text, required_text};
use crate::auth::middleware::Authenticated;
use crate::db::store::OrderKey;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::ChangeEvent;
use crate::models::log::LogType;
use crate::models::room::{NewRoom, Room, RoomType};
use crate::permissions::{self, Permission};
use crate::AppState;

pub const MAX_ROOM_NAME_LEN: usize = 64;
pub const MAX_ROOM_DESCRIPTION_LEN: usize = 256;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/rooms", post(create_room))
        .route("/rooms/{room_id}", patch(update_room).delete(delete_room))
}

// ---------------------------------------------------------------------------
// POST /rooms
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub room_type: Option<RoomType>,
    pub category_id: i32,
}

#[utoipa::path(
    post,
    path = "/rooms",
    tag = "Rooms",
    security(("bearer" = [])),
    request_body = CreateRoomRequest,
    responses(
        (status = 201, description = "Room created", body = Room),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Category not found", body = ApiErrorBody),
        (status = 500, description = "Room ordering could not be saved", body = ApiErrorBody),
    ),
)]
pub async fn create_room(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Json(body): Json<CreateRoomRequest>,
) -> Result<(StatusCode, Json<Room>), ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let name = required_text("name", body.name.as_deref(), MAX_ROOM_NAME_LEN)?;
    let description = optional_text(
        "description",
        body.description.as_deref(),
        MAX_ROOM_DESCRIPTION_LEN,
    )?
    .unwrap_or_default();

    let category = state
        .store
        .category(body.category_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let room = state
        .store
        .create_room(NewRoom {
            name,
            description,
            room_type: body.room_type.unwrap_or_default(),
            category_id: category.id,
        })
        .await?;

    complete_or_compensate(
        "room",
        room.id,
        state.store.link_ordered(
            OrderKey::Rooms {
                category_id: category.id,
            },
            room.id,
            None,
        ),
        || state.store.delete_room(room.id),
    )
    .await?;

    tracing::info!(room_id = room.id, category_id = category.id, "room created");
    state.hub.broadcast(ChangeEvent::RoomCreated(room.clone()));
    logs::record(
        &state,
        LogType::RoomCreated,
        principal.id(),
        format!("{} created room {}", principal.member.display_name, room.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(room)))
}

// ---------------------------------------------------------------------------
// PATCH /rooms/{room_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoomRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(rename = "type")]
    pub room_type: Option<RoomType>,
}

#[utoipa::path(
    patch,
    path = "/rooms/{room_id}",
    tag = "Rooms",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
    ),
    request_body = UpdateRoomRequest,
    responses(
        (status = 200, description = "Room updated", body = Room),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn update_room(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(room_id): Path<i32>,
    Json(body): Json<UpdateRoomRequest>,
) -> Result<Json<Room>, ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let current = state
        .store
        .room(room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    let mut room = current.clone();
    if let Some(raw) = body.name.as_deref() {
        room.name = required_text("name", Some(raw), MAX_ROOM_NAME_LEN)?;
    }
    if let Some(description) = optional_text(
        "description",
        body.description.as_deref(),
        MAX_ROOM_DESCRIPTION_LEN,
    )? {
        room.description = description;
    }
    if let Some(room_type) = body.room_type {
        room.room_type = room_type;
    }

    if room == current {
        return Ok(Json(room));
    }
    let room = state.store.update_room(&room).await?;

    state.hub.broadcast(ChangeEvent::RoomUpdated(room.clone()));
    logs::record(
        &state,
        LogType::RoomUpdated,
        principal.id(),
        format!("{} updated room {}", principal.member.display_name, room.name),
    )
    .await;

    Ok(Json(room))
}

// ---------------------------------------------------------------------------
// DELETE /rooms/{room_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/rooms/{room_id}",
    tag = "Rooms",
    security(("bearer" = [])),
    params(
        ("room_id" = i32, Path, description = "Room ID"),
    ),
    responses(
        (status = 204, description = "Room and its messages deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Room not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_room(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(room_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let room = state
        .store
        .room(room_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Room not found"))?;

    unlink_then_delete(
        state.store.as_ref(),
        "room",
        OrderKey::Rooms {
            category_id: room.category_id,
        },
        room.id,
        || state.store.delete_room(room.id),
    )
    .await?;

    state.hub.broadcast(ChangeEvent::RoomDeleted {
        room_id: room.id,
        category_id: room.category_id,
    });
    logs::record(
        &state,
        LogType::RoomDeleted,
        principal.id(),
        format!("{} deleted room {}", principal.member.display_name, room.name),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
