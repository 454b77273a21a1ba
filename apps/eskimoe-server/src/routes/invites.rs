//! Invite management for invite-only servers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get};
use axum::{Json, Router};

use super::logs;
use crate::auth::middleware::Authenticated;
use crate::auth::tokens;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::invite::{Invite, NewInvite};
use crate::models::log::LogType;
use crate::permissions::{self, Permission};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/invites", get(list_invites).post(create_invite))
        .route("/invites/{code}", delete(delete_invite))
}

// ---------------------------------------------------------------------------
// GET /invites
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/invites",
    tag = "Invites",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "All invites", body = [Invite]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn list_invites(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<Invite>>, ApiError> {
    permissions::require(&principal, Permission::GenerateInvites)?;
    Ok(Json(state.store.list_invites().await?))
}

// ---------------------------------------------------------------------------
// POST /invites
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/invites",
    tag = "Invites",
    security(("bearer" = [])),
    responses(
        (status = 201, description = "Invite generated", body = Invite),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn create_invite(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Invite>), ApiError> {
    permissions::require(&principal, Permission::GenerateInvites)?;

    let invite = state
        .store
        .create_invite(NewInvite {
            code: tokens::generate_invite_code(),
            generated_by: principal.id(),
        })
        .await?;

    logs::record(
        &state,
        LogType::InviteGenerated,
        principal.id(),
        format!("{} generated invite {}", principal.member.display_name, invite.code),
    )
    .await;

    Ok((StatusCode::CREATED, Json(invite)))
}

// ---------------------------------------------------------------------------
// DELETE /invites/{code}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/invites/{code}",
    tag = "Invites",
    security(("bearer" = [])),
    params(
        ("code" = String, Path, description = "Invite code"),
    ),
    responses(
        (status = 204, description = "Invite revoked"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Invite not found", body = ApiErrorBody),
        (status = 409, description = "Invite already used", body = ApiErrorBody),
    ),
)]
pub async fn delete_invite(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    permissions::require(&principal, Permission::GenerateInvites)?;

    let invite = state
        .store
        .invite_by_code(&code)
        .await?
        .ok_or_else(|| ApiError::not_found("Invite not found"))?;
    if invite.used {
        return Err(ApiError::conflict("Used invites cannot be revoked"));
    }

    state.store.delete_invite(invite.id).await?;

    logs::record(
        &state,
        LogType::InviteDeleted,
        principal.id(),
        format!("{} revoked invite {}", principal.member.display_name, invite.code),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
