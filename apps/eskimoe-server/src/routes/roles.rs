//! Role CRUD endpoints and the server's role ordering.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch};
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::ToSchema;

use super::ordering::{complete_or_compensate, unlink_then_delete};
use super::server::settings;
use super::{logs, required_text};
use crate::auth::middleware::Authenticated;
use crate::db::store::OrderKey;
use crate::error::{ApiError, ApiErrorBody};
use crate::gateway::events::ChangeEvent;
use crate::models::log::LogType;
use crate::models::role::{NewRole, Role};
use crate::models::server::ServerSettings;
use crate::permissions::{self, Permission, Permissions, Principal};
use crate::AppState;

pub const MAX_ROLE_NAME_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/roles", get(list_roles).post(create_role))
        .route("/roles/{role_id}", patch(update_role).delete(delete_role))
}

/// All roles in the server's role order.
pub(crate) async fn ordered_roles(
    state: &AppState,
    server: &ServerSettings,
) -> Result<Vec<Role>, ApiError> {
    let mut roles = state.store.list_roles().await?;
    server.role_order.sort_by_order(&mut roles, |role| role.id);
    Ok(roles)
}

fn guard_administrator(principal: &Principal, permissions: Permissions) -> Result<(), ApiError> {
    if permissions.contains(Permission::Administrator) && !principal.is_owner {
        return Err(ApiError::forbidden(
            "Only the owner can manage roles carrying administrator",
        ));
    }
    Ok(())
}

async fn ensure_name_free(state: &AppState, name: &str, except: Option<i32>) -> Result<(), ApiError> {
    if let Some(existing) = state.store.role_by_name(name).await? {
        if Some(existing.id) != except {
            return Err(ApiError::conflict(format!("A role named {name} already exists")));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// GET /roles
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Roles in display order", body = [Role]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_roles(
    Authenticated(_): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<Role>>, ApiError> {
    let server = settings(&state).await?;
    Ok(Json(ordered_roles(&state, &server).await?))
}

// ---------------------------------------------------------------------------
// POST /roles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<Vec<Permission>>)]
    pub permissions: Option<Permissions>,
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    security(("bearer" = [])),
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created", body = Role),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 409, description = "Role name taken", body = ApiErrorBody),
    ),
)]
pub async fn create_role(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Json(body): Json<CreateRoleRequest>,
) -> Result<(StatusCode, Json<Role>), ApiError> {
    permissions::require(&principal, Permission::ManageRoles)?;

    let name = required_text("name", body.name.as_deref(), MAX_ROLE_NAME_LEN)?;
    let permissions = body.permissions.unwrap_or_else(Permissions::empty);
    guard_administrator(&principal, permissions)?;
    ensure_name_free(&state, &name, None).await?;

    let role = state
        .store
        .create_role(NewRole {
            name,
            permissions,
            system_role: false,
        })
        .await?;
    complete_or_compensate(
        "role",
        role.id,
        state.store.link_ordered(OrderKey::Roles, role.id, None),
        || state.store.delete_role(role.id),
    )
    .await?;

    state.hub.broadcast(ChangeEvent::RoleCreated(role.clone()));
    logs::record(
        &state,
        LogType::RoleCreated,
        principal.id(),
        format!("{} created role {}", principal.member.display_name, role.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(role)))
}

// ---------------------------------------------------------------------------
// PATCH /roles/{role_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateRoleRequest {
    pub name: Option<String>,
    #[schema(value_type = Option<Vec<Permission>>)]
    pub permissions: Option<Permissions>,
}

#[utoipa::path(
    patch,
    path = "/roles/{role_id}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("role_id" = i32, Path, description = "Role ID"),
    ),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = Role),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role not found", body = ApiErrorBody),
        (status = 409, description = "Role name taken", body = ApiErrorBody),
    ),
)]
pub async fn update_role(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(role_id): Path<i32>,
    Json(body): Json<UpdateRoleRequest>,
) -> Result<Json<Role>, ApiError> {
    permissions::require(&principal, Permission::ManageRoles)?;

    let current = state
        .store
        .role(role_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;
    guard_administrator(&principal, current.permissions)?;

    let mut role = current.clone();
    if let Some(raw) = body.name.as_deref() {
        let name = required_text("name", Some(raw), MAX_ROLE_NAME_LEN)?;
        if name != role.name {
            if role.system_role {
                return Err(ApiError::forbidden("The default role cannot be renamed"));
            }
            ensure_name_free(&state, &name, Some(role.id)).await?;
            role.name = name;
        }
    }
    if let Some(permissions) = body.permissions {
        guard_administrator(&principal, permissions)?;
        role.permissions = permissions;
    }

    if role == current {
        return Ok(Json(role));
    }
    let role = state.store.update_role(&role).await?;

    state.hub.broadcast(ChangeEvent::RoleUpdated(role.clone()));
    logs::record(
        &state,
        LogType::RoleUpdated,
        principal.id(),
        format!("{} updated role {}", principal.member.display_name, role.name),
    )
    .await;

    Ok(Json(role))
}

// ---------------------------------------------------------------------------
// DELETE /roles/{role_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/roles/{role_id}",
    tag = "Roles",
    security(("bearer" = [])),
    params(
        ("role_id" = i32, Path, description = "Role ID"),
    ),
    responses(
        (status = 204, description = "Role deleted and unassigned"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Role not found", body = ApiErrorBody),
    ),
)]
pub async fn delete_role(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(role_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    permissions::require(&principal, Permission::ManageRoles)?;

    let role = state
        .store
        .role(role_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Role not found"))?;
    if role.system_role {
        return Err(ApiError::forbidden("The default role cannot be deleted"));
    }
    guard_administrator(&principal, role.permissions)?;

    unlink_then_delete(
        state.store.as_ref(),
        "role",
        OrderKey::Roles,
        role.id,
        || state.store.delete_role(role.id),
    )
    .await?;

    state.hub.broadcast(ChangeEvent::RoleDeleted { role_id: role.id });
    logs::record(
        &state,
        LogType::RoleDeleted,
        principal.id(),
        format!("{} deleted role {}", principal.member.display_name, role.name),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}
