//! Server information and the signed-in snapshot.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use utoipa::ToSchema;

use super::{categories, roles};
use crate::auth::middleware::RequestContext;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::category::CategoryWithRooms;
use crate::models::member::Member;
use crate::models::reaction::ServerReaction;
use crate::models::role::Role;
use crate::models::server::{ServerMode, ServerSettings};
use crate::permissions::{Permission, Permissions};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/", get(get_server))
}

/// Loads the singleton server record, which startup always creates.
pub(crate) async fn settings(state: &AppState) -> Result<ServerSettings, ApiError> {
    state
        .store
        .load_server()
        .await?
        .ok_or_else(|| ApiError::internal("Server is not initialised"))
}

// ---------------------------------------------------------------------------
// GET /
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct ServerResponse {
    pub name: String,
    pub message: String,
    pub mode: ServerMode,
    pub version: String,
    /// Present when the request carries a valid member token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<ServerSnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ServerSnapshot {
    pub me: Member,
    pub is_owner: bool,
    #[schema(value_type = Vec<Permission>)]
    pub permissions: Permissions,
    pub categories: Vec<CategoryWithRooms>,
    pub roles: Vec<Role>,
    pub members: Vec<Member>,
    pub reactions: Vec<ServerReaction>,
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Server",
    responses(
        (status = 200, description = "Server information", body = ServerResponse),
        (status = 500, description = "Server is not initialised", body = ApiErrorBody),
    ),
)]
pub async fn get_server(
    context: RequestContext,
    State(state): State<AppState>,
) -> Result<Json<ServerResponse>, ApiError> {
    let server = settings(&state).await?;

    let snapshot = match context.principal {
        Some(principal) => {
            let categories = categories::category_tree(&state, &server).await?;
            let roles = roles::ordered_roles(&state, &server).await?;
            let members = state.store.list_members().await?;
            let reactions = state.store.list_server_reactions().await?;
            let permissions = if principal.is_owner {
                Permission::ALL.into_iter().collect()
            } else {
                principal.permissions()
            };
            Some(ServerSnapshot {
                is_owner: principal.is_owner,
                permissions,
                me: principal.member,
                categories,
                roles,
                members,
                reactions,
            })
        }
        None => None,
    };

    Ok(Json(ServerResponse {
        name: server.name,
        message: server.message,
        mode: server.mode,
        version: env!("CARGO_PKG_VERSION").to_string(),
        snapshot,
    }))
}
