//! Membership: joining, leaving, profiles and moderation.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::logs;
use super::{optional_text, required_text};
use crate::auth::middleware::Authenticated;
use crate::auth::tokens;
use crate::error::{ApiError, ApiErrorBody, FieldError};
use crate::gateway::events::ChangeEvent;
use crate::models::invite::Invite;
use crate::models::log::LogType;
use crate::models::member::{Member, MemberStatus, NewMember};
use crate::models::server::ServerMode;
use crate::permissions::{self, Permission, Principal};
use crate::AppState;

pub const MAX_UNIQUE_ID_LEN: usize = 128;
pub const MAX_DISPLAY_NAME_LEN: usize = 64;
pub const MAX_ABOUT_LEN: usize = 256;
pub const MAX_PRONOUNS_LEN: usize = 32;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/join", post(join))
        .route("/leave", post(leave))
        .route("/me", get(get_me).patch(update_me))
        .route("/members", get(list_members))
        .route("/members/{unique_id}", get(get_member))
        .route("/members/{member_id}/kick", post(kick_member))
        .route(
            "/members/{member_id}/ban",
            post(ban_member).delete(unban_member),
        )
        .route("/members/{member_id}/roles", put(set_member_roles))
}

// ---------------------------------------------------------------------------
// POST /join
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct JoinRequest {
    pub unique_id: Option<String>,
    pub unique_token: Option<String>,
    pub display_name: Option<String>,
    /// Required when the server is invite-only.
    pub invite: Option<String>,
    /// Required when the server is passphrase-protected.
    pub passphrase: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub member: Member,
    /// Bearer token for later requests. Only returned here.
    pub token: String,
}

#[utoipa::path(
    post,
    path = "/join",
    tag = "Members",
    request_body = JoinRequest,
    responses(
        (status = 201, description = "Joined the server", body = JoinResponse),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 403, description = "Banned or admission refused", body = ApiErrorBody),
        (status = 409, description = "Already a member", body = ApiErrorBody),
    ),
)]
pub async fn join(
    State(state): State<AppState>,
    Json(body): Json<JoinRequest>,
) -> Result<(StatusCode, Json<JoinResponse>), ApiError> {
    let mut errors = Vec::new();
    let unique_id = collect(
        &mut errors,
        required_text("unique_id", body.unique_id.as_deref(), MAX_UNIQUE_ID_LEN),
    );
    let unique_token = collect(
        &mut errors,
        required_text("unique_token", body.unique_token.as_deref(), 512),
    );
    let display_name = collect(
        &mut errors,
        required_text(
            "display_name",
            body.display_name.as_deref(),
            MAX_DISPLAY_NAME_LEN,
        ),
    );
    if !errors.is_empty() {
        return Err(ApiError::validation(errors));
    }
    let (Some(unique_id), Some(unique_token), Some(display_name)) =
        (unique_id, unique_token, display_name)
    else {
        return Err(ApiError::bad_request("Missing join fields"));
    };

    let is_owner = unique_id == state.config.owner_id;
    if is_owner && unique_token != state.config.owner_token {
        return Err(ApiError::forbidden("Owner token does not match"));
    }

    let existing = state.store.member_by_unique_id(&unique_id).await?;
    if let Some(member) = &existing {
        match member.status {
            MemberStatus::Banned => {
                return Err(ApiError::forbidden("You are banned from this server"));
            }
            MemberStatus::Left => {}
            _ => return Err(ApiError::conflict("Already a member of this server")),
        }
    }

    let claimed = if is_owner {
        None
    } else {
        admit(&state, &body).await?
    };

    let token = tokens::generate_member_token();
    let token_hash = tokens::hash_token(&token);

    let joined = match existing {
        Some(mut member) => {
            member.status = MemberStatus::Online;
            member.token_hash = Some(token_hash);
            member.display_name = display_name;
            state.store.update_member(&member).await
        }
        None => {
            let role_ids = state
                .store
                .default_role()
                .await?
                .map(|role| vec![role.id])
                .unwrap_or_default();
            state
                .store
                .create_member(NewMember {
                    unique_id,
                    token_hash,
                    display_name,
                    role_ids,
                })
                .await
        }
    };

    let member = match joined {
        Ok(member) => member,
        Err(err) => {
            if let Some(invite) = claimed {
                release_invite(&state, invite).await;
            }
            return Err(err.into());
        }
    };

    if let Some(mut invite) = claimed {
        invite.used_by = Some(member.id);
        if let Err(err) = state.store.update_invite(&invite).await {
            tracing::warn!(invite = %invite.code, %err, "failed to record invite use");
        }
        logs::record(
            &state,
            LogType::InviteUsed,
            member.id,
            format!("{} joined with invite {}", member.display_name, invite.code),
        )
        .await;
    }

    tracing::info!(member_id = member.id, unique_id = %member.unique_id, "member joined");
    state.hub.broadcast(ChangeEvent::MemberJoined(member.clone()));

    Ok((StatusCode::CREATED, Json(JoinResponse { member, token })))
}

fn collect(errors: &mut Vec<FieldError>, result: Result<String, ApiError>) -> Option<String> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            errors.extend(err.details.unwrap_or_default());
            None
        }
    }
}

/// Applies the server's admission mode. In invite-only mode the invite is
/// claimed (marked used) and returned so it can be released again if the
/// join fails afterwards.
async fn admit(state: &AppState, body: &JoinRequest) -> Result<Option<Invite>, ApiError> {
    let server = state
        .store
        .load_server()
        .await?
        .ok_or_else(|| ApiError::internal("Server is not initialised"))?;

    match server.mode {
        ServerMode::Open => Ok(None),
        ServerMode::Passphrase => {
            let given = body.passphrase.as_deref().unwrap_or_default();
            match server.passphrase.as_deref() {
                Some(expected) if expected == given => Ok(None),
                _ => Err(ApiError::forbidden("Incorrect passphrase")),
            }
        }
        ServerMode::InviteOnly => {
            let code = body
                .invite
                .as_deref()
                .map(str::trim)
                .filter(|code| !code.is_empty())
                .ok_or_else(|| ApiError::forbidden("An invite is required to join"))?;
            let mut invite = state
                .store
                .invite_by_code(code)
                .await?
                .filter(|invite| !invite.used)
                .ok_or_else(|| ApiError::forbidden("Invite is invalid or already used"))?;
            invite.used = true;
            let invite = state.store.update_invite(&invite).await?;
            Ok(Some(invite))
        }
    }
}

async fn release_invite(state: &AppState, mut invite: Invite) {
    invite.used = false;
    invite.used_by = None;
    if let Err(err) = state.store.update_invite(&invite).await {
        tracing::warn!(invite = %invite.code, %err, "failed to release invite after failed join");
    }
}

// ---------------------------------------------------------------------------
// POST /leave
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/leave",
    tag = "Members",
    security(("bearer" = [])),
    responses(
        (status = 204, description = "Left the server"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn leave(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
) -> Result<StatusCode, ApiError> {
    let mut member = principal.member;
    member.status = MemberStatus::Left;
    member.token_hash = None;
    let member = state.store.update_member(&member).await?;

    tracing::info!(member_id = member.id, "member left");
    state.hub.broadcast(ChangeEvent::MemberLeft(member));

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// GET /me, PATCH /me
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/me",
    tag = "Members",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "The calling member", body = Member),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn get_me(Authenticated(principal): Authenticated) -> Json<Member> {
    Json(principal.member)
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateMeRequest {
    pub display_name: Option<String>,
    pub about: Option<String>,
    pub pronouns: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/me",
    tag = "Members",
    security(("bearer" = [])),
    request_body = UpdateMeRequest,
    responses(
        (status = 200, description = "Profile updated", body = Member),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn update_me(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<Member>, ApiError> {
    let display_name = match body.display_name.as_deref() {
        Some(raw) => Some(required_text("display_name", Some(raw), MAX_DISPLAY_NAME_LEN)?),
        None => None,
    };
    let about = optional_text("about", body.about.as_deref(), MAX_ABOUT_LEN)?;
    let pronouns = optional_text("pronouns", body.pronouns.as_deref(), MAX_PRONOUNS_LEN)?;

    let mut member = principal.member.clone();
    if let Some(name) = display_name {
        if name != member.display_name {
            permissions::require(&principal, Permission::ChangeName)?;
            member.display_name = name;
        }
    }
    if let Some(about) = about {
        member.about = about;
    }
    if let Some(pronouns) = pronouns {
        member.pronouns = pronouns;
    }

    if member == principal.member {
        return Ok(Json(member));
    }

    let member = state.store.update_member(&member).await?;
    state.hub.broadcast(ChangeEvent::MemberUpdated(member.clone()));

    Ok(Json(member))
}

// ---------------------------------------------------------------------------
// GET /members, GET /members/{unique_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/members",
    tag = "Members",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Every member, past and present", body = [Member]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_members(
    Authenticated(_): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<Member>>, ApiError> {
    Ok(Json(state.store.list_members().await?))
}

#[utoipa::path(
    get,
    path = "/members/{unique_id}",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("unique_id" = String, Path, description = "Member unique id"),
    ),
    responses(
        (status = 200, description = "Member", body = Member),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 404, description = "Member not found", body = ApiErrorBody),
    ),
)]
pub async fn get_member(
    Authenticated(_): Authenticated,
    State(state): State<AppState>,
    Path(unique_id): Path<String>,
) -> Result<Json<Member>, ApiError> {
    let member = state
        .store
        .member_by_unique_id(&unique_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    Ok(Json(member))
}

// ---------------------------------------------------------------------------
// Moderation
// ---------------------------------------------------------------------------

/// Loads the target of a moderation action, refusing the actor themself and
/// the owner.
async fn moderation_target(
    state: &AppState,
    actor: &Principal,
    member_id: i32,
    action: &str,
    done: &str,
) -> Result<Member, ApiError> {
    let target = state
        .store
        .member(member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    if target.id == actor.id() {
        return Err(ApiError::bad_request(format!("You cannot {action} yourself")));
    }
    if target.unique_id == state.config.owner_id {
        return Err(ApiError::forbidden(format!("The owner cannot be {done}")));
    }
    Ok(target)
}

#[utoipa::path(
    post,
    path = "/members/{member_id}/kick",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("member_id" = i32, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member kicked", body = Member),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Member not found", body = ApiErrorBody),
    ),
)]
pub async fn kick_member(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
) -> Result<Json<Member>, ApiError> {
    permissions::require(&principal, Permission::KickMembers)?;

    let mut target = moderation_target(&state, &principal, member_id, "kick", "kicked").await?;
    if !target.status.is_present() {
        return Err(ApiError::not_found("Member is not in the server"));
    }

    target.status = MemberStatus::Left;
    target.token_hash = None;
    let target = state.store.update_member(&target).await?;

    state.hub.broadcast(ChangeEvent::MemberKicked(target.clone()));
    logs::record(
        &state,
        LogType::MemberKicked,
        principal.id(),
        format!("{} kicked {}", principal.member.display_name, target.display_name),
    )
    .await;

    Ok(Json(target))
}

#[utoipa::path(
    post,
    path = "/members/{member_id}/ban",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("member_id" = i32, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member banned", body = Member),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Member not found", body = ApiErrorBody),
        (status = 409, description = "Already banned", body = ApiErrorBody),
    ),
)]
pub async fn ban_member(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
) -> Result<Json<Member>, ApiError> {
    permissions::require(&principal, Permission::BanMembers)?;

    let mut target = moderation_target(&state, &principal, member_id, "ban", "banned").await?;
    if target.status == MemberStatus::Banned {
        return Err(ApiError::conflict("Member is already banned"));
    }

    target.status = MemberStatus::Banned;
    target.token_hash = None;
    let target = state.store.update_member(&target).await?;

    state.hub.broadcast(ChangeEvent::MemberBanned(target.clone()));
    logs::record(
        &state,
        LogType::MemberBanned,
        principal.id(),
        format!("{} banned {}", principal.member.display_name, target.display_name),
    )
    .await;

    Ok(Json(target))
}

#[utoipa::path(
    delete,
    path = "/members/{member_id}/ban",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("member_id" = i32, Path, description = "Member ID"),
    ),
    responses(
        (status = 200, description = "Member unbanned", body = Member),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Member not found", body = ApiErrorBody),
        (status = 409, description = "Member is not banned", body = ApiErrorBody),
    ),
)]
pub async fn unban_member(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
) -> Result<Json<Member>, ApiError> {
    permissions::require(&principal, Permission::BanMembers)?;

    let mut target = state
        .store
        .member(member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;
    if target.status != MemberStatus::Banned {
        return Err(ApiError::conflict("Member is not banned"));
    }

    target.status = MemberStatus::Left;
    let target = state.store.update_member(&target).await?;

    state.hub.broadcast(ChangeEvent::MemberUnbanned(target.clone()));
    logs::record(
        &state,
        LogType::MemberUnbanned,
        principal.id(),
        format!("{} unbanned {}", principal.member.display_name, target.display_name),
    )
    .await;

    Ok(Json(target))
}

// ---------------------------------------------------------------------------
// PUT /members/{member_id}/roles
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct SetRolesRequest {
    pub role_ids: Vec<i32>,
}

#[utoipa::path(
    put,
    path = "/members/{member_id}/roles",
    tag = "Members",
    security(("bearer" = [])),
    params(
        ("member_id" = i32, Path, description = "Member ID"),
    ),
    request_body = SetRolesRequest,
    responses(
        (status = 200, description = "Roles replaced", body = Member),
        (status = 400, description = "Unknown role", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Member not found", body = ApiErrorBody),
    ),
)]
pub async fn set_member_roles(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(member_id): Path<i32>,
    Json(body): Json<SetRolesRequest>,
) -> Result<Json<Member>, ApiError> {
    permissions::require(&principal, Permission::ManageRoles)?;

    let mut target = state
        .store
        .member(member_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Member not found"))?;

    let mut requested = body.role_ids;
    requested.sort_unstable();
    requested.dedup();

    let roles = state.store.roles_by_ids(&requested).await?;
    if let Some(unknown) = requested
        .iter()
        .find(|id| !roles.iter().any(|role| role.id == **id))
    {
        return Err(ApiError::field("role_ids", format!("Role {unknown} does not exist")));
    }

    let grants_admin = roles
        .iter()
        .any(|role| role.permissions.contains(Permission::Administrator));
    if grants_admin && !principal.is_owner {
        return Err(ApiError::forbidden(
            "Only the owner can assign administrator roles",
        ));
    }

    if let Some(default) = state.store.default_role().await? {
        if !requested.contains(&default.id) {
            requested.insert(0, default.id);
        }
    }

    let mut current = target.role_ids.clone();
    current.sort_unstable();
    let mut next = requested.clone();
    next.sort_unstable();
    if current == next {
        return Ok(Json(target));
    }
    target.role_ids = requested;
    let target = state.store.update_member(&target).await?;

    state.hub.broadcast(ChangeEvent::MemberUpdated(target.clone()));
    logs::record(
        &state,
        LogType::MemberUpdated,
        principal.id(),
        format!(
            "{} changed the roles of {}",
            principal.member.display_name, target.display_name
        ),
    )
    .await;

    Ok(Json(target))
}
