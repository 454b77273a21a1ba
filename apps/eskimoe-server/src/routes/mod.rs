pub mod categories;
pub mod health;
pub mod invites;
pub mod logs;
pub mod members;
pub mod messages;
pub(crate) mod ordering;
pub mod roles;
pub mod rooms;
pub mod server;

use axum::Router;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::ApiError;
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(server::router())
        .merge(members::router())
        .merge(categories::router())
        .merge(rooms::router())
        .merge(messages::router())
        .merge(roles::router())
        .merge(invites::router())
        .merge(logs::router())
        .merge(crate::gateway::server::router())
}

/// Trims `value` and checks it is present and at most `max` characters.
pub(crate) fn required_text(field: &str, value: Option<&str>, max: usize) -> Result<String, ApiError> {
    let value = value.map(str::trim).unwrap_or_default();
    if value.is_empty() {
        return Err(ApiError::field(field, format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(ApiError::field(
            field,
            format!("{field} must be {max} characters or fewer"),
        ));
    }
    Ok(value.to_string())
}

/// Like [`required_text`] but an absent value passes through and an empty
/// one is allowed.
pub(crate) fn optional_text(
    field: &str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, ApiError> {
    let Some(value) = value.map(str::trim) else {
        return Ok(None);
    };
    if value.chars().count() > max {
        return Err(ApiError::field(
            field,
            format!("{field} must be {max} characters or fewer"),
        ));
    }
    Ok(Some(value.to_string()))
}

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        // Health
        health::health,
        // Server
        server::get_server,
        // Members
        members::join,
        members::leave,
        members::get_me,
        members::update_me,
        members::list_members,
        members::get_member,
        members::kick_member,
        members::ban_member,
        members::unban_member,
        members::set_member_roles,
        // Categories
        categories::list_categories,
        categories::create_category,
        categories::update_category,
        categories::delete_category,
        categories::reorder_categories,
        // Rooms
        rooms::create_room,
        rooms::update_room,
        rooms::delete_room,
        // Messages
        messages::list_messages,
        messages::send_message,
        messages::edit_message,
        messages::delete_message,
        messages::bulk_delete_messages,
        // Reactions
        messages::add_reaction,
        messages::remove_reaction,
        // Roles
        roles::list_roles,
        roles::create_role,
        roles::update_role,
        roles::delete_role,
        // Invites
        invites::list_invites,
        invites::create_invite,
        invites::delete_invite,
        // Logs
        logs::list_logs,
    ),
    components(
        schemas(
            // Error types
            crate::error::ApiErrorBody,
            crate::error::ApiErrorDetail,
            crate::error::FieldError,
            // Models
            crate::permissions::Permission,
            crate::models::member::Member,
            crate::models::member::MemberStatus,
            crate::models::role::Role,
            crate::models::category::Category,
            crate::models::category::CategoryWithRooms,
            crate::models::room::Room,
            crate::models::room::RoomType,
            crate::models::message::Message,
            crate::models::reaction::ServerReaction,
            crate::models::reaction::MessageReaction,
            crate::models::invite::Invite,
            crate::models::log::LogEntry,
            crate::models::log::LogType,
            crate::models::server::ServerMode,
            // Route request/response types
            health::HealthResponse,
            server::ServerResponse,
            server::ServerSnapshot,
            members::JoinRequest,
            members::JoinResponse,
            members::UpdateMeRequest,
            members::SetRolesRequest,
            categories::CreateCategoryRequest,
            categories::UpdateCategoryRequest,
            categories::ReorderRequest,
            rooms::CreateRoomRequest,
            rooms::UpdateRoomRequest,
            messages::MessageWithReactions,
            messages::SendMessageRequest,
            messages::EditMessageRequest,
            messages::BulkDeleteRequest,
            messages::BulkDeleteResponse,
            roles::CreateRoleRequest,
            roles::UpdateRoleRequest,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check"),
        (name = "Server", description = "Server information"),
        (name = "Members", description = "Membership and moderation"),
        (name = "Categories", description = "Category management"),
        (name = "Rooms", description = "Room management"),
        (name = "Messages", description = "Messaging"),
        (name = "Reactions", description = "Message reactions"),
        (name = "Roles", description = "Role management"),
        (name = "Invites", description = "Invite management"),
        (name = "Logs", description = "Server log"),
    )
)]
pub struct ApiDoc;
