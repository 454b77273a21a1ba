//! Bearer-token resolution into the acting principal.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::tokens;
use crate::error::ApiError;
use crate::permissions::Principal;
use crate::AppState;

/// Per-request context carrying the resolved principal, if any.
///
/// Never rejects: a missing, malformed or unknown token yields an
/// anonymous context. Handlers that need a member call [`require`].
///
/// [`require`]: RequestContext::require
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub principal: Option<Principal>,
}

impl RequestContext {
    pub fn require(&self) -> Result<&Principal, ApiError> {
        self.principal.as_ref().ok_or_else(unauthenticated)
    }

    pub fn into_principal(self) -> Result<Principal, ApiError> {
        self.principal.ok_or_else(unauthenticated)
    }
}

fn unauthenticated() -> ApiError {
    ApiError::unauthorized("A valid member token is required")
}

impl FromRequestParts<AppState> for RequestContext {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(Self::default());
        };
        let principal = resolve_principal(state, token).await?;
        Ok(Self { principal })
    }
}

/// Extractor for handlers that always need a member. Rejects with 401.
#[derive(Debug, Clone)]
pub struct Authenticated(pub Principal);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let context = RequestContext::from_request_parts(parts, state).await?;
        context.into_principal().map(Authenticated)
    }
}

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Looks up the member owning `token` and loads its effective roles.
///
/// Members who left or were banned have no active token; a stale match is
/// treated as unknown.
pub async fn resolve_principal(state: &AppState, token: &str) -> Result<Option<Principal>, ApiError> {
    let hash = tokens::hash_token(token);
    let Some(member) = state.store.member_by_token_hash(&hash).await? else {
        return Ok(None);
    };
    if !member.status.is_present() {
        return Ok(None);
    }

    let mut roles = state.store.roles_by_ids(&member.role_ids).await?;
    if !roles.iter().any(|role| role.system_role) {
        if let Some(default) = state.store.default_role().await? {
            roles.push(default);
        }
    }

    let is_owner = member.unique_id == state.config.owner_id;
    Ok(Some(Principal {
        member,
        roles,
        is_owner,
    }))
}
