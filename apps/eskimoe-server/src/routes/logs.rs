//! Server log listing and recording.

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::auth::middleware::Authenticated;
use crate::error::{ApiError, ApiErrorBody};
use crate::models::log::{LogEntry, LogType, NewLogEntry};
use crate::permissions::{self, Permission};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/logs", get(list_logs))
}

/// Appends a server log entry. A failed write is logged and swallowed: the
/// change it describes has already been applied and announced.
pub(crate) async fn record(
    state: &AppState,
    log_type: LogType,
    member_id: i32,
    content: impl Into<String>,
) {
    let entry = NewLogEntry {
        log_type,
        content: content.into(),
        member_id,
    };
    if let Err(err) = state.store.append_log(entry).await {
        tracing::warn!(%log_type, member_id, %err, "failed to record server log");
    }
}

// ---------------------------------------------------------------------------
// GET /logs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct LogQuery {
    /// Max entries to return (1-100, default 50).
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/logs",
    tag = "Logs",
    security(("bearer" = [])),
    params(LogQuery),
    responses(
        (status = 200, description = "Newest log entries first", body = [LogEntry]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn list_logs(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> Result<Json<Vec<LogEntry>>, ApiError> {
    permissions::require(&principal, Permission::ViewLogs)?;

    let limit = query.limit.unwrap_or(50).clamp(1, 100);
    let entries = state.store.list_logs(limit).await?;
    Ok(Json(entries))
}
