//! Category endpoints and the server's category ordering.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, put};
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
use crate::models::category::{Category, CategoryWithRooms, NewCategory};
use crate::models::log::LogType;
use crate::models::server::ServerSettings;
use crate::permissions::{self, Permission};
use crate::AppState;

pub const MAX_CATEGORY_NAME_LEN: usize = 64;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/order", put(reorder_categories))
        .route(
            "/categories/{category_id}",
            patch(update_category).delete(delete_category),
        )
}

/// Every category with its rooms, both in their stored order.
pub(crate) async fn category_tree(
    state: &AppState,
    server: &ServerSettings,
) -> Result<Vec<CategoryWithRooms>, ApiError> {
    let mut categories = state.store.list_categories().await?;
    let rooms = state.store.list_rooms().await?;
    server
        .category_order
        .sort_by_order(&mut categories, |category| category.id);
    Ok(categories
        .into_iter()
        .map(|category| CategoryWithRooms::assemble(category, &rooms))
        .collect())
}

// ---------------------------------------------------------------------------
// GET /categories
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/categories",
    tag = "Categories",
    security(("bearer" = [])),
    responses(
        (status = 200, description = "Categories with their rooms", body = [CategoryWithRooms]),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
    ),
)]
pub async fn list_categories(
    Authenticated(_): Authenticated,
    State(state): State<AppState>,
) -> Result<Json<Vec<CategoryWithRooms>>, ApiError> {
    let server = settings(&state).await?;
    Ok(Json(category_tree(&state, &server).await?))
}

// ---------------------------------------------------------------------------
// POST /categories
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCategoryRequest {
    pub name: Option<String>,
}

#[utoipa::path(
    post,
    path = "/categories",
    tag = "Categories",
    security(("bearer" = [])),
    request_body = CreateCategoryRequest,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn create_category(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Json(body): Json<CreateCategoryRequest>,
) -> Result<(StatusCode, Json<Category>), ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;
    let name = required_text("name", body.name.as_deref(), MAX_CATEGORY_NAME_LEN)?;

    let category = state.store.create_category(NewCategory { name }).await?;
    complete_or_compensate(
        "category",
        category.id,
        state.store.link_ordered(OrderKey::Categories, category.id, None),
        || state.store.delete_category(category.id),
    )
    .await?;

    state.hub.broadcast(ChangeEvent::CategoryCreated(category.clone()));
    logs::record(
        &state,
        LogType::CategoryCreated,
        principal.id(),
        format!("{} created category {}", principal.member.display_name, category.name),
    )
    .await;

    Ok((StatusCode::CREATED, Json(category)))
}

// ---------------------------------------------------------------------------
// PATCH /categories/{category_id}
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateCategoryRequest {
    pub name: Option<String>,
}

#[utoipa::path(
    patch,
    path = "/categories/{category_id}",
    tag = "Categories",
    security(("bearer" = [])),
    params(
        ("category_id" = i32, Path, description = "Category ID"),
    ),
    request_body = UpdateCategoryRequest,
    responses(
        (status = 200, description = "Category updated", body = Category),
        (status = 400, description = "Validation error", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Category not found", body = ApiErrorBody),
    ),
)]
pub async fn update_category(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(category_id): Path<i32>,
    Json(body): Json<UpdateCategoryRequest>,
) -> Result<Json<Category>, ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let mut category = state
        .store
        .category(category_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;

    let Some(raw) = body.name.as_deref() else {
        return Ok(Json(category));
    };
    let name = required_text("name", Some(raw), MAX_CATEGORY_NAME_LEN)?;
    if name == category.name {
        return Ok(Json(category));
    }
    category.name = name;
    let category = state.store.update_category(&category).await?;

    state.hub.broadcast(ChangeEvent::CategoryUpdated(category.clone()));
    logs::record(
        &state,
        LogType::CategoryUpdated,
        principal.id(),
        format!("{} renamed category {} to {}", principal.member.display_name, category.id, category.name),
    )
    .await;

    Ok(Json(category))
}

// ---------------------------------------------------------------------------
// DELETE /categories/{category_id}
// ---------------------------------------------------------------------------

#[utoipa::path(
    delete,
    path = "/categories/{category_id}",
    tag = "Categories",
    security(("bearer" = [])),
    params(
        ("category_id" = i32, Path, description = "Category ID"),
    ),
    responses(
        (status = 204, description = "Category deleted"),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
        (status = 404, description = "Category not found", body = ApiErrorBody),
        (status = 409, description = "Category still has rooms", body = ApiErrorBody),
    ),
)]
pub async fn delete_category(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Path(category_id): Path<i32>,
) -> Result<StatusCode, ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let category = state
        .store
        .category(category_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    let has_rooms = !category.room_order.is_empty()
        || state
            .store
            .list_rooms()
            .await?
            .iter()
            .any(|room| room.category_id == category.id);
    if has_rooms {
        return Err(ApiError::conflict("Move or delete the category's rooms first"));
    }

    unlink_then_delete(
        state.store.as_ref(),
        "category",
        OrderKey::Categories,
        category.id,
        || state.store.delete_category(category.id),
    )
    .await?;

    state.hub.broadcast(ChangeEvent::CategoryDeleted {
        category_id: category.id,
    });
    logs::record(
        &state,
        LogType::CategoryDeleted,
        principal.id(),
        format!("{} deleted category {}", principal.member.display_name, category.name),
    )
    .await;

    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// PUT /categories/order
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, ToSchema)]
pub struct ReorderRequest {
    /// Every category id, in the new display order.
    pub order: Vec<i32>,
}

#[utoipa::path(
    put,
    path = "/categories/order",
    tag = "Categories",
    security(("bearer" = [])),
    request_body = ReorderRequest,
    responses(
        (status = 200, description = "New category order", body = [i32]),
        (status = 400, description = "Order does not match the categories", body = ApiErrorBody),
        (status = 401, description = "Unauthorized", body = ApiErrorBody),
        (status = 403, description = "Forbidden", body = ApiErrorBody),
    ),
)]
pub async fn reorder_categories(
    Authenticated(principal): Authenticated,
    State(state): State<AppState>,
    Json(body): Json<ReorderRequest>,
) -> Result<Json<Vec<i32>>, ApiError> {
    permissions::require(&principal, Permission::ManageRooms)?;

    let current = settings(&state).await?.category_order;
    let order = state
        .store
        .reorder(OrderKey::Categories, body.order)
        .await?
        .map_err(|err| ApiError::field("order", err.to_string()))?;
    if order == current {
        return Ok(Json(order.into()));
    }

    state.hub.broadcast(ChangeEvent::CategoryOrderUpdated {
        category_order: order.clone(),
    });

    Ok(Json(order.into()))
}
