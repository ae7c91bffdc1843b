use axum::{
    Json,
    extract::{Path, Query, State},
    http::HeaderMap,
};
use std::sync::Arc;

use super::auth::caller_claims;
use super::{
    ApiError, ApiResponse, AppState, CreateUserRequest, DeleteQuery, ListQuery, RegisterRequest,
    StatusResponse, UserDto,
};
use crate::auth::policy;
use crate::db::NewUser;

/// POST /api/register
/// Open self-registration; always creates an ordinary active account.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    validate_new_account(&payload.email, &payload.username, &payload.password)?;

    let new = NewUser {
        email: payload.email,
        username: payload.username,
        group: payload.group,
        password: payload.password,
        is_superuser: false,
        is_active: true,
    };

    let created = state
        .store()
        .create_user(&new, &state.config.security)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Failed to create user: {e}")))?
        .ok_or_else(ApiError::email_taken)?;

    tracing::info!(user_id = created.id, "Registered user");

    Ok(Json(ApiResponse::success(created.into())))
}

/// POST /api/users/create
/// Admin-create: requires superuser claims; may grant the superuser flag
/// and set the active flag on the new account.
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let claims = caller_claims(&state, &headers)?;
    policy::require_superuser(&claims)?;

    validate_new_account(&payload.email, &payload.username, &payload.password)?;

    let new = NewUser {
        email: payload.email,
        username: payload.username,
        group: payload.group,
        password: payload.password,
        is_superuser: payload.is_superuser,
        is_active: payload.is_active,
    };

    let created = state
        .store()
        .create_user(&new, &state.config.security)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Failed to create user: {e}")))?
        .ok_or_else(ApiError::email_taken)?;

    tracing::info!(
        user_id = created.id,
        created_by = claims.id,
        is_superuser = created.is_superuser,
        "Created user"
    );

    Ok(Json(ApiResponse::success(created.into())))
}

/// POST /api/users
/// Page through users, ordered by id ascending.
pub async fn list_users(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<UserDto>>>, ApiError> {
    let users = state
        .store()
        .list_users(query.skip, query.limit)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Failed to list users: {e}")))?;

    Ok(Json(ApiResponse::success(
        users.into_iter().map(UserDto::from).collect(),
    )))
}

/// POST /api/users/{id}
pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    let user = state
        .store()
        .get_user(id)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::user_not_found(id))?;

    Ok(Json(ApiResponse::success(user.into())))
}

/// POST /api/users/delete?user_id=<id>
/// Self-delete needs no privilege; deleting anyone else does. With no
/// `user_id` the caller deletes their own account.
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<ApiResponse<StatusResponse>>, ApiError> {
    let claims = caller_claims(&state, &headers)?;
    let target = policy::resolve_delete_target(&claims, query.user_id)?;

    let deleted = state
        .store()
        .delete_user(target)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Failed to delete user: {e}")))?;

    if !deleted {
        return Err(ApiError::DeleteFailed("Can't delete user".to_string()));
    }

    tracing::info!(user_id = target, deleted_by = claims.id, "Deleted user");

    Ok(Json(ApiResponse::success(StatusResponse { status: "ok" })))
}

fn validate_new_account(email: &str, username: &str, password: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }
    Ok(())
}
