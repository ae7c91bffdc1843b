use axum::{
    Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::{
    AccessResponse, ApiError, ApiResponse, AppState, CredentialsRequest, LoginResponse, UserDto,
};
use crate::auth::Claims;

// ============================================================================
// Middleware
// ============================================================================

/// Gate for protected routes: the request must carry an
/// `Authorization: Bearer <token>` header whose token decodes and whose
/// user still exists. Everything else is a 403 with no further detail.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(token) = extract_bearer_token(&headers) else {
        return Err(ApiError::invalid_token());
    };

    if !state.tokens().verify(&token, state.store()).await {
        return Err(ApiError::invalid_token());
    }

    Ok(next.run(request).await)
}

/// Extract the token from the `Authorization: Bearer` header
fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

/// Decode the caller's claims from the bearer header. Used by handlers
/// behind `auth_middleware` that need to know who is calling.
pub(super) fn caller_claims(state: &AppState, headers: &HeaderMap) -> Result<Claims, ApiError> {
    let token = extract_bearer_token(headers).ok_or_else(ApiError::invalid_token)?;
    state
        .tokens()
        .decode(&token)
        .map_err(|_| ApiError::invalid_token())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth
/// Check credentials and return the matching user. An unknown email and a
/// wrong password are indistinguishable to the caller.
pub async fn authenticate(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<ApiResponse<UserDto>>, ApiError> {
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let user = state
        .store()
        .get_user_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Authentication error: {e}")))?
        .ok_or_else(ApiError::authentication_denied)?;

    let is_valid = state
        .store()
        .verify_user_password(&payload.email, &payload.password)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Authentication error: {e}")))?;

    if !is_valid {
        return Err(ApiError::authentication_denied());
    }

    Ok(Json(ApiResponse::success(user.into())))
}

/// POST /api/token
/// Issue a bearer token. Failed password verification is not an error
/// here: the caller gets the `{"access":"reject"}` sentinel instead.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let user = state
        .store()
        .get_user_by_email(&payload.email)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Login error: {e}")))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    let is_valid = state
        .store()
        .verify_user_password(&payload.email, &payload.password)
        .await
        .map_err(|e| ApiError::DatabaseError(format!("Login error: {e}")))?;

    if !is_valid {
        return Ok(Json(ApiResponse::success(LoginResponse::Rejected {
            access: "reject",
        })));
    }

    let token = state
        .tokens()
        .issue(&user)
        .map_err(|e| ApiError::internal(format!("Failed to issue token: {e}")))?;

    tracing::debug!(user_id = user.id, "Issued token");

    Ok(Json(ApiResponse::success(LoginResponse::Token { token })))
}

/// POST /api/access
/// The verification gate as an endpoint. Reaching the handler means the
/// middleware accepted the token.
pub async fn check_access() -> Json<ApiResponse<AccessResponse>> {
    Json(ApiResponse::success(AccessResponse { access: "success" }))
}
