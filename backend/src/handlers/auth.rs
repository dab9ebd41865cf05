//! Authentication HTTP handlers

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use super::AuthenticatedUser;
use crate::error::ApiResult;
use crate::models::{
    ApiResponse, AuthTokenResponse, LoginRequest, PasswordResetRequest, RegisterRequest,
    ResetPasswordRequest, UserResponse,
};
use crate::state::AppState;

/// POST /auth/register - Create an account (KYC pending)
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<UserResponse>>)> {
    req.validate()?;
    let user = state.auth_service.register(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(user, "Registration successful")),
    ))
}

/// POST /auth/login - Exchange email/phone and password for an access token
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthTokenResponse>>> {
    req.validate()?;
    let tokens = state.auth_service.login(req).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// POST /auth/admin/login - Same as login, admin accounts only
pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<AuthTokenResponse>>> {
    req.validate()?;
    let tokens = state.auth_service.admin_login(req).await?;
    Ok(Json(ApiResponse::ok(tokens)))
}

/// GET /auth/me - Current authenticated user
pub async fn get_current_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    let profile = state.auth_service.profile(user.user_id).await?;
    Ok(Json(ApiResponse::ok(profile)))
}

/// POST /auth/request-password-reset
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    req.validate()?;
    state.auth_service.request_password_reset(&req.email).await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "If that email is registered, a reset link has been sent.",
    )))
}

/// POST /auth/reset-password
pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<()>>> {
    req.validate()?;
    state
        .auth_service
        .reset_password(&req.token, &req.new_password)
        .await?;
    Ok(Json(ApiResponse::with_message(
        (),
        "Password has been reset successfully.",
    )))
}
