//! User-related API handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::models::{ApiResponse, UserResponse};
use crate::state::AppState;

/// GET /users - All accounts, newest first
pub async fn list_users(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<UserResponse>>>> {
    let users = state.auth_service.list_users().await?;
    Ok(Json(ApiResponse::ok(users)))
}

/// GET /users/:id
pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    let user = state.auth_service.get_user(user_id).await?;
    Ok(Json(ApiResponse::ok(user)))
}
