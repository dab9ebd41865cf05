//! Admin API handlers
//!
//! Mutations carry admin credentials in the body; read views take an
//! admin bearer token.

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AdminUser;
use crate::error::ApiResult;
use crate::loan::Decision;
use crate::models::{ApiResponse, FlaggedAccount, UserResponse};
use crate::services::admin::{ActivityEntry, FlagAction, FlagUserRequest, KycReviewRequest};
use crate::state::AppState;

/// PATCH /admin/kyc/:user_id/approve
pub async fn review_kyc(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<KycReviewRequest>,
) -> ApiResult<Json<ApiResponse<UserResponse>>> {
    req.validate()?;
    let user = state
        .admin_service
        .review_kyc(user_id, &req.credentials, req.decision)
        .await?;
    let message = match req.decision {
        Decision::Approve => "KYC approved successfully",
        Decision::Reject => "KYC rejected successfully",
    };
    Ok(Json(ApiResponse::with_message(user, message)))
}

/// PATCH /admin/flag-user/:user_id
pub async fn flag_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Json(req): Json<FlagUserRequest>,
) -> ApiResult<Json<ApiResponse<FlaggedAccount>>> {
    req.validate()?;
    let account = state
        .admin_service
        .set_flag(user_id, &req.credentials, req.action)
        .await?;
    let message = match req.action {
        FlagAction::Flag => "User flagged successfully",
        FlagAction::Unflag => "User unflagged successfully",
    };
    Ok(Json(ApiResponse::with_message(account, message)))
}

/// GET /admin/flagged
pub async fn flagged_accounts(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<Vec<FlaggedAccount>>>> {
    let accounts = state.admin_service.flagged_accounts().await?;
    Ok(Json(ApiResponse::ok(accounts)))
}

/// GET /admin/activity - Disbursements and repayments, newest first
pub async fn activity_feed(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<Vec<ActivityEntry>>>> {
    let feed = state.admin_service.activity_feed().await?;
    Ok(Json(ApiResponse::ok(feed)))
}
