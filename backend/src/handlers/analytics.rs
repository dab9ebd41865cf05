//! Analytics API handlers

use axum::{extract::State, Json};

use super::AdminUser;
use crate::error::ApiResult;
use crate::models::ApiResponse;
use crate::services::analytics::DashboardSummary;
use crate::state::AppState;

/// GET /analytics/dashboard-summary
pub async fn dashboard_summary(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<DashboardSummary>>> {
    let summary = state.analytics_service.dashboard_summary().await?;
    Ok(Json(ApiResponse::ok(summary)))
}
