//! Loan API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use super::AdminUser;
use crate::error::ApiResult;
use crate::loan::{
    ActiveLoanView, ApplyLoanRequest, CategoryShare, GroupedLoanHistory, Loan,
    LoanApplicationView, LoanHistoryEntry, LoanRepayment, RepayLoanRequest, ReviewLoanRequest,
    ScheduleEntry, UserLoanTotal,
};
use crate::models::ApiResponse;
use crate::services::credit_ledger::CreditSummary;
use crate::state::AppState;

/// POST /loans/apply - Submit an application
pub async fn apply_loan(
    State(state): State<AppState>,
    Json(req): Json<ApplyLoanRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Loan>>)> {
    req.validate()?;
    let loan = state.loan_service.apply_loan(req).await?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::with_message(loan, "Loan application submitted")),
    ))
}

/// GET /loans - Every application (admin token)
pub async fn list_applications(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> ApiResult<Json<ApiResponse<Vec<LoanApplicationView>>>> {
    let loans = state.loan_service.all_applications().await?;
    Ok(Json(ApiResponse::ok(loans)))
}

/// GET /loans/:id
pub async fn get_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = state.loan_service.get_loan(loan_id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}

/// PATCH /loans/:id/approve - Approve or reject a pending loan
pub async fn approve_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<ReviewLoanRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    req.validate()?;
    let loan = state.loan_service.approve_loan(loan_id, req).await?;
    let message = format!("Loan {} successfully", loan.status);
    Ok(Json(ApiResponse::with_message(loan, message)))
}

/// POST /loans/:id/repay
pub async fn repay_loan(
    State(state): State<AppState>,
    Path(loan_id): Path<Uuid>,
    Json(req): Json<RepayLoanRequest>,
) -> ApiResult<Json<ApiResponse<Loan>>> {
    let loan = state.loan_service.repay_loan(loan_id, req).await?;
    Ok(Json(ApiResponse::with_message(loan, "Repayment recorded")))
}

/// GET /loans/history/:user_id
pub async fn loan_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<LoanHistoryEntry>>>> {
    let history = state.loan_service.loan_history(user_id).await?;
    Ok(Json(ApiResponse::ok(history)))
}

/// GET /loans/history/grouped/:user_id
pub async fn grouped_history(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<GroupedLoanHistory>>> {
    let history = state.loan_service.grouped_history(user_id).await?;
    Ok(Json(ApiResponse::ok(history)))
}

/// GET /loans/user/:user_id
pub async fn loans_by_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<Loan>>>> {
    let loans = state.loan_service.loans_by_user(user_id).await?;
    Ok(Json(ApiResponse::ok(loans)))
}

/// GET /loans/category/:category
pub async fn loans_by_category(
    State(state): State<AppState>,
    Path(category): Path<String>,
) -> ApiResult<Json<ApiResponse<Vec<Loan>>>> {
    let loans = state.loan_service.loans_by_category(&category).await?;
    Ok(Json(ApiResponse::ok(loans)))
}

/// GET /loans/stats/category
pub async fn category_stats(
    State(state): State<AppState>,
) -> ApiResult<Json<ApiResponse<Vec<CategoryShare>>>> {
    let stats = state.loan_service.category_stats().await?;
    Ok(Json(ApiResponse::ok(stats)))
}

/// GET /loans/stats/user-total/:user_id
pub async fn user_total(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<UserLoanTotal>>> {
    let total = state.loan_service.user_total(user_id).await?;
    Ok(Json(ApiResponse::ok(total)))
}

/// GET /loans/transactions/:user_id - Credit usage and repayments
pub async fn credit_summary(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<CreditSummary>>> {
    let summary = state.loan_service.credit_summary(user_id).await?;
    Ok(Json(ApiResponse::ok(summary)))
}

/// GET /loans/repayment/history/:loan_id
pub async fn repayment_history(
    State(state): State<AppState>,
    Path(loan_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<LoanRepayment>>>> {
    let repayments = state.loan_service.repayment_history(loan_id).await?;
    Ok(Json(ApiResponse::ok(repayments)))
}

/// GET /loans/schedule/:user_id
pub async fn repayment_schedule(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<Vec<ScheduleEntry>>>> {
    let schedule = state.loan_service.repayment_schedule(user_id).await?;
    Ok(Json(ApiResponse::ok(schedule)))
}

/// GET /loans/approved/:user_id
pub async fn active_loan(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<Json<ApiResponse<ActiveLoanView>>> {
    let loan = state.loan_service.active_loan(user_id).await?;
    Ok(Json(ApiResponse::ok(loan)))
}
