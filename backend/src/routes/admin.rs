//! Admin route definitions

use axum::{
    routing::{get, patch},
    Router,
};

use crate::handlers::admin;
use crate::state::AppState;

pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/admin/kyc/:user_id/approve", patch(admin::review_kyc))
        .route("/admin/flag-user/:user_id", patch(admin::flag_user))
        .route("/admin/flagged", get(admin::flagged_accounts))
        .route("/admin/activity", get(admin::activity_feed))
}
