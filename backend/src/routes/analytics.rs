//! Analytics route definitions

use axum::{routing::get, Router};

use crate::handlers::analytics::dashboard_summary;
use crate::state::AppState;

pub fn analytics_routes() -> Router<AppState> {
    Router::new().route("/analytics/dashboard-summary", get(dashboard_summary))
}
