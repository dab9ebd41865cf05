//! User route definitions

use axum::{routing::get, Router};

use crate::handlers::user::{get_user, list_users};
use crate::state::AppState;

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/:id", get(get_user))
}
