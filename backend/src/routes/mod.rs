//! Route definitions

mod admin;
mod analytics;
mod auth;
mod loan;
mod user;

pub use admin::admin_routes;
pub use analytics::analytics_routes;
pub use auth::auth_routes;
pub use loan::loan_routes;
pub use user::user_routes;
