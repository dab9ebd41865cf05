//! API handlers for the pay-later backend

pub mod admin;
pub mod analytics;
pub mod auth;
pub mod loan;
pub mod user;

pub use crate::middleware::auth::{AdminUser, AuthenticatedUser};
