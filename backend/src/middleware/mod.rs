//! Middleware for the pay-later API
//!
//! Request tracing, rate limiting and bearer-token extractors.

pub mod auth;
mod rate_limiter;
mod tracing;

pub use auth::{AdminUser, AuthenticatedUser};
pub use rate_limiter::{client_key, rate_limit, RateLimiter};
pub use self::tracing::{request_tracing, REQUEST_ID_HEADER};
