//! Authentication module
//!
//! - bcrypt password hashing
//! - JWT access token generation and validation
//! - Registration, login and password reset

mod jwt;
mod password;
mod service;

pub use jwt::{generate_access_token, verify_token, Claims, JwtError};
pub use password::PasswordHasher;
pub use service::{AdminBootstrap, AuthService, AuthSettings};
