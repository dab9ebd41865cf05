//! Password hashing
//!
//! bcrypt runs on the blocking pool. Verification against an unknown
//! account still hashes against a dummy digest so both failure paths cost
//! the same.

use crate::error::ServiceError;

#[derive(Clone)]
pub struct PasswordHasher {
    cost: u32,
    dummy_hash: String,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Result<Self, ServiceError> {
        let dummy_hash = bcrypt::hash("paylater-dummy-credential", cost)
            .map_err(|e| ServiceError::Internal(format!("Password hashing failed: {}", e)))?;
        Ok(Self { cost, dummy_hash })
    }

    pub async fn hash(&self, password: &str) -> Result<String, ServiceError> {
        let password = password.to_string();
        let cost = self.cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))?
            .map_err(|e| ServiceError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Check `password` against `stored`, or against the dummy digest when
    /// there is no account. Malformed hashes count as a mismatch.
    pub async fn verify(&self, password: &str, stored: Option<&str>) -> bool {
        let known = stored.is_some();
        let hash = stored.unwrap_or(&self.dummy_hash).to_string();
        let password = password.to_string();

        let matched = tokio::task::spawn_blocking(move || {
            bcrypt::verify(password, &hash).unwrap_or(false)
        })
        .await
        .unwrap_or(false);

        known && matched
    }
}
