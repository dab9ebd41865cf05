//! Data models for the pay-later backend

use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod auth;
pub use auth::*;

/// Account record as stored
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub bvn: Option<String>,
    pub bank_account: Option<String>,
    pub id_type: Option<String>,
    pub kyc_status: KycStatus,
    pub is_flagged: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// KYC review state
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "kyc_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum KycStatus {
    Pending,
    Approved,
    Rejected,
}

/// Fields needed to insert a new account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password_hash: String,
    pub bvn: Option<String>,
    pub bank_account: Option<String>,
    pub id_type: Option<String>,
    pub kyc_status: KycStatus,
    pub is_admin: bool,
}

impl NewUser {
    pub fn into_user(self, now: DateTime<Utc>) -> User {
        User {
            id: Uuid::new_v4(),
            full_name: self.full_name,
            email: self.email,
            phone: self.phone,
            password_hash: self.password_hash,
            bvn: self.bvn,
            bank_account: self.bank_account,
            id_type: self.id_type,
            kyc_status: self.kyc_status,
            is_flagged: false,
            is_admin: self.is_admin,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Public view of a user (never carries the password hash)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub phone_number: String,
    pub bvn: Option<String>,
    pub bank_account_number: Option<String>,
    pub id_type: Option<String>,
    pub kyc_status: KycStatus,
    pub is_flagged: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            full_name: user.full_name,
            email: user.email,
            phone_number: user.phone,
            bvn: user.bvn,
            bank_account_number: user.bank_account,
            id_type: user.id_type,
            kyc_status: user.kyc_status,
            is_flagged: user.is_flagged,
            is_admin: user.is_admin,
            created_at: user.created_at,
        }
    }
}

/// Compact row for the flagged-accounts view
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlaggedAccount {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub phone: String,
    pub is_flagged: bool,
}

impl From<User> for FlaggedAccount {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            phone: user.phone,
            is_flagged: user.is_flagged,
        }
    }
}

/// API response wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
        }
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        NewUser {
            full_name: "Ada Obi".to_string(),
            email: "ada@example.com".to_string(),
            phone: "08030000000".to_string(),
            password_hash: "$2b$04$hash".to_string(),
            bvn: Some("22222222222".to_string()),
            bank_account: None,
            id_type: Some("nin".to_string()),
            kyc_status: KycStatus::Pending,
            is_admin: false,
        }
        .into_user(Utc::now())
    }

    #[test]
    fn test_password_hash_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["kycStatus"], "pending");
        assert_eq!(json["isFlagged"], false);
    }

    #[test]
    fn test_user_response_renames_contact_fields() {
        let response = UserResponse::from(sample_user());
        let json = serde_json::to_value(response).unwrap();
        assert_eq!(json["phoneNumber"], "08030000000");
        assert_eq!(json["fullName"], "Ada Obi");
    }
}
