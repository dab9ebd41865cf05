//! Authentication service
//!
//! Registration, credential login, password reset and the account
//! directory read views.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::jwt::generate_access_token;
use super::password::PasswordHasher;
use crate::error::ServiceError;
use crate::models::{
    AuthTokenResponse, KycStatus, LoginRequest, NewUser, RegisterRequest, User, UserResponse,
};
use crate::notifier::{templates, Notifier};
use crate::store::Store;

const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Settings for the auth service
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub access_token_ttl_seconds: i64,
    pub reset_token_ttl_minutes: i64,
    pub public_base_url: String,
}

/// Admin account created at startup when configured
#[derive(Debug, Clone)]
pub struct AdminBootstrap {
    pub full_name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
}

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
    notifier: Notifier,
    settings: AuthSettings,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn Store>,
        hasher: PasswordHasher,
        notifier: Notifier,
        settings: AuthSettings,
    ) -> Self {
        Self {
            store,
            hasher,
            notifier,
            settings,
        }
    }

    pub fn jwt_secret(&self) -> &str {
        &self.settings.jwt_secret
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<UserResponse, ServiceError> {
        let email = request.email.trim().to_string();
        let phone = request.phone_number.trim().to_string();

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(ServiceError::Conflict("Email already registered".to_string()));
        }
        if self.store.find_user_by_identifier(&phone, false).await?.is_some() {
            return Err(ServiceError::Conflict(
                "Phone number already registered".to_string(),
            ));
        }

        let password_hash = self.hasher.hash(&request.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                full_name: request.full_name.trim().to_string(),
                email,
                phone,
                password_hash,
                bvn: request.bvn,
                bank_account: request.bank_account_number,
                id_type: request.id_type,
                kyc_status: KycStatus::Pending,
                is_admin: false,
            })
            .await?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user.into())
    }

    pub async fn login(&self, request: LoginRequest) -> Result<AuthTokenResponse, ServiceError> {
        self.authenticate(&request.identifier, &request.password, false)
            .await
    }

    /// Like [`login`](Self::login) but only admin accounts qualify
    pub async fn admin_login(
        &self,
        request: LoginRequest,
    ) -> Result<AuthTokenResponse, ServiceError> {
        self.authenticate(&request.identifier, &request.password, true)
            .await
    }

    async fn authenticate(
        &self,
        identifier: &str,
        password: &str,
        admins_only: bool,
    ) -> Result<AuthTokenResponse, ServiceError> {
        let identifier = identifier.trim();
        let user = self
            .store
            .find_user_by_identifier(identifier, admins_only)
            .await?
            .filter(|u| u.email.eq_ignore_ascii_case(identifier) || u.phone == identifier);

        let verified = self
            .hasher
            .verify(password, user.as_ref().map(|u| u.password_hash.as_str()))
            .await;

        match user {
            Some(user) if verified => {
                tracing::info!(user_id = %user.id, admin = admins_only, "Login succeeded");
                self.issue_token(user)
            }
            _ => {
                tracing::debug!(admin = admins_only, "Login rejected");
                Err(ServiceError::Unauthorized(INVALID_CREDENTIALS.to_string()))
            }
        }
    }

    fn issue_token(&self, user: User) -> Result<AuthTokenResponse, ServiceError> {
        let jti = Uuid::new_v4().to_string();
        let access_token = generate_access_token(
            &user,
            &jti,
            &self.settings.jwt_secret,
            self.settings.access_token_ttl_seconds,
        )
        .map_err(|e| ServiceError::Internal(e.to_string()))?;

        Ok(AuthTokenResponse {
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.settings.access_token_ttl_seconds,
            user: user.into(),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        self.get_user(user_id).await
    }

    /// Email a reset link. Unknown addresses get the same response.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let Some(user) = self.store.find_user_by_email(email.trim()).await? else {
            tracing::debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let token = generate_reset_token();
        let expires_at = Utc::now() + Duration::minutes(self.settings.reset_token_ttl_minutes);
        self.store
            .insert_reset_token(user.id, &hash_token(&token), expires_at)
            .await?;

        let reset_url = format!(
            "{}/reset-password?token={}",
            self.settings.public_base_url.trim_end_matches('/'),
            token
        );
        self.notifier
            .notify(templates::password_reset(&user.email, &reset_url));

        tracing::info!(user_id = %user.id, "Password reset token issued");
        Ok(())
    }

    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), ServiceError> {
        let user_id = self
            .store
            .consume_reset_token(&hash_token(token.trim()), Utc::now())
            .await?
            .ok_or_else(|| ServiceError::InvalidInput("Invalid or expired token".to_string()))?;

        let password_hash = self.hasher.hash(new_password).await?;
        if !self.store.update_password(user_id, &password_hash).await? {
            return Err(ServiceError::NotFound("User not found".to_string()));
        }

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    pub async fn list_users(&self) -> Result<Vec<UserResponse>, ServiceError> {
        let users = self.store.list_users().await?;
        Ok(users.into_iter().map(UserResponse::from).collect())
    }

    pub async fn get_user(&self, user_id: Uuid) -> Result<UserResponse, ServiceError> {
        self.store
            .get_user(user_id)
            .await?
            .map(UserResponse::from)
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    /// Make sure the configured admin account exists. An existing account
    /// with that email is left as it is.
    pub async fn bootstrap_admin(&self, admin: AdminBootstrap) -> Result<(), ServiceError> {
        if let Some(existing) = self.store.find_user_by_email(&admin.email).await? {
            if !existing.is_admin {
                tracing::warn!(
                    user_id = %existing.id,
                    "Configured admin email belongs to a non-admin account"
                );
            }
            return Ok(());
        }

        let password_hash = self.hasher.hash(&admin.password).await?;
        let user = self
            .store
            .create_user(NewUser {
                full_name: admin.full_name,
                email: admin.email,
                phone: admin.phone,
                password_hash,
                bvn: None,
                bank_account: None,
                id_type: None,
                kyc_status: KycStatus::Approved,
                is_admin: true,
            })
            .await?;

        tracing::info!(user_id = %user.id, "Admin account created");
        Ok(())
    }
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
