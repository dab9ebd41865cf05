//! Admin gate and admin actions
//!
//! Every privileged mutation re-authenticates the acting admin from the
//! credentials in the request body. An admin is any account with
//! `is_admin = true`.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::auth::PasswordHasher;
use crate::error::ServiceError;
use crate::loan::{Decision, LoanFilter, LoanStatus};
use crate::models::{AdminCredentials, FlaggedAccount, KycStatus, User, UserResponse};
use crate::notifier::{templates, Notifier};
use crate::store::Store;

const INVALID_ADMIN_CREDENTIALS: &str = "Invalid admin credentials";

/// Checks admin credentials against stored accounts
#[derive(Clone)]
pub struct AdminGate {
    store: Arc<dyn Store>,
    hasher: PasswordHasher,
}

impl AdminGate {
    pub fn new(store: Arc<dyn Store>, hasher: PasswordHasher) -> Self {
        Self { store, hasher }
    }

    /// Resolve `identifier` (id, email or phone) to an admin and verify
    /// `credential`. Unknown identifier and wrong credential fail the same way.
    pub async fn authorize(&self, identifier: &str, credential: &str) -> Result<User, ServiceError> {
        let admin = self
            .store
            .find_user_by_identifier(identifier.trim(), true)
            .await?;

        let verified = self
            .hasher
            .verify(credential, admin.as_ref().map(|a| a.password_hash.as_str()))
            .await;

        match admin {
            Some(admin) if verified => Ok(admin),
            _ => {
                tracing::warn!("Admin authorization failed");
                Err(ServiceError::Unauthorized(
                    INVALID_ADMIN_CREDENTIALS.to_string(),
                ))
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FlagAction {
    Flag,
    Unflag,
}

/// Body of `PATCH /admin/kyc/:user_id/approve`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct KycReviewRequest {
    #[serde(flatten)]
    #[validate]
    pub credentials: AdminCredentials,
    pub decision: Decision,
}

/// Body of `PATCH /admin/flag-user/:user_id`
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct FlagUserRequest {
    #[serde(flatten)]
    #[validate]
    pub credentials: AdminCredentials,
    pub action: FlagAction,
}

#[derive(Debug, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Disbursement,
    Repayment,
}

/// One row of the admin activity feed
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user: String,
    pub amount: Decimal,
    pub date: DateTime<Utc>,
    pub status: String,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
}

#[derive(Clone)]
pub struct AdminService {
    store: Arc<dyn Store>,
    gate: AdminGate,
    notifier: Notifier,
}

impl AdminService {
    pub fn new(store: Arc<dyn Store>, gate: AdminGate, notifier: Notifier) -> Self {
        Self {
            store,
            gate,
            notifier,
        }
    }

    pub fn gate(&self) -> &AdminGate {
        &self.gate
    }

    pub async fn review_kyc(
        &self,
        user_id: Uuid,
        credentials: &AdminCredentials,
        decision: Decision,
    ) -> Result<UserResponse, ServiceError> {
        let admin = self
            .gate
            .authorize(&credentials.admin_id, &credentials.admin_password)
            .await?;

        let status = match decision {
            Decision::Approve => KycStatus::Approved,
            Decision::Reject => KycStatus::Rejected,
        };
        let user = self
            .store
            .set_kyc_status(user_id, status)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        tracing::info!(
            admin_id = %admin.id,
            user_id = %user.id,
            kyc_status = ?status,
            "KYC reviewed"
        );
        self.notifier.notify(templates::kyc_decision(
            &user.email,
            status == KycStatus::Approved,
        ));

        Ok(user.into())
    }

    /// Idempotent: flagging a flagged account succeeds without change
    pub async fn set_flag(
        &self,
        user_id: Uuid,
        credentials: &AdminCredentials,
        action: FlagAction,
    ) -> Result<FlaggedAccount, ServiceError> {
        let admin = self
            .gate
            .authorize(&credentials.admin_id, &credentials.admin_password)
            .await?;

        let user = self
            .store
            .set_flagged(user_id, action == FlagAction::Flag)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))?;

        tracing::info!(
            admin_id = %admin.id,
            user_id = %user.id,
            flagged = user.is_flagged,
            "Account flag updated"
        );
        Ok(user.into())
    }

    pub async fn flagged_accounts(&self) -> Result<Vec<FlaggedAccount>, ServiceError> {
        let users = self.store.list_flagged_users().await?;
        Ok(users.into_iter().map(FlaggedAccount::from).collect())
    }

    /// Disbursements and repayments across all borrowers, newest first
    pub async fn activity_feed(&self) -> Result<Vec<ActivityEntry>, ServiceError> {
        let names: HashMap<Uuid, String> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id, u.full_name))
            .collect();
        let name_of = |id: &Uuid| {
            names
                .get(id)
                .cloned()
                .unwrap_or_else(|| "Unknown".to_string())
        };

        let disbursed = self
            .store
            .list_loans(&LoanFilter {
                statuses: Some(vec![LoanStatus::Approved, LoanStatus::PaidOff]),
                ..LoanFilter::default()
            })
            .await?;

        let mut feed: Vec<ActivityEntry> = disbursed
            .into_iter()
            .map(|loan| ActivityEntry {
                user: name_of(&loan.user_id),
                amount: loan.amount,
                date: loan.approval_date.unwrap_or(loan.created_at),
                status: "approved loan".to_string(),
                kind: ActivityKind::Disbursement,
            })
            .collect();

        feed.extend(
            self.store
                .list_repayments(None)
                .await?
                .into_iter()
                .map(|r| ActivityEntry {
                    user: name_of(&r.user_id),
                    amount: r.amount,
                    date: r.repayment_date,
                    status: r.loan_status.to_string(),
                    kind: ActivityKind::Repayment,
                }),
        );

        feed.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(feed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewUser;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    async fn setup() -> (AdminService, Arc<MemoryStore>, User, User) {
        let store = Arc::new(MemoryStore::new());
        let hasher = PasswordHasher::new(4).unwrap();

        let admin = store
            .create_user(NewUser {
                full_name: "Root".to_string(),
                email: "root@example.com".to_string(),
                phone: "08000000000".to_string(),
                password_hash: hasher.hash("rootpass").await.unwrap(),
                bvn: None,
                bank_account: None,
                id_type: None,
                kyc_status: KycStatus::Approved,
                is_admin: true,
            })
            .await
            .unwrap();
        let borrower = store
            .create_user(NewUser {
                full_name: "Ada Obi".to_string(),
                email: "ada@example.com".to_string(),
                phone: "08030000000".to_string(),
                password_hash: hasher.hash("secret1").await.unwrap(),
                bvn: None,
                bank_account: None,
                id_type: None,
                kyc_status: KycStatus::Pending,
                is_admin: false,
            })
            .await
            .unwrap();

        let (tx, _rx) = mpsc::unbounded_channel();
        let service = AdminService::new(
            store.clone(),
            AdminGate::new(store.clone(), hasher),
            Notifier::from_sender(tx),
        );
        (service, store, admin, borrower)
    }

    fn creds(id: &str, password: &str) -> AdminCredentials {
        AdminCredentials {
            admin_id: id.to_string(),
            admin_password: password.to_string(),
        }
    }

    #[tokio::test]
    async fn test_gate_accepts_any_identifier_form() {
        let (service, _store, admin, _) = setup().await;
        for id in [admin.id.to_string(), "ROOT@example.com".to_string(), "08000000000".to_string()] {
            let found = service.gate().authorize(&id, "rootpass").await.unwrap();
            assert_eq!(found.id, admin.id);
        }
    }

    #[tokio::test]
    async fn test_gate_errors_do_not_leak_existence() {
        let (service, _store, _admin, _) = setup().await;
        let wrong_password = service
            .gate()
            .authorize("root@example.com", "nope")
            .await
            .unwrap_err();
        let unknown = service
            .gate()
            .authorize("ghost@example.com", "rootpass")
            .await
            .unwrap_err();
        let not_admin = service
            .gate()
            .authorize("ada@example.com", "secret1")
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, ServiceError::Unauthorized(_)));
        assert_eq!(wrong_password.to_string(), unknown.to_string());
        assert_eq!(unknown.to_string(), not_admin.to_string());
    }

    #[tokio::test]
    async fn test_flag_is_idempotent() {
        let (service, _store, _admin, borrower) = setup().await;
        let admin = creds("root@example.com", "rootpass");

        for _ in 0..2 {
            let account = service
                .set_flag(borrower.id, &admin, FlagAction::Flag)
                .await
                .unwrap();
            assert!(account.is_flagged);
        }
        assert_eq!(service.flagged_accounts().await.unwrap().len(), 1);

        let account = service
            .set_flag(borrower.id, &admin, FlagAction::Unflag)
            .await
            .unwrap();
        assert!(!account.is_flagged);
        assert!(service.flagged_accounts().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_flag_unknown_user() {
        let (service, _store, _admin, _) = setup().await;
        let err = service
            .set_flag(
                Uuid::new_v4(),
                &creds("root@example.com", "rootpass"),
                FlagAction::Flag,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_kyc_review_requires_gate() {
        let (service, store, _admin, borrower) = setup().await;

        let err = service
            .review_kyc(borrower.id, &creds("root@example.com", "bad"), Decision::Approve)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let user = service
            .review_kyc(
                borrower.id,
                &creds("root@example.com", "rootpass"),
                Decision::Approve,
            )
            .await
            .unwrap();
        assert_eq!(user.kyc_status, KycStatus::Approved);
        assert_eq!(
            store.get_user(borrower.id).await.unwrap().unwrap().kyc_status,
            KycStatus::Approved
        );
    }

    #[test]
    fn test_flag_request_body() {
        let request: FlagUserRequest = serde_json::from_str(
            r#"{"adminId":"root@example.com","adminPassword":"pw","action":"unflag"}"#,
        )
        .unwrap();
        assert_eq!(request.action, FlagAction::Unflag);
        assert_eq!(request.credentials.admin_id, "root@example.com");
    }
}
