//! Persistence layer
//!
//! Services talk to storage through the [`Store`] trait. [`PgStore`] is the
//! production implementation over sqlx; [`MemoryStore`] keeps everything in
//! process for tests and local runs. Every multi-step mutation is atomic
//! inside a single store call so callers never hold a lock or transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::loan::{
    Admission, Loan, LoanCategory, LoanDecisionUpdate, LoanFilter, LoanRepayment, NewLoan,
    RepaymentOutcome,
};
use crate::models::{KycStatus, NewUser, User};

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound("Record".to_string()),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                StoreError::Duplicate("Email or phone".to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Aggregate figures for the admin dashboard
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortfolioTotals {
    pub total_users: i64,
    pub flagged_users: i64,
    /// Principal of loans currently in `approved`
    pub active_principal: Decimal,
    pub total_repaid: Decimal,
}

/// Repayment joined with the loan it settles
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RepaymentRecord {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub repayment_date: DateTime<Utc>,
    pub user_id: Uuid,
    pub loan_status: crate::loan::LoanStatus,
}

impl RepaymentRecord {
    pub fn repayment(&self) -> LoanRepayment {
        LoanRepayment {
            id: self.id,
            loan_id: self.loan_id,
            amount: self.amount,
            repayment_date: self.repayment_date,
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Connectivity check for the health endpoint
    async fn ping(&self) -> StoreResult<()>;

    // ----- accounts -----

    /// Insert a user; `Duplicate` when the email (any case) or phone is taken
    async fn create_user(&self, user: NewUser) -> StoreResult<User>;

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>>;

    /// Match `identifier` against id, email (case-insensitive) or phone
    async fn find_user_by_identifier(
        &self,
        identifier: &str,
        admins_only: bool,
    ) -> StoreResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    /// All users, newest first
    async fn list_users(&self) -> StoreResult<Vec<User>>;

    async fn list_flagged_users(&self) -> StoreResult<Vec<User>>;

    async fn set_flagged(&self, user_id: Uuid, flagged: bool) -> StoreResult<Option<User>>;

    async fn set_kyc_status(&self, user_id: Uuid, status: KycStatus)
        -> StoreResult<Option<User>>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool>;

    // ----- loans -----

    /// Sum of principal over the user's pending and approved loans
    async fn used_credit(&self, user_id: Uuid) -> StoreResult<Decimal>;

    /// Insert a pending loan unless it would push the user's used credit
    /// above `ceiling`. Check and insert are serialized per user.
    async fn create_loan_within_ceiling(
        &self,
        loan: NewLoan,
        ceiling: Decimal,
    ) -> StoreResult<Admission>;

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>>;

    /// Loans matching `filter`, newest first
    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<Vec<Loan>>;

    async fn count_loans_by_category(&self) -> StoreResult<Vec<(LoanCategory, i64)>>;

    /// Apply `update` only if the loan is still pending. `None` when the
    /// loan is absent or no longer pending.
    async fn decide_loan(
        &self,
        loan_id: Uuid,
        update: LoanDecisionUpdate,
    ) -> StoreResult<Option<Loan>>;

    /// Conditionally decrement the balance of an approved loan by `amount`
    /// and append the repayment row, as one unit. Flips the loan to
    /// `paid off` when the balance reaches zero.
    async fn record_repayment(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<RepaymentOutcome>;

    /// Repayments of one loan, newest first
    async fn repayments_for_loan(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>>;

    /// Repayments across a user's loans (or everyone's when `None`), newest first
    async fn list_repayments(&self, user_id: Option<Uuid>) -> StoreResult<Vec<RepaymentRecord>>;

    async fn portfolio_totals(&self) -> StoreResult<PortfolioTotals>;

    // ----- password reset -----

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()>;

    /// Remove the token and return its owner if it had not expired at `now`
    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>>;

    async fn purge_expired_reset_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}
