//! Loan lifecycle tests against the in-memory store

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::{mpsc, Barrier};
use uuid::Uuid;

use paylater_backend::auth::{AuthSettings, PasswordHasher};
use paylater_backend::error::ServiceError;
use paylater_backend::loan::{
    Admission, ApplyLoanRequest, Decision, Loan, LoanCategory, LoanDecisionUpdate, LoanFilter,
    LoanRepayment, LoanStatus, NewLoan, RepayLoanRequest, RepaymentOutcome, ReviewLoanRequest,
};
use paylater_backend::models::{KycStatus, NewUser, User};
use paylater_backend::notifier::{Notifier, OutgoingEmail};
use paylater_backend::services::{FixedRatePolicy, RatePolicy, UniformRatePolicy};
use paylater_backend::state::{AppSettings, AppState};
use paylater_backend::store::{
    MemoryStore, PortfolioTotals, RepaymentRecord, Store, StoreResult,
};

const ADMIN_EMAIL: &str = "admin@paylater.test";
const ADMIN_PASSWORD: &str = "admin-secret";

struct Harness {
    state: AppState,
    store: Arc<dyn Store>,
    outbox: mpsc::UnboundedReceiver<OutgoingEmail>,
}

fn settings() -> AppSettings {
    AppSettings {
        max_credit_limit: dec!(50000),
        bcrypt_cost: 4,
        auth: AuthSettings {
            jwt_secret: "test-secret".to_string(),
            access_token_ttl_seconds: 3600,
            reset_token_ttl_minutes: 30,
            public_base_url: "http://localhost:5173".to_string(),
        },
    }
}

async fn harness_with(rate_policy: Arc<dyn RatePolicy>) -> Harness {
    harness_over(Arc::new(MemoryStore::new()), rate_policy).await
}

async fn harness_over(store: Arc<dyn Store>, rate_policy: Arc<dyn RatePolicy>) -> Harness {
    let (tx, outbox) = mpsc::unbounded_channel();
    let state = AppState::new(
        store.clone(),
        Notifier::from_sender(tx),
        rate_policy,
        settings(),
    )
    .unwrap();

    let hasher = PasswordHasher::new(4).unwrap();
    store
        .create_user(NewUser {
            full_name: "Ops Admin".to_string(),
            email: ADMIN_EMAIL.to_string(),
            phone: "08000000000".to_string(),
            password_hash: hasher.hash(ADMIN_PASSWORD).await.unwrap(),
            bvn: None,
            bank_account: None,
            id_type: None,
            kyc_status: KycStatus::Approved,
            is_admin: true,
        })
        .await
        .unwrap();

    Harness {
        state,
        store,
        outbox,
    }
}

async fn harness() -> Harness {
    harness_with(Arc::new(FixedRatePolicy(dec!(5.00)))).await
}

async fn borrower(store: &Arc<dyn Store>, kyc_status: KycStatus) -> User {
    let tag = Uuid::new_v4().simple().to_string();
    store
        .create_user(NewUser {
            full_name: "Ada Obi".to_string(),
            email: format!("{}@example.com", tag),
            phone: tag[..11].to_string(),
            password_hash: "unused".to_string(),
            bvn: None,
            bank_account: None,
            id_type: None,
            kyc_status,
            is_admin: false,
        })
        .await
        .unwrap()
}

fn application(user_id: Uuid, amount: Decimal) -> ApplyLoanRequest {
    ApplyLoanRequest {
        user_id,
        amount,
        purpose: "Laptop".to_string(),
        duration_in_months: 3,
        category: "electronics".to_string(),
        vendor: "Gadget Hub".to_string(),
    }
}

fn review(decision: Decision) -> ReviewLoanRequest {
    ReviewLoanRequest {
        admin_id: ADMIN_EMAIL.to_string(),
        admin_password: ADMIN_PASSWORD.to_string(),
        decision,
    }
}

async fn approved_loan(h: &Harness, user: &User, amount: Decimal) -> Loan {
    let loans = &h.state.loan_service;
    let loan = loans.apply_loan(application(user.id, amount)).await.unwrap();
    loans
        .approve_loan(loan.id, review(Decision::Approve))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_application_over_ceiling_leaves_no_row() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loans = &h.state.loan_service;

    loans.apply_loan(application(user.id, dec!(45000))).await.unwrap();

    let err = loans
        .apply_loan(application(user.id, dec!(10000)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::LimitExceeded { .. }));
    assert_eq!(err.headroom(), Some(dec!(5000)));

    assert_eq!(loans.loans_by_user(user.id).await.unwrap().len(), 1);
    assert_eq!(loans.ledger().used_credit(user.id).await.unwrap(), dec!(45000));
}

#[tokio::test]
async fn test_rejected_loans_free_credit() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loans = &h.state.loan_service;

    let loan = loans.apply_loan(application(user.id, dec!(50000))).await.unwrap();
    loans
        .approve_loan(loan.id, review(Decision::Reject))
        .await
        .unwrap();

    assert!(loans.apply_loan(application(user.id, dec!(50000))).await.is_ok());
}

#[tokio::test]
async fn test_full_lifecycle_to_paid_off() {
    let mut h = harness_with(Arc::new(UniformRatePolicy::default())).await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loans = &h.state.loan_service;

    let loan = loans.apply_loan(application(user.id, dec!(20000))).await.unwrap();
    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(loan.remaining_balance, dec!(20000));
    assert_eq!(loan.interest_rate, Decimal::ZERO);

    let loan = loans
        .approve_loan(loan.id, review(Decision::Approve))
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::Approved);
    assert!(loan.interest_rate >= dec!(3) && loan.interest_rate <= dec!(10));
    assert!(loan.approval_date.is_some());

    let schedule = loans.repayment_schedule(user.id).await.unwrap();
    assert_eq!(schedule.len(), 1);

    let loan = loans
        .repay_loan(
            loan.id,
            RepayLoanRequest {
                user_id: user.id,
                amount: dec!(20000),
            },
        )
        .await
        .unwrap();
    assert_eq!(loan.status, LoanStatus::PaidOff);
    assert_eq!(loan.remaining_balance, Decimal::ZERO);

    let err = loans
        .repay_loan(
            loan.id,
            RepayLoanRequest {
                user_id: user.id,
                amount: dec!(1),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    // Paid-off loans no longer hold credit
    assert_eq!(loans.ledger().used_credit(user.id).await.unwrap(), Decimal::ZERO);

    let active = loans.active_loan(user.id).await.unwrap();
    assert_eq!(active.total_paid, dec!(20000));
    assert_eq!(active.repayments.len(), 1);

    let subjects: Vec<String> = std::iter::from_fn(|| h.outbox.try_recv().ok())
        .map(|email| email.subject)
        .collect();
    assert_eq!(subjects.len(), 3);
}

#[tokio::test]
async fn test_overpayment_is_rejected() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loan = approved_loan(&h, &user, dec!(100)).await;

    let err = h
        .state
        .loan_service
        .repay_loan(
            loan.id,
            RepayLoanRequest {
                user_id: user.id,
                amount: dec!(100.01),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let current = h.state.loan_service.get_loan(loan.id).await.unwrap();
    assert_eq!(current.remaining_balance, dec!(100));
    assert!(h
        .state
        .loan_service
        .repayment_history(loan.id)
        .await
        .unwrap()
        .is_empty());
}

/// Memory store whose `get_loan` holds two callers until both have read,
/// so both see the same balance before either writes
struct InterleavingStore {
    inner: MemoryStore,
    gate: Barrier,
    armed: AtomicBool,
}

impl InterleavingStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            gate: Barrier::new(2),
            armed: AtomicBool::new(false),
        }
    }

    fn arm(&self) {
        self.armed.store(true, Ordering::SeqCst);
    }

    fn is_armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for InterleavingStore {
    async fn ping(&self) -> StoreResult<()> {
        self.inner.ping().await
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        self.inner.create_user(user).await
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        self.inner.get_user(id).await
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &str,
        admins_only: bool,
    ) -> StoreResult<Option<User>> {
        self.inner.find_user_by_identifier(identifier, admins_only).await
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        self.inner.find_user_by_email(email).await
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_users().await
    }

    async fn list_flagged_users(&self) -> StoreResult<Vec<User>> {
        self.inner.list_flagged_users().await
    }

    async fn set_flagged(&self, user_id: Uuid, flagged: bool) -> StoreResult<Option<User>> {
        self.inner.set_flagged(user_id, flagged).await
    }

    async fn set_kyc_status(
        &self,
        user_id: Uuid,
        status: KycStatus,
    ) -> StoreResult<Option<User>> {
        self.inner.set_kyc_status(user_id, status).await
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        self.inner.update_password(user_id, password_hash).await
    }

    async fn used_credit(&self, user_id: Uuid) -> StoreResult<Decimal> {
        self.inner.used_credit(user_id).await
    }

    async fn create_loan_within_ceiling(
        &self,
        loan: NewLoan,
        ceiling: Decimal,
    ) -> StoreResult<Admission> {
        self.inner.create_loan_within_ceiling(loan, ceiling).await
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let loan = self.inner.get_loan(id).await?;
        if self.is_armed() && self.gate.wait().await.is_leader() {
            self.armed.store(false, Ordering::SeqCst);
        }
        Ok(loan)
    }

    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<Vec<Loan>> {
        self.inner.list_loans(filter).await
    }

    async fn count_loans_by_category(&self) -> StoreResult<Vec<(LoanCategory, i64)>> {
        self.inner.count_loans_by_category().await
    }

    async fn decide_loan(
        &self,
        loan_id: Uuid,
        update: LoanDecisionUpdate,
    ) -> StoreResult<Option<Loan>> {
        self.inner.decide_loan(loan_id, update).await
    }

    async fn record_repayment(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<RepaymentOutcome> {
        self.inner.record_repayment(loan_id, amount, at).await
    }

    async fn repayments_for_loan(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        self.inner.repayments_for_loan(loan_id).await
    }

    async fn list_repayments(&self, user_id: Option<Uuid>) -> StoreResult<Vec<RepaymentRecord>> {
        self.inner.list_repayments(user_id).await
    }

    async fn portfolio_totals(&self) -> StoreResult<PortfolioTotals> {
        self.inner.portfolio_totals().await
    }

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        self.inner.insert_reset_token(user_id, token_hash, expires_at).await
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        self.inner.consume_reset_token(token_hash, now).await
    }

    async fn purge_expired_reset_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        self.inner.purge_expired_reset_tokens(now).await
    }
}

#[tokio::test]
async fn test_concurrent_repayments_cannot_overdraw() {
    let interleaving = Arc::new(InterleavingStore::new());
    let h = harness_over(
        interleaving.clone(),
        Arc::new(FixedRatePolicy(dec!(5.00))),
    )
    .await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loan = approved_loan(&h, &user, dec!(100)).await;
    let loans = h.state.loan_service.clone();

    let repay = |amount| {
        let loans = loans.clone();
        let user_id = user.id;
        let loan_id = loan.id;
        async move {
            loans
                .repay_loan(loan_id, RepayLoanRequest { user_id, amount })
                .await
        }
    };

    // Both repayments read a balance of 100 before either one writes
    interleaving.arm();
    let (a, b) = tokio::join!(repay(dec!(60)), repay(dec!(60)));
    assert!(!interleaving.is_armed(), "both repayments should have met at the gate");
    let results = [a, b];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert_eq!(
        results
            .iter()
            .filter(|r| matches!(r, Err(ServiceError::InvalidInput(_))))
            .count(),
        1
    );

    let current = loans.get_loan(loan.id).await.unwrap();
    assert_eq!(current.remaining_balance, dec!(40));
    assert_eq!(current.status, LoanStatus::Approved);
    assert_eq!(loans.repayment_history(loan.id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_repayment_by_other_user_is_forbidden() {
    let h = harness().await;
    let owner = borrower(&h.store, KycStatus::Approved).await;
    let stranger = borrower(&h.store, KycStatus::Approved).await;
    let loan = approved_loan(&h, &owner, dec!(500)).await;

    let err = h
        .state
        .loan_service
        .repay_loan(
            loan.id,
            RepayLoanRequest {
                user_id: stranger.id,
                amount: dec!(10),
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));
}

#[tokio::test]
async fn test_loan_cannot_be_decided_twice() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loan = approved_loan(&h, &user, dec!(1000)).await;

    let err = h
        .state
        .loan_service
        .approve_loan(loan.id, review(Decision::Reject))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidState(_)));

    let current = h.state.loan_service.get_loan(loan.id).await.unwrap();
    assert_eq!(current.status, LoanStatus::Approved);
}

#[tokio::test]
async fn test_admin_gate_rejects_bad_credentials() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loans = &h.state.loan_service;
    let loan = loans.apply_loan(application(user.id, dec!(1000))).await.unwrap();

    let wrong_password = ReviewLoanRequest {
        admin_password: "nope".to_string(),
        ..review(Decision::Approve)
    };
    let err = loans.approve_loan(loan.id, wrong_password).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    // A regular account with a correct password is still not an admin
    let hasher = PasswordHasher::new(4).unwrap();
    let regular = h
        .store
        .create_user(NewUser {
            full_name: "Regular".to_string(),
            email: "regular@example.com".to_string(),
            phone: "08011111111".to_string(),
            password_hash: hasher.hash("regular-pass").await.unwrap(),
            bvn: None,
            bank_account: None,
            id_type: None,
            kyc_status: KycStatus::Approved,
            is_admin: false,
        })
        .await
        .unwrap();
    let not_admin = ReviewLoanRequest {
        admin_id: regular.email.clone(),
        admin_password: "regular-pass".to_string(),
        decision: Decision::Approve,
    };
    let err = loans.approve_loan(loan.id, not_admin).await.unwrap_err();
    assert!(matches!(err, ServiceError::Unauthorized(_)));

    let err = loans
        .approve_loan(Uuid::new_v4(), review(Decision::Approve))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let current = loans.get_loan(loan.id).await.unwrap();
    assert_eq!(current.status, LoanStatus::Pending);
}

#[tokio::test]
async fn test_application_gating() {
    let h = harness().await;
    let loans = &h.state.loan_service;

    let err = loans
        .apply_loan(application(Uuid::new_v4(), dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound(_)));

    let pending = borrower(&h.store, KycStatus::Pending).await;
    let err = loans
        .apply_loan(application(pending.id, dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let flagged = borrower(&h.store, KycStatus::Approved).await;
    h.store.set_flagged(flagged.id, true).await.unwrap();
    let err = loans
        .apply_loan(application(flagged.id, dec!(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Forbidden(_)));

    let user = borrower(&h.store, KycStatus::Approved).await;
    let err = loans
        .apply_loan(ApplyLoanRequest {
            category: "groceries".to_string(),
            ..application(user.id, dec!(100))
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));

    let err = loans
        .apply_loan(application(user.id, dec!(-1)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::InvalidInput(_)));
}

#[tokio::test]
async fn test_closed_notification_queue_is_not_fatal() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let (tx, rx) = mpsc::unbounded_channel();
    drop(rx);
    let notifier = Notifier::from_sender(tx);
    let state = AppState::new(
        store.clone(),
        notifier.clone(),
        Arc::new(FixedRatePolicy(dec!(4.50))),
        settings(),
    )
    .unwrap();

    let user = borrower(&store, KycStatus::Approved).await;
    let loan = state
        .loan_service
        .apply_loan(application(user.id, dec!(250)))
        .await
        .unwrap();

    assert_eq!(loan.status, LoanStatus::Pending);
    assert_eq!(notifier.failure_count(), 1);
}

#[tokio::test]
async fn test_category_stats_and_totals() {
    let h = harness().await;
    let user = borrower(&h.store, KycStatus::Approved).await;
    let loans = &h.state.loan_service;

    loans.apply_loan(application(user.id, dec!(100))).await.unwrap();
    loans
        .apply_loan(ApplyLoanRequest {
            category: "Fashion".to_string(),
            ..application(user.id, dec!(300))
        })
        .await
        .unwrap();

    let shares = loans.category_stats().await.unwrap();
    assert_eq!(shares.iter().map(|s| s.value).sum::<i64>(), 100);

    let total = loans.user_total(user.id).await.unwrap();
    assert_eq!(total.total_loan, dec!(400));

    let history = loans.grouped_history(user.id).await.unwrap();
    assert_eq!(history.loans.len(), 2);
    assert_eq!(history.name, "Ada Obi");
}

#[tokio::test]
#[ignore] // Requires TEST_DATABASE_URL
async fn test_postgres_ceiling_is_atomic() {
    use paylater_backend::store::PgStore;

    let database_url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgresql://localhost/paylater_test".to_string());
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(4)
        .connect(&database_url)
        .await
        .expect("Failed to connect to test database");
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();

    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
    let (tx, _outbox) = mpsc::unbounded_channel();
    let state = AppState::new(
        store.clone(),
        Notifier::from_sender(tx),
        Arc::new(FixedRatePolicy(dec!(5))),
        settings(),
    )
    .unwrap();
    let user = borrower(&store, KycStatus::Approved).await;
    let loans = state.loan_service.clone();

    let apply = |amount| {
        let loans = loans.clone();
        let user_id = user.id;
        async move { loans.apply_loan(application(user_id, amount)).await }
    };
    let (a, b) = tokio::join!(apply(dec!(30000)), apply(dec!(30000)));

    assert_eq!([a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count(), 1);
    assert_eq!(loans.ledger().used_credit(user.id).await.unwrap(), dec!(30000));
}
