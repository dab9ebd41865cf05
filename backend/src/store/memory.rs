//! In-process store
//!
//! A single `RwLock` guards all tables, so each trait call is atomic with
//! respect to every other call.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{PortfolioTotals, RepaymentRecord, Store, StoreError, StoreResult};
use crate::loan::{
    Admission, Loan, LoanCategory, LoanDecisionUpdate, LoanFilter, LoanRepayment, LoanStatus,
    NewLoan, RepaymentOutcome,
};
use crate::models::{KycStatus, NewUser, User};
use crate::services::credit_ledger::{used_credit_of, within_ceiling};

#[derive(Default)]
struct Tables {
    users: Vec<User>,
    loans: Vec<Loan>,
    repayments: Vec<LoanRepayment>,
    reset_tokens: HashMap<String, (Uuid, DateTime<Utc>)>,
}

impl Tables {
    fn user_mut(&mut self, id: Uuid) -> Option<&mut User> {
        self.users.iter_mut().find(|u| u.id == id)
    }

    fn loan_mut(&mut self, id: Uuid) -> Option<&mut Loan> {
        self.loans.iter_mut().find(|l| l.id == id)
    }

    fn loan_owner(&self, loan_id: Uuid) -> Option<(Uuid, LoanStatus)> {
        self.loans
            .iter()
            .find(|l| l.id == loan_id)
            .map(|l| (l.user_id, l.status))
    }
}

/// Newest-first ordering; among equal timestamps the later insert wins
fn newest_first<T: Clone>(rows: &[T], key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut out: Vec<T> = rows.iter().rev().cloned().collect();
    out.sort_by(|a, b| key(b).cmp(&key(a)));
    out
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn create_user(&self, user: NewUser) -> StoreResult<User> {
        let mut tables = self.tables.write().await;
        let taken = tables
            .users
            .iter()
            .any(|u| u.email.eq_ignore_ascii_case(&user.email) || u.phone == user.phone);
        if taken {
            return Err(StoreError::Duplicate("Email or phone".to_string()));
        }
        let user = user.into_user(Utc::now());
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: Uuid) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn find_user_by_identifier(
        &self,
        identifier: &str,
        admins_only: bool,
    ) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .filter(|u| !admins_only || u.is_admin)
            .find(|u| {
                u.id.to_string() == identifier
                    || u.email.eq_ignore_ascii_case(identifier)
                    || u.phone == identifier
            })
            .cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn list_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(newest_first(&tables.users, |u| u.created_at))
    }

    async fn list_flagged_users(&self) -> StoreResult<Vec<User>> {
        let tables = self.tables.read().await;
        let flagged: Vec<User> = tables
            .users
            .iter()
            .filter(|u| u.is_flagged)
            .cloned()
            .collect();
        Ok(newest_first(&flagged, |u| u.created_at))
    }

    async fn set_flagged(&self, user_id: Uuid, flagged: bool) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.user_mut(user_id).map(|user| {
            user.is_flagged = flagged;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_kyc_status(
        &self,
        user_id: Uuid,
        status: KycStatus,
    ) -> StoreResult<Option<User>> {
        let mut tables = self.tables.write().await;
        Ok(tables.user_mut(user_id).map(|user| {
            user.kyc_status = status;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> StoreResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(match tables.user_mut(user_id) {
            Some(user) => {
                user.password_hash = password_hash.to_string();
                user.updated_at = Utc::now();
                true
            }
            None => false,
        })
    }

    async fn used_credit(&self, user_id: Uuid) -> StoreResult<Decimal> {
        let tables = self.tables.read().await;
        Ok(used_credit_of(
            tables.loans.iter().filter(|l| l.user_id == user_id),
        ))
    }

    async fn create_loan_within_ceiling(
        &self,
        loan: NewLoan,
        ceiling: Decimal,
    ) -> StoreResult<Admission> {
        let mut tables = self.tables.write().await;
        let used = used_credit_of(tables.loans.iter().filter(|l| l.user_id == loan.user_id));
        if !within_ceiling(used, loan.amount, ceiling) {
            return Ok(Admission::Exceeded { used });
        }
        let loan = loan.into_loan(Utc::now());
        tables.loans.push(loan.clone());
        Ok(Admission::Opened(loan))
    }

    async fn get_loan(&self, id: Uuid) -> StoreResult<Option<Loan>> {
        let tables = self.tables.read().await;
        Ok(tables.loans.iter().find(|l| l.id == id).cloned())
    }

    async fn list_loans(&self, filter: &LoanFilter) -> StoreResult<Vec<Loan>> {
        let tables = self.tables.read().await;
        let matching: Vec<Loan> = tables
            .loans
            .iter()
            .filter(|l| filter.matches(l))
            .cloned()
            .collect();
        Ok(newest_first(&matching, |l| l.created_at))
    }

    async fn count_loans_by_category(&self) -> StoreResult<Vec<(LoanCategory, i64)>> {
        let tables = self.tables.read().await;
        Ok(LoanCategory::ALL
            .into_iter()
            .map(|c| {
                let count = tables.loans.iter().filter(|l| l.category == c).count();
                (c, count as i64)
            })
            .collect())
    }

    async fn decide_loan(
        &self,
        loan_id: Uuid,
        update: LoanDecisionUpdate,
    ) -> StoreResult<Option<Loan>> {
        let mut tables = self.tables.write().await;
        Ok(match tables.loan_mut(loan_id) {
            Some(loan) if loan.status == LoanStatus::Pending => {
                update.apply_to(loan, Utc::now());
                Some(loan.clone())
            }
            _ => None,
        })
    }

    async fn record_repayment(
        &self,
        loan_id: Uuid,
        amount: Decimal,
        at: DateTime<Utc>,
    ) -> StoreResult<RepaymentOutcome> {
        let mut tables = self.tables.write().await;
        let Some(loan) = tables.loan_mut(loan_id) else {
            return Ok(RepaymentOutcome::Missing);
        };
        if loan.status != LoanStatus::Approved
            || amount <= Decimal::ZERO
            || loan.remaining_balance < amount
        {
            return Ok(RepaymentOutcome::Rejected(loan.clone()));
        }

        loan.remaining_balance -= amount;
        if loan.remaining_balance.is_zero() {
            loan.status = LoanStatus::PaidOff;
        }
        loan.updated_at = at;
        let loan = loan.clone();

        let repayment = LoanRepayment {
            id: Uuid::new_v4(),
            loan_id,
            amount,
            repayment_date: at,
        };
        tables.repayments.push(repayment.clone());

        Ok(RepaymentOutcome::Applied { loan, repayment })
    }

    async fn repayments_for_loan(&self, loan_id: Uuid) -> StoreResult<Vec<LoanRepayment>> {
        let tables = self.tables.read().await;
        let rows: Vec<LoanRepayment> = tables
            .repayments
            .iter()
            .filter(|r| r.loan_id == loan_id)
            .cloned()
            .collect();
        Ok(newest_first(&rows, |r| r.repayment_date))
    }

    async fn list_repayments(&self, user_id: Option<Uuid>) -> StoreResult<Vec<RepaymentRecord>> {
        let tables = self.tables.read().await;
        let rows: Vec<RepaymentRecord> = tables
            .repayments
            .iter()
            .filter_map(|r| {
                let (owner, loan_status) = tables.loan_owner(r.loan_id)?;
                if user_id.map_or(true, |id| id == owner) {
                    Some(RepaymentRecord {
                        id: r.id,
                        loan_id: r.loan_id,
                        amount: r.amount,
                        repayment_date: r.repayment_date,
                        user_id: owner,
                        loan_status,
                    })
                } else {
                    None
                }
            })
            .collect();
        Ok(newest_first(&rows, |r| r.repayment_date))
    }

    async fn portfolio_totals(&self) -> StoreResult<PortfolioTotals> {
        let tables = self.tables.read().await;
        Ok(PortfolioTotals {
            total_users: tables.users.len() as i64,
            flagged_users: tables.users.iter().filter(|u| u.is_flagged).count() as i64,
            active_principal: tables
                .loans
                .iter()
                .filter(|l| l.status == LoanStatus::Approved)
                .map(|l| l.amount)
                .sum(),
            total_repaid: tables.repayments.iter().map(|r| r.amount).sum(),
        })
    }

    async fn insert_reset_token(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .reset_tokens
            .insert(token_hash.to_string(), (user_id, expires_at));
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token_hash: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Uuid>> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .reset_tokens
            .remove(token_hash)
            .filter(|(_, expires_at)| *expires_at > now)
            .map(|(user_id, _)| user_id))
    }

    async fn purge_expired_reset_tokens(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.tables.write().await;
        let before = tables.reset_tokens.len();
        tables.reset_tokens.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - tables.reset_tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn new_user(email: &str, phone: &str) -> NewUser {
        NewUser {
            full_name: "Test User".to_string(),
            email: email.to_string(),
            phone: phone.to_string(),
            password_hash: "hash".to_string(),
            bvn: None,
            bank_account: None,
            id_type: None,
            kyc_status: KycStatus::Approved,
            is_admin: false,
        }
    }

    fn new_loan(user_id: Uuid, amount: Decimal) -> NewLoan {
        NewLoan {
            user_id,
            amount,
            purpose: "Phone".to_string(),
            category: LoanCategory::Electronics,
            duration_in_months: 3,
            vendor: "Store".to_string(),
        }
    }

    async fn approved_loan(store: &MemoryStore, amount: Decimal) -> Loan {
        let user = store
            .create_user(new_user("a@example.com", "0801"))
            .await
            .unwrap();
        let Admission::Opened(loan) = store
            .create_loan_within_ceiling(new_loan(user.id, amount), dec!(50000))
            .await
            .unwrap()
        else {
            panic!("loan should open");
        };
        store
            .decide_loan(loan.id, LoanDecisionUpdate::approve(dec!(5), Utc::now()))
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_duplicate_email_is_case_insensitive() {
        let store = MemoryStore::new();
        store
            .create_user(new_user("Ada@Example.com", "0801"))
            .await
            .unwrap();
        let err = store
            .create_user(new_user("ada@example.com", "0802"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[tokio::test]
    async fn test_identifier_lookup_respects_admin_filter() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user("user@example.com", "0801"))
            .await
            .unwrap();

        let by_phone = store.find_user_by_identifier("0801", false).await.unwrap();
        assert_eq!(by_phone.map(|u| u.id), Some(user.id));

        let as_admin = store
            .find_user_by_identifier("USER@example.com", true)
            .await
            .unwrap();
        assert!(as_admin.is_none());
    }

    #[tokio::test]
    async fn test_ceiling_blocks_insert() {
        let store = MemoryStore::new();
        let user = store
            .create_user(new_user("a@example.com", "0801"))
            .await
            .unwrap();
        store
            .create_loan_within_ceiling(new_loan(user.id, dec!(45000)), dec!(50000))
            .await
            .unwrap();

        let outcome = store
            .create_loan_within_ceiling(new_loan(user.id, dec!(10000)), dec!(50000))
            .await
            .unwrap();
        assert!(matches!(outcome, Admission::Exceeded { used } if used == dec!(45000)));
        assert_eq!(
            store.list_loans(&LoanFilter::for_user(user.id)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn test_decide_only_pending() {
        let store = MemoryStore::new();
        let loan = approved_loan(&store, dec!(1000)).await;
        let again = store
            .decide_loan(loan.id, LoanDecisionUpdate::approve(dec!(9), Utc::now()))
            .await
            .unwrap();
        assert!(again.is_none());
        let stored = store.get_loan(loan.id).await.unwrap().unwrap();
        assert_eq!(stored.interest_rate, dec!(5));
    }

    #[tokio::test]
    async fn test_repayment_decrements_and_pays_off() {
        let store = MemoryStore::new();
        let loan = approved_loan(&store, dec!(100)).await;

        let outcome = store
            .record_repayment(loan.id, dec!(40), Utc::now())
            .await
            .unwrap();
        let RepaymentOutcome::Applied { loan: after, .. } = outcome else {
            panic!("repayment should apply");
        };
        assert_eq!(after.remaining_balance, dec!(60));
        assert_eq!(after.status, LoanStatus::Approved);

        let outcome = store
            .record_repayment(loan.id, dec!(60), Utc::now())
            .await
            .unwrap();
        let RepaymentOutcome::Applied { loan: after, .. } = outcome else {
            panic!("repayment should apply");
        };
        assert!(after.remaining_balance.is_zero());
        assert_eq!(after.status, LoanStatus::PaidOff);

        let outcome = store
            .record_repayment(loan.id, dec!(1), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, RepaymentOutcome::Rejected(_)));
        assert_eq!(store.repayments_for_loan(loan.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_overpayment_leaves_state_untouched() {
        let store = MemoryStore::new();
        let loan = approved_loan(&store, dec!(100)).await;
        let outcome = store
            .record_repayment(loan.id, dec!(101), Utc::now())
            .await
            .unwrap();
        assert!(matches!(outcome, RepaymentOutcome::Rejected(_)));
        assert!(store.repayments_for_loan(loan.id).await.unwrap().is_empty());
        assert_eq!(
            store.get_loan(loan.id).await.unwrap().unwrap().remaining_balance,
            dec!(100)
        );
    }

    #[tokio::test]
    async fn test_reset_tokens_expire() {
        let store = MemoryStore::new();
        let user_id = Uuid::new_v4();
        let now = Utc::now();
        store
            .insert_reset_token(user_id, "live", now + chrono::Duration::minutes(5))
            .await
            .unwrap();
        store
            .insert_reset_token(user_id, "stale", now - chrono::Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(store.purge_expired_reset_tokens(now).await.unwrap(), 1);
        assert_eq!(
            store.consume_reset_token("live", now).await.unwrap(),
            Some(user_id)
        );
        assert_eq!(store.consume_reset_token("live", now).await.unwrap(), None);
    }
}
