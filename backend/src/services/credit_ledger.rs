//! Credit ledger
//!
//! A user's used credit is the principal of every loan still pending or
//! approved. It is never cached; each call reads the current loan table.

use std::sync::Arc;

use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{remaining_credit, ServiceError};
use crate::loan::{Admission, Loan, LoanRepayment, NewLoan};
use crate::store::Store;

/// Global per-user ceiling when `MAX_CREDIT_LIMIT` is not configured
pub const DEFAULT_MAX_CREDIT_LIMIT: Decimal = Decimal::from_parts(50000, 0, 0, false, 0);

/// Sum principal over loans that still occupy credit
pub fn used_credit_of<'a>(loans: impl IntoIterator<Item = &'a Loan>) -> Decimal {
    loans
        .into_iter()
        .filter(|l| l.status.counts_against_credit())
        .map(|l| l.amount)
        .sum()
}

/// The admission rule every store applies under its per-user lock
pub fn within_ceiling(used: Decimal, requested: Decimal, ceiling: Decimal) -> bool {
    used + requested <= ceiling
}

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub user_id: Uuid,
    pub total_credit_limit: Decimal,
    pub used_credit: Decimal,
    pub available_credit: Decimal,
    pub repayments: Vec<LoanRepayment>,
}

#[derive(Clone)]
pub struct CreditLedger {
    store: Arc<dyn Store>,
    ceiling: Decimal,
}

impl CreditLedger {
    pub fn new(store: Arc<dyn Store>, ceiling: Decimal) -> Self {
        Self { store, ceiling }
    }

    pub fn ceiling(&self) -> Decimal {
        self.ceiling
    }

    pub async fn used_credit(&self, user_id: Uuid) -> Result<Decimal, ServiceError> {
        Ok(self.store.used_credit(user_id).await?)
    }

    /// Admit and persist a new application in one step.
    ///
    /// The check runs inside the store against the live loan table, so two
    /// concurrent applications cannot both slip under the ceiling.
    pub async fn open_loan(&self, loan: NewLoan) -> Result<Loan, ServiceError> {
        let requested = loan.amount;
        match self
            .store
            .create_loan_within_ceiling(loan, self.ceiling)
            .await?
        {
            Admission::Opened(loan) => Ok(loan),
            Admission::Exceeded { used } => {
                tracing::info!(
                    requested = %requested,
                    used = %used,
                    ceiling = %self.ceiling,
                    "Loan application refused by credit ceiling"
                );
                Err(ServiceError::LimitExceeded {
                    requested,
                    used,
                    ceiling: self.ceiling,
                })
            }
        }
    }

    pub async fn summary(&self, user_id: Uuid) -> Result<CreditSummary, ServiceError> {
        let used_credit = self.used_credit(user_id).await?;
        let repayments = self
            .store
            .list_repayments(Some(user_id))
            .await?
            .iter()
            .map(|r| r.repayment())
            .collect();

        Ok(CreditSummary {
            user_id,
            total_credit_limit: self.ceiling,
            used_credit,
            available_credit: remaining_credit(&used_credit, &self.ceiling),
            repayments,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loan::{LoanCategory, LoanStatus};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn loan_with(amount: Decimal, status: LoanStatus) -> Loan {
        let mut loan = NewLoan {
            user_id: Uuid::new_v4(),
            amount,
            purpose: "Fridge".to_string(),
            category: LoanCategory::HomeAppliances,
            duration_in_months: 4,
            vendor: "Shop".to_string(),
        }
        .into_loan(Utc::now());
        loan.status = status;
        loan
    }

    #[test]
    fn test_default_ceiling() {
        assert_eq!(DEFAULT_MAX_CREDIT_LIMIT, dec!(50000));
    }

    #[test]
    fn test_only_open_loans_count() {
        let loans = vec![
            loan_with(dec!(1000), LoanStatus::Pending),
            loan_with(dec!(2000), LoanStatus::Approved),
            loan_with(dec!(4000), LoanStatus::Rejected),
            loan_with(dec!(8000), LoanStatus::PaidOff),
        ];
        assert_eq!(used_credit_of(&loans), dec!(3000));
    }

    #[test]
    fn test_admission_boundary() {
        assert!(within_ceiling(dec!(45000), dec!(5000), dec!(50000)));
        assert!(!within_ceiling(dec!(45000), dec!(10000), dec!(50000)));
        assert!(!within_ceiling(dec!(50000.01), dec!(0), dec!(50000)));
    }
}
