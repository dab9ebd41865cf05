//! Loan service layer - lifecycle and read projections
//!
//! Applications pass the credit ledger, decisions pass the admin gate,
//! repayments mutate the balance through a conditional store update. Each
//! state change is committed before its notification is queued.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use rust_decimal::{Decimal, RoundingStrategy};
use uuid::Uuid;

use crate::error::ServiceError;
use crate::loan::{
    round2, ActiveLoanView, ApplyLoanRequest, CategoryShare, Decision, GroupedLoanHistory,
    InterestProjection, Loan, LoanApplicationView, LoanCategory, LoanDecisionUpdate, LoanFilter,
    LoanHistoryEntry, LoanRepayment, LoanStatus, NewLoan, RepayLoanRequest, RepaymentOutcome,
    ReviewLoanRequest, ScheduleEntry, UserLoanTotal,
};
use crate::models::{KycStatus, User};
use crate::notifier::{templates, Notifier};
use crate::services::admin::AdminGate;
use crate::services::credit_ledger::{CreditLedger, CreditSummary};
use crate::services::rate_policy::RatePolicy;
use crate::store::Store;

/// Loan service for managing the loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn Store>,
    ledger: CreditLedger,
    gate: AdminGate,
    rate_policy: Arc<dyn RatePolicy>,
    notifier: Notifier,
}

impl LoanService {
    pub fn new(
        store: Arc<dyn Store>,
        ledger: CreditLedger,
        gate: AdminGate,
        rate_policy: Arc<dyn RatePolicy>,
        notifier: Notifier,
    ) -> Self {
        Self {
            store,
            ledger,
            gate,
            rate_policy,
            notifier,
        }
    }

    pub fn ledger(&self) -> &CreditLedger {
        &self.ledger
    }

    /// Open a pending application.
    ///
    /// Checks run in order and the first failure wins: user exists, not
    /// flagged, KYC approved, valid input, credit ceiling.
    pub async fn apply_loan(&self, request: ApplyLoanRequest) -> Result<Loan, ServiceError> {
        let user = self.require_user(request.user_id).await?;

        if user.is_flagged {
            return Err(ServiceError::Forbidden(
                "Your account has been flagged. You cannot apply for a loan.".to_string(),
            ));
        }
        if user.kyc_status != KycStatus::Approved {
            return Err(ServiceError::Forbidden(
                "KYC not approved. You cannot apply for a loan.".to_string(),
            ));
        }

        let category: LoanCategory = request.category.parse().map_err(ServiceError::InvalidInput)?;
        validate_amount(request.amount)?;
        if request.duration_in_months <= 0 {
            return Err(ServiceError::InvalidInput(
                "Duration must be at least one month".to_string(),
            ));
        }

        let loan = self
            .ledger
            .open_loan(NewLoan {
                user_id: user.id,
                amount: request.amount,
                purpose: request.purpose.trim().to_string(),
                category,
                duration_in_months: request.duration_in_months,
                vendor: request.vendor.trim().to_string(),
            })
            .await?;

        tracing::info!(
            loan_id = %loan.id,
            user_id = %user.id,
            amount = %loan.amount,
            category = %loan.category,
            "Loan application submitted"
        );
        self.notifier
            .notify(templates::application_received(&user.email, loan.amount));

        Ok(loan)
    }

    /// Approve or reject a pending loan on behalf of an authenticated admin
    pub async fn approve_loan(
        &self,
        loan_id: Uuid,
        request: ReviewLoanRequest,
    ) -> Result<Loan, ServiceError> {
        let admin = self
            .gate
            .authorize(&request.admin_id, &request.admin_password)
            .await?;

        let loan = self.require_loan(loan_id).await?;
        if loan.status != LoanStatus::Pending {
            return Err(already_decided(loan.status));
        }

        let update = match request.decision {
            Decision::Approve => {
                LoanDecisionUpdate::approve(self.rate_policy.assign_rate(), Utc::now())
            }
            Decision::Reject => LoanDecisionUpdate::reject(),
        };

        // A concurrent decision may have landed since the read above
        let loan = match self.store.decide_loan(loan_id, update).await? {
            Some(loan) => loan,
            None => {
                let current = self.require_loan(loan_id).await?;
                return Err(already_decided(current.status));
            }
        };

        tracing::info!(
            loan_id = %loan.id,
            admin_id = %admin.id,
            status = %loan.status,
            interest_rate = %loan.interest_rate,
            "Loan decided"
        );

        match self.store.get_user(loan.user_id).await {
            Ok(Some(user)) => self.notifier.notify(templates::loan_decision(
                &user.email,
                request.decision,
                loan.interest_rate,
            )),
            Ok(None) => tracing::warn!(loan_id = %loan.id, "Borrower missing, decision email skipped"),
            Err(e) => tracing::warn!(loan_id = %loan.id, error = %e, "Borrower lookup failed, decision email skipped"),
        }

        Ok(loan)
    }

    /// Record a repayment against an approved loan owned by `request.user_id`
    pub async fn repay_loan(
        &self,
        loan_id: Uuid,
        request: RepayLoanRequest,
    ) -> Result<Loan, ServiceError> {
        let loan = self.require_loan(loan_id).await?;

        if loan.user_id != request.user_id {
            return Err(ServiceError::Forbidden(
                "You are not authorized to repay this loan".to_string(),
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(ServiceError::InvalidInput(
                "Repayment amount must be greater than zero".to_string(),
            ));
        }
        validate_amount(request.amount)?;
        check_repayable(&loan, request.amount)?;

        let (loan, repayment) = match self
            .store
            .record_repayment(loan_id, request.amount, Utc::now())
            .await?
        {
            RepaymentOutcome::Applied { loan, repayment } => (loan, repayment),
            // Lost a race with another repayment; report against fresh state
            RepaymentOutcome::Rejected(current) => {
                check_repayable(&current, request.amount)?;
                return Err(ServiceError::InvalidState(
                    "Loan changed during repayment, please retry".to_string(),
                ));
            }
            RepaymentOutcome::Missing => {
                return Err(ServiceError::NotFound("Loan not found".to_string()))
            }
        };

        tracing::info!(
            loan_id = %loan.id,
            repayment_id = %repayment.id,
            amount = %repayment.amount,
            remaining_balance = %loan.remaining_balance,
            status = %loan.status,
            "Repayment recorded"
        );

        match self.store.get_user(loan.user_id).await {
            Ok(Some(user)) => self.notifier.notify(templates::repayment_received(
                &user.email,
                repayment.amount,
                loan.remaining_balance,
            )),
            Ok(None) => tracing::warn!(loan_id = %loan.id, "Borrower missing, receipt email skipped"),
            Err(e) => tracing::warn!(loan_id = %loan.id, error = %e, "Borrower lookup failed, receipt email skipped"),
        }

        Ok(loan)
    }

    // ----- read projections -----

    pub async fn get_loan(&self, loan_id: Uuid) -> Result<Loan, ServiceError> {
        self.require_loan(loan_id).await
    }

    /// Every application with borrower name and payments, newest first
    pub async fn all_applications(&self) -> Result<Vec<LoanApplicationView>, ServiceError> {
        let names: HashMap<Uuid, String> = self
            .store
            .list_users()
            .await?
            .into_iter()
            .map(|u| (u.id, u.full_name))
            .collect();

        let mut payments: HashMap<Uuid, Vec<LoanRepayment>> = HashMap::new();
        for record in self.store.list_repayments(None).await? {
            payments
                .entry(record.loan_id)
                .or_default()
                .push(record.repayment());
        }

        let loans = self.store.list_loans(&LoanFilter::default()).await?;
        Ok(loans
            .into_iter()
            .map(|loan| LoanApplicationView {
                full_name: names.get(&loan.user_id).cloned(),
                payment_history: payments.remove(&loan.id).unwrap_or_default(),
                loan,
            })
            .collect())
    }

    pub async fn loan_history(&self, user_id: Uuid) -> Result<Vec<LoanHistoryEntry>, ServiceError> {
        let loans = self.store.list_loans(&LoanFilter::for_user(user_id)).await?;
        let mut history = Vec::with_capacity(loans.len());
        for loan in loans {
            let repayments = self.store.repayments_for_loan(loan.id).await?;
            history.push(LoanHistoryEntry::new(loan, repayments));
        }
        Ok(history)
    }

    pub async fn grouped_history(&self, user_id: Uuid) -> Result<GroupedLoanHistory, ServiceError> {
        let user = self.require_user(user_id).await?;
        Ok(GroupedLoanHistory {
            user_id: user.id,
            name: user.full_name,
            loans: self.loan_history(user_id).await?,
        })
    }

    pub async fn loans_by_user(&self, user_id: Uuid) -> Result<Vec<Loan>, ServiceError> {
        Ok(self.store.list_loans(&LoanFilter::for_user(user_id)).await?)
    }

    pub async fn loans_by_category(&self, category: &str) -> Result<Vec<Loan>, ServiceError> {
        let category: LoanCategory = category.parse().map_err(ServiceError::InvalidInput)?;
        Ok(self
            .store
            .list_loans(&LoanFilter {
                category: Some(category),
                ..LoanFilter::default()
            })
            .await?)
    }

    /// Share of all loans per category as a rounded integer percentage
    pub async fn category_stats(&self) -> Result<Vec<CategoryShare>, ServiceError> {
        let counts = self.store.count_loans_by_category().await?;
        Ok(category_shares(&counts))
    }

    pub async fn user_total(&self, user_id: Uuid) -> Result<UserLoanTotal, ServiceError> {
        let loans = self.store.list_loans(&LoanFilter::for_user(user_id)).await?;
        Ok(UserLoanTotal {
            user_id,
            total_loan: loans.iter().map(|l| l.amount).sum(),
        })
    }

    pub async fn credit_summary(&self, user_id: Uuid) -> Result<CreditSummary, ServiceError> {
        self.ledger.summary(user_id).await
    }

    pub async fn repayment_history(
        &self,
        loan_id: Uuid,
    ) -> Result<Vec<LoanRepayment>, ServiceError> {
        self.require_loan(loan_id).await?;
        Ok(self.store.repayments_for_loan(loan_id).await?)
    }

    /// Approved loans with their projected interest, newest first
    pub async fn repayment_schedule(&self, user_id: Uuid) -> Result<Vec<ScheduleEntry>, ServiceError> {
        let user = self.require_user(user_id).await?;
        let loans = self
            .store
            .list_loans(&LoanFilter {
                user_id: Some(user_id),
                statuses: Some(vec![LoanStatus::Approved]),
                ..LoanFilter::default()
            })
            .await?;

        Ok(loans
            .into_iter()
            .map(|loan| ScheduleEntry {
                projection: InterestProjection::for_loan(&loan),
                loan_id: loan.id,
                category: loan.category,
                purpose: loan.purpose,
                vendor: loan.vendor,
                duration_in_months: loan.duration_in_months,
                interest_rate: loan.interest_rate,
                user_id: user.id,
                name: user.full_name.clone(),
                created_at: loan.created_at,
            })
            .collect())
    }

    /// The oldest still-approved loan, else the latest paid-off one
    pub async fn active_loan(&self, user_id: Uuid) -> Result<ActiveLoanView, ServiceError> {
        let loans = self
            .store
            .list_loans(&LoanFilter {
                user_id: Some(user_id),
                statuses: Some(vec![LoanStatus::Approved, LoanStatus::PaidOff]),
                ..LoanFilter::default()
            })
            .await?;

        let loan = loans
            .iter()
            .rev()
            .find(|l| l.status == LoanStatus::Approved)
            .or_else(|| loans.first())
            .cloned()
            .ok_or_else(|| {
                ServiceError::NotFound("No approved loan found for this user".to_string())
            })?;

        let mut repayments = self.store.repayments_for_loan(loan.id).await?;
        repayments.reverse();
        let total_paid = repayments.iter().map(|r| r.amount).sum();

        Ok(ActiveLoanView {
            loan,
            repayments,
            total_paid,
        })
    }

    async fn require_user(&self, user_id: Uuid) -> Result<User, ServiceError> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("User not found".to_string()))
    }

    async fn require_loan(&self, loan_id: Uuid) -> Result<Loan, ServiceError> {
        self.store
            .get_loan(loan_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Loan not found".to_string()))
    }
}

fn validate_amount(amount: Decimal) -> Result<(), ServiceError> {
    if amount <= Decimal::ZERO {
        return Err(ServiceError::InvalidInput(
            "Amount must be greater than zero".to_string(),
        ));
    }
    if amount.normalize().scale() > 2 {
        return Err(ServiceError::InvalidInput(
            "Amount cannot have more than two decimal places".to_string(),
        ));
    }
    Ok(())
}

fn already_decided(status: LoanStatus) -> ServiceError {
    ServiceError::InvalidState(format!("Loan has already been decided (status: {})", status))
}

/// Whether `amount` may be paid against `loan` in its current state
fn check_repayable(loan: &Loan, amount: Decimal) -> Result<(), ServiceError> {
    match loan.status {
        LoanStatus::Approved => {}
        LoanStatus::PaidOff => {
            return Err(ServiceError::InvalidState(
                "Loan is already paid off".to_string(),
            ))
        }
        other => {
            return Err(ServiceError::InvalidState(format!(
                "Only approved loans can be repaid (status: {})",
                other
            )))
        }
    }
    if amount > loan.remaining_balance {
        return Err(ServiceError::InvalidInput(format!(
            "Repayment exceeds remaining balance of {}",
            round2(loan.remaining_balance)
        )));
    }
    Ok(())
}

fn category_shares(counts: &[(LoanCategory, i64)]) -> Vec<CategoryShare> {
    let total: i64 = counts.iter().map(|(_, n)| n).sum();
    LoanCategory::ALL
        .into_iter()
        .map(|category| {
            let count = counts
                .iter()
                .find(|(c, _)| *c == category)
                .map_or(0, |(_, n)| *n);
            let value: i64 = if total > 0 {
                (Decimal::from(count) * Decimal::ONE_HUNDRED / Decimal::from(total))
                    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                    .try_into()
                    .unwrap_or(0)
            } else {
                0
            };
            CategoryShare { category, value }
        })
        .collect()
}
