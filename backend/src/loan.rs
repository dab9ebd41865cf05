//! Loan models for the pay-later backend
use std::fmt;
use std::str::FromStr;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

/// Loan status. `pending -> approved -> paid off`, or `pending -> rejected`.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Rejected,
    #[sqlx(rename = "paid off")]
    #[serde(rename = "paid off")]
    PaidOff,
}

impl LoanStatus {
    /// Whether a loan in this status still occupies credit headroom
    pub fn counts_against_credit(self) -> bool {
        matches!(self, LoanStatus::Pending | LoanStatus::Approved)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, LoanStatus::Rejected | LoanStatus::PaidOff)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoanStatus::Pending => "pending",
            LoanStatus::Approved => "approved",
            LoanStatus::Rejected => "rejected",
            LoanStatus::PaidOff => "paid off",
        }
    }
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merchant categories a loan can finance
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, Hash)]
#[sqlx(type_name = "loan_category", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanCategory {
    Fashion,
    Electronics,
    #[sqlx(rename = "home appliances")]
    #[serde(rename = "home appliances")]
    HomeAppliances,
}

impl LoanCategory {
    pub const ALL: [LoanCategory; 3] = [
        LoanCategory::Fashion,
        LoanCategory::Electronics,
        LoanCategory::HomeAppliances,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            LoanCategory::Fashion => "fashion",
            LoanCategory::Electronics => "electronics",
            LoanCategory::HomeAppliances => "home appliances",
        }
    }
}

impl FromStr for LoanCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        LoanCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| format!("Invalid loan category: '{}'", s))
    }
}

impl fmt::Display for LoanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Admin verdict on a pending application
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Approve,
    Reject,
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Loan {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub purpose: String,
    pub category: LoanCategory,
    pub duration_in_months: i32,
    pub status: LoanStatus,
    pub interest_rate: Decimal,
    pub remaining_balance: Decimal,
    pub vendor: String,
    pub loan_type: String,
    pub repayment_type: String,
    pub approval_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub const UNDECIDED_TERMS: &str = "undecided";

/// Validated application ready to persist
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub purpose: String,
    pub category: LoanCategory,
    pub duration_in_months: i32,
    pub vendor: String,
}

impl NewLoan {
    /// Fresh application: pending, no interest, full balance outstanding
    pub fn into_loan(self, now: DateTime<Utc>) -> Loan {
        Loan {
            id: Uuid::new_v4(),
            user_id: self.user_id,
            amount: self.amount,
            purpose: self.purpose,
            category: self.category,
            duration_in_months: self.duration_in_months,
            status: LoanStatus::Pending,
            interest_rate: Decimal::ZERO,
            remaining_balance: self.amount,
            vendor: self.vendor,
            loan_type: UNDECIDED_TERMS.to_string(),
            repayment_type: UNDECIDED_TERMS.to_string(),
            approval_date: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field changes applied when an admin decides a pending loan
#[derive(Debug, Clone)]
pub struct LoanDecisionUpdate {
    pub status: LoanStatus,
    pub interest_rate: Decimal,
    pub approval_date: Option<DateTime<Utc>>,
    pub loan_type: String,
    pub repayment_type: String,
}

impl LoanDecisionUpdate {
    pub fn approve(interest_rate: Decimal, at: DateTime<Utc>) -> Self {
        Self {
            status: LoanStatus::Approved,
            interest_rate,
            approval_date: Some(at),
            loan_type: "personal".to_string(),
            repayment_type: "monthly".to_string(),
        }
    }

    pub fn reject() -> Self {
        Self {
            status: LoanStatus::Rejected,
            interest_rate: Decimal::ZERO,
            approval_date: None,
            loan_type: UNDECIDED_TERMS.to_string(),
            repayment_type: UNDECIDED_TERMS.to_string(),
        }
    }

    pub fn apply_to(&self, loan: &mut Loan, now: DateTime<Utc>) {
        loan.status = self.status;
        loan.interest_rate = self.interest_rate;
        loan.approval_date = self.approval_date;
        loan.loan_type = self.loan_type.clone();
        loan.repayment_type = self.repayment_type.clone();
        loan.updated_at = now;
    }
}

/// Repayment model (append-only)
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LoanRepayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub amount: Decimal,
    pub repayment_date: DateTime<Utc>,
}

/// Result of an atomic repayment attempt in the store
#[derive(Debug, Clone)]
pub enum RepaymentOutcome {
    Applied {
        loan: Loan,
        repayment: LoanRepayment,
    },
    /// The loan changed underneath the caller; carries the current row
    Rejected(Loan),
    Missing,
}

/// Result of an atomic ceiling-checked insert in the store
#[derive(Debug, Clone)]
pub enum Admission {
    Opened(Loan),
    Exceeded { used: Decimal },
}

/// Request to apply for a loan
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ApplyLoanRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    #[validate(length(min = 1, message = "Purpose is required"))]
    pub purpose: String,
    #[validate(range(min = 1, max = 120, message = "Duration must be between 1 and 120 months"))]
    pub duration_in_months: i32,
    pub category: String,
    #[validate(length(min = 1, message = "Vendor is required"))]
    pub vendor: String,
}

/// Request to approve or reject a loan
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLoanRequest {
    #[validate(length(min = 1, message = "adminId is required"))]
    pub admin_id: String,
    #[validate(length(min = 1, message = "adminPassword is required"))]
    pub admin_password: String,
    pub decision: Decision,
}

/// Request to record a repayment
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepayLoanRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
}

/// Loan listing filter; all fields optional
#[derive(Debug, Default, Clone)]
pub struct LoanFilter {
    pub user_id: Option<Uuid>,
    pub category: Option<LoanCategory>,
    pub statuses: Option<Vec<LoanStatus>>,
}

impl LoanFilter {
    pub fn for_user(user_id: Uuid) -> Self {
        Self {
            user_id: Some(user_id),
            ..Self::default()
        }
    }

    pub fn matches(&self, loan: &Loan) -> bool {
        self.user_id.map_or(true, |id| loan.user_id == id)
            && self.category.map_or(true, |c| loan.category == c)
            && self
                .statuses
                .as_ref()
                .map_or(true, |s| s.contains(&loan.status))
    }
}

/// Round to cents, half away from zero
pub fn round2(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Interest owed over the life of the loan, derived from stored fields only
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InterestProjection {
    pub interest_amount: Decimal,
    pub total_repayable: Decimal,
}

impl InterestProjection {
    pub fn for_loan(loan: &Loan) -> Self {
        Self::compute(loan.amount, loan.interest_rate)
    }

    pub fn compute(amount: Decimal, interest_rate: Decimal) -> Self {
        let interest_amount = round2(amount * interest_rate / Decimal::ONE_HUNDRED);
        Self {
            interest_amount,
            total_repayable: round2(amount + interest_amount),
        }
    }
}

/// One approved loan in a borrower's repayment schedule
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub loan_id: Uuid,
    pub category: LoanCategory,
    pub purpose: String,
    pub vendor: String,
    pub duration_in_months: i32,
    pub interest_rate: Decimal,
    #[serde(flatten)]
    pub projection: InterestProjection,
    pub user_id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

/// Loan plus its repayments, newest loan first
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoanHistoryEntry {
    pub loan_id: Uuid,
    pub amount_approved: Decimal,
    pub status: LoanStatus,
    pub interest_rate: Decimal,
    pub duration_in_months: i32,
    pub category: LoanCategory,
    pub purpose: String,
    pub vendor: String,
    pub created_at: DateTime<Utc>,
    pub remaining_balance: Decimal,
    pub repayments: Vec<LoanRepayment>,
}

impl LoanHistoryEntry {
    pub fn new(loan: Loan, repayments: Vec<LoanRepayment>) -> Self {
        Self {
            loan_id: loan.id,
            amount_approved: loan.amount,
            status: loan.status,
            interest_rate: loan.interest_rate,
            duration_in_months: loan.duration_in_months,
            category: loan.category,
            purpose: loan.purpose,
            vendor: loan.vendor,
            created_at: loan.created_at,
            remaining_balance: loan.remaining_balance,
            repayments,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GroupedLoanHistory {
    pub user_id: Uuid,
    pub name: String,
    pub loans: Vec<LoanHistoryEntry>,
}

/// Every application with borrower identity, for the admin list
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LoanApplicationView {
    #[serde(flatten)]
    pub loan: Loan,
    pub full_name: Option<String>,
    pub payment_history: Vec<LoanRepayment>,
}

/// The borrower's current (approved or paid-off) loan with its payments
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActiveLoanView {
    #[serde(flatten)]
    pub loan: Loan,
    pub repayments: Vec<LoanRepayment>,
    pub total_paid: Decimal,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CategoryShare {
    pub category: LoanCategory,
    /// Integer percentage of all loans
    pub value: i64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserLoanTotal {
    pub user_id: Uuid,
    pub total_loan: Decimal,
}
