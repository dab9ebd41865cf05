//! Dashboard analytics

use std::sync::Arc;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::error::ServiceError;
use crate::store::{PortfolioTotals, Store};

#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total_users: i64,
    /// Principal of loans currently approved
    pub active_loan_amount: Decimal,
    /// Total repaid over active principal, e.g. `"42.5%"`
    pub repayment_rate: String,
    pub flagged_accounts: i64,
}

impl From<PortfolioTotals> for DashboardSummary {
    fn from(totals: PortfolioTotals) -> Self {
        Self {
            total_users: totals.total_users,
            active_loan_amount: totals.active_principal,
            repayment_rate: repayment_rate(totals.total_repaid, totals.active_principal),
            flagged_accounts: totals.flagged_users,
        }
    }
}

/// One decimal place, `"0.0%"` when nothing is outstanding
pub fn repayment_rate(repaid: Decimal, principal: Decimal) -> String {
    if principal <= Decimal::ZERO {
        return "0.0%".to_string();
    }
    let rate = (repaid * Decimal::ONE_HUNDRED / principal)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero);
    format!("{:.1}%", rate)
}

#[derive(Clone)]
pub struct AnalyticsService {
    store: Arc<dyn Store>,
}

impl AnalyticsService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn dashboard_summary(&self) -> Result<DashboardSummary, ServiceError> {
        Ok(self.store.portfolio_totals().await?.into())
    }
}
