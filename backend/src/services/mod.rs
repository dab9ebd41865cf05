//! Business logic services

pub mod admin;
pub mod analytics;
pub mod credit_ledger;
pub mod rate_policy;

pub use admin::{AdminGate, AdminService};
pub use analytics::AnalyticsService;
pub use credit_ledger::CreditLedger;
pub use rate_policy::{FixedRatePolicy, RatePolicy, UniformRatePolicy};
