//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;
use rust_decimal::Decimal;

use crate::auth::{AuthService, AuthSettings, PasswordHasher};
use crate::config::Config;
use crate::error::ServiceError;
use crate::loan_service::LoanService;
use crate::notifier::Notifier;
use crate::services::{AdminGate, AdminService, AnalyticsService, CreditLedger, RatePolicy};
use crate::store::Store;

/// Knobs the services are built with
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub max_credit_limit: Decimal,
    pub bcrypt_cost: u32,
    pub auth: AuthSettings,
}

impl From<&Config> for AppSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_credit_limit: config.max_credit_limit,
            bcrypt_cost: config.bcrypt_cost,
            auth: config.auth_settings(),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub auth_service: Arc<AuthService>,
    pub loan_service: Arc<LoanService>,
    pub admin_service: Arc<AdminService>,
    pub analytics_service: Arc<AnalyticsService>,
}

impl AppState {
    /// Wire every service over one store and one notification queue
    pub fn new(
        store: Arc<dyn Store>,
        notifier: Notifier,
        rate_policy: Arc<dyn RatePolicy>,
        settings: AppSettings,
    ) -> Result<Self, ServiceError> {
        let hasher = PasswordHasher::new(settings.bcrypt_cost)?;
        let gate = AdminGate::new(store.clone(), hasher.clone());
        let ledger = CreditLedger::new(store.clone(), settings.max_credit_limit);

        Ok(Self {
            auth_service: Arc::new(AuthService::new(
                store.clone(),
                hasher,
                notifier.clone(),
                settings.auth,
            )),
            loan_service: Arc::new(LoanService::new(
                store.clone(),
                ledger,
                gate.clone(),
                rate_policy,
                notifier.clone(),
            )),
            admin_service: Arc::new(AdminService::new(store.clone(), gate, notifier)),
            analytics_service: Arc::new(AnalyticsService::new(store.clone())),
            store,
        })
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.store.clone()
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}

impl FromRef<AppState> for Arc<LoanService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.loan_service.clone()
    }
}

impl FromRef<AppState> for Arc<AdminService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.admin_service.clone()
    }
}

impl FromRef<AppState> for Arc<AnalyticsService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.analytics_service.clone()
    }
}
