//! Pay Later Backend Library
//!
//! Buy-now-pay-later lending API: accounts and KYC, loan applications
//! against a per-user credit ceiling, admin review and repayments.

pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod loan;
pub mod loan_service;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod notifier;
pub mod routes;
pub mod services;
pub mod state;
pub mod store;
