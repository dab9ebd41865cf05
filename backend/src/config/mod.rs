//! Configuration management
//!
//! Settings come from environment variables (a `.env` file is loaded first
//! when present). Parsing goes through [`Config::from_lookup`] so tests can
//! supply variables without touching the process environment.

use std::env;
use std::str::FromStr;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::auth::{AdminBootstrap, AuthSettings};
use crate::notifier::SmtpSettings;
use crate::services::credit_ledger::DEFAULT_MAX_CREDIT_LIMIT;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid environment value: {0}")]
    InvalidValue(String),

    #[error("Invalid port number: {0}")]
    InvalidPort(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "dev" | "development" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "prod" | "production" => Ok(Environment::Production),
            _ => Err(ConfigError::InvalidValue(format!(
                "Invalid environment: '{}'. Expected: dev, staging, or prod",
                s
            ))),
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

const DEV_JWT_SECRET: &str = "development-secret-change-in-production";

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub environment: Environment,
    pub port: u16,
    pub db_max_connections: u32,
    /// Requests per second per client address
    pub rate_limit_rps: u32,
    /// Key rate limits on `x-forwarded-for`; set only behind a trusted proxy
    pub trust_forwarded_headers: bool,
    /// Comma-separated; unset means any origin
    pub cors_allowed_origins: Option<String>,
    pub log_level: String,

    pub jwt_secret: String,
    pub jwt_access_token_ttl_seconds: i64,
    pub password_reset_ttl_minutes: i64,
    pub bcrypt_cost: u32,
    /// Front-end origin used in password reset links
    pub public_base_url: String,

    pub max_credit_limit: Decimal,
    pub interest_rate_min: Decimal,
    pub interest_rate_max: Decimal,

    /// `None` selects the logging mailer
    pub smtp: Option<SmtpSettings>,
    pub admin: Option<AdminBootstrap>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = var("ENVIRONMENT")
            .map(|s| Environment::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let database_url =
            var("DATABASE_URL").ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".into()))?;

        let port = match var("PORT") {
            Some(p) => p
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::InvalidPort(format!("PORT must be a valid number, got '{}'", p)))?,
            None => 3000,
        };

        let jwt_secret = match var("JWT_SECRET") {
            Some(secret) => secret,
            None if environment.is_production() => {
                return Err(ConfigError::MissingEnvVar("JWT_SECRET".into()))
            }
            None => DEV_JWT_SECRET.to_string(),
        };

        let interest_rate_min = parse_or(&var, "INTEREST_RATE_MIN", Decimal::new(300, 2))?;
        let interest_rate_max = parse_or(&var, "INTEREST_RATE_MAX", Decimal::new(1000, 2))?;
        if interest_rate_min < Decimal::ZERO || interest_rate_min > interest_rate_max {
            return Err(ConfigError::InvalidValue(format!(
                "INTEREST_RATE_MIN ({}) must be non-negative and not above INTEREST_RATE_MAX ({})",
                interest_rate_min, interest_rate_max
            )));
        }

        let max_credit_limit = parse_or(&var, "MAX_CREDIT_LIMIT", DEFAULT_MAX_CREDIT_LIMIT)?;
        if max_credit_limit <= Decimal::ZERO {
            return Err(ConfigError::InvalidValue(
                "MAX_CREDIT_LIMIT must be positive".to_string(),
            ));
        }

        let bcrypt_cost = parse_or(&var, "BCRYPT_COST", 10u32)?;
        if !(4..=31).contains(&bcrypt_cost) {
            return Err(ConfigError::InvalidValue(
                "BCRYPT_COST must be between 4 and 31".to_string(),
            ));
        }

        let smtp = match var("SMTP_HOST") {
            Some(host) => Some(SmtpSettings {
                port: parse_or(&var, "SMTP_PORT", 587u16)?,
                username: var("SMTP_USERNAME"),
                password: var("SMTP_PASSWORD"),
                from: var("MAIL_FROM")
                    .ok_or_else(|| ConfigError::MissingEnvVar("MAIL_FROM".into()))?,
                host,
            }),
            None => None,
        };

        let admin = match (var("ADMIN_EMAIL"), var("ADMIN_PHONE"), var("ADMIN_PASSWORD")) {
            (Some(email), Some(phone), Some(password)) => Some(AdminBootstrap {
                full_name: var("ADMIN_NAME").unwrap_or_else(|| "Administrator".to_string()),
                email,
                phone,
                password,
            }),
            _ => None,
        };

        Ok(Config {
            database_url,
            environment,
            port,
            db_max_connections: parse_or(&var, "DB_MAX_CONNECTIONS", 5)?,
            rate_limit_rps: parse_or(&var, "RATE_LIMIT_RPS", 100)?,
            trust_forwarded_headers: parse_or(&var, "TRUST_FORWARDED_HEADERS", false)?,
            cors_allowed_origins: var("CORS_ALLOWED_ORIGINS"),
            log_level: var("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            jwt_secret,
            jwt_access_token_ttl_seconds: parse_or(&var, "JWT_ACCESS_TOKEN_TTL_SECONDS", 3600)?,
            password_reset_ttl_minutes: parse_or(&var, "PASSWORD_RESET_TTL_MINUTES", 30)?,
            bcrypt_cost,
            public_base_url: var("PUBLIC_BASE_URL")
                .unwrap_or_else(|| "http://localhost:5173".to_string()),
            max_credit_limit,
            interest_rate_min,
            interest_rate_max,
            smtp,
            admin,
        })
    }

    pub fn auth_settings(&self) -> AuthSettings {
        AuthSettings {
            jwt_secret: self.jwt_secret.clone(),
            access_token_ttl_seconds: self.jwt_access_token_ttl_seconds,
            reset_token_ttl_minutes: self.password_reset_ttl_minutes,
            public_base_url: self.public_base_url.clone(),
        }
    }

    /// Database URL with the password replaced, for logging
    pub fn database_url_masked(&self) -> String {
        if let Some(at_pos) = self.database_url.find('@') {
            if let Some(colon_pos) = self.database_url[..at_pos].rfind(':') {
                let prefix = &self.database_url[..colon_pos + 1];
                let suffix = &self.database_url[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.database_url.clone()
    }
}

fn parse_or<T, V>(var: &V, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    V: Fn(&str) -> Option<String>,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(format!("{} has invalid value '{}'", key, raw))),
        None => Ok(default),
    }
}
