//! Pay Later Backend Server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::signal;

use paylater_backend::app::{build_router, cors_layer};
use paylater_backend::config::Config;
use paylater_backend::db;
use paylater_backend::maintenance::maintenance_loop;
use paylater_backend::middleware::RateLimiter;
use paylater_backend::notifier::{LogMailer, Mailer, Notifier, SmtpMailer};
use paylater_backend::services::UniformRatePolicy;
use paylater_backend::state::{AppSettings, AppState};
use paylater_backend::store::{PgStore, Store};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_level)),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    tracing::info!(environment = config.environment.as_str(), "Starting Pay Later backend");

    let pool = db::create_pool(&config).await?;
    db::run_migrations(&pool).await?;
    let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, port = smtp.port, "SMTP delivery enabled");
            Arc::new(SmtpMailer::new(smtp).context("Failed to configure SMTP transport")?)
        }
        None => {
            tracing::warn!("SMTP_HOST not set, emails will only be logged");
            Arc::new(LogMailer)
        }
    };
    let (notifier, _mail_worker) = Notifier::spawn(mailer);

    let rate_policy = Arc::new(UniformRatePolicy::new(
        config.interest_rate_min,
        config.interest_rate_max,
    ));
    let state = AppState::new(
        store.clone(),
        notifier,
        rate_policy,
        AppSettings::from(&config),
    )?;

    if let Some(admin) = config.admin.clone() {
        state.auth_service.bootstrap_admin(admin).await?;
    }

    let rate_limiter = RateLimiter::new(config.rate_limit_rps)
        .trusting_forwarded_headers(config.trust_forwarded_headers);
    let maintenance_limiter = rate_limiter.clone();
    tokio::spawn(async move {
        maintenance_loop(store, maintenance_limiter).await;
        tracing::error!("Maintenance task exited unexpectedly");
    });

    let app = build_router(
        state,
        rate_limiter,
        cors_layer(config.cors_allowed_origins.as_deref()),
        config.environment.is_production(),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("Server listening on {}", addr);
    tracing::info!("Health check at http://{}/health", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}
