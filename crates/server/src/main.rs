//! Signup server - staged account creation API.
//!
//! This binary serves the signup API on port 8080.
//!
//! # Architecture
//!
//! - Axum web framework, JSON in and out
//! - `PostgreSQL` JSONB collections (or an in-memory store for local runs)
//! - Argon2id password hashing
//! - SMTP passcode delivery via lettre with Askama email templates
//!
//! # Flow
//!
//! email -> pending signup + token -> password -> emailed passcode ->
//! passcode check -> promotion to a user

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::sync::Arc;

use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use signup_server::config::{SignupConfig, StoreConfig};
use signup_server::db::{self, DocumentStore, MemoryDocumentStore, PgDocumentStore, TimeoutStore};
use signup_server::routes;
use signup_server::services::{Argon2Hasher, MailDispatcher, OutboxMailer, SmtpMailer};
use signup_server::state::AppState;

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &SignupConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            environment: config
                .sentry_environment
                .clone()
                .map(std::borrow::Cow::Owned),
            sample_rate: config.sentry_sample_rate,
            traces_sample_rate: config.sentry_traces_sample_rate,
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

/// Open the configured store and bound every operation by the store timeout.
async fn open_store(config: &SignupConfig) -> Arc<dyn DocumentStore> {
    let inner: Arc<dyn DocumentStore> = match &config.store {
        StoreConfig::Postgres(database) => {
            let pool = db::create_pool(&database.database_url)
                .await
                .expect("Failed to create database pool");
            tracing::info!(schema = %database.namespace.schema, "Database pool created");

            // NOTE: Collections are NOT created automatically on startup.
            // Create them explicitly via: cargo run -p signup-cli -- migrate
            Arc::new(
                PgDocumentStore::new(pool, database.namespace.clone())
                    .expect("Invalid collection names"),
            )
        }
        StoreConfig::Memory => {
            tracing::warn!("Using in-memory store; data is lost on restart");
            Arc::new(MemoryDocumentStore::new())
        }
    };

    Arc::new(TimeoutStore::new(inner, config.store_timeout))
}

/// SMTP mailer, or the in-memory outbox (config only allows that in development).
fn build_mailer(config: &SignupConfig) -> Arc<dyn MailDispatcher> {
    match &config.email {
        Some(email) => {
            Arc::new(SmtpMailer::new(email).expect("Failed to configure SMTP transport"))
        }
        None => {
            tracing::warn!("SMTP not configured; signup email is recorded in memory, not delivered");
            Arc::new(OutboxMailer::new())
        }
    }
}

#[tokio::main]
async fn main() {
    // Load configuration from environment (needed for Sentry init)
    let config = SignupConfig::from_env().expect("Failed to load configuration");

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crate if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "signup_server=info,tower_http=debug".into());

    let json_layer = config
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().flatten_event(true));
    let text_layer = (!config.log_json).then(tracing_subscriber::fmt::layer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    let store = open_store(&config).await;
    let mailer = build_mailer(&config);
    let state = AppState::new(
        store,
        mailer,
        Arc::new(Argon2Hasher::new()),
        config.policy(),
    );

    let app = routes::app(state)
        // Sentry layers (outermost for full request coverage)
        .layer(sentry_tower::NewSentryLayer::new_from_top())
        .layer(sentry_tower::SentryHttpLayer::new().enable_transaction());

    // Start server
    let addr = config.socket_addr();
    tracing::info!("signup server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
