//! HTTP route handlers for the signup API.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                      - Liveness check
//! GET  /health/ready                - Store connectivity check
//!
//! # Signup (JSON)
//! POST /api/v1/signup/email         - Stage 1: start a signup
//! POST /api/v1/signup/password      - Stage 2: set password, send passcode
//! POST /api/v1/signup/verify-otp    - Stage 3: check a passcode
//! POST /api/v1/signup/resend-otp    - Send a fresh passcode
//! POST /api/v1/signup               - Promote a verified signup to a user
//! ```

pub mod health;
pub mod signup;

use axum::{
    Router,
    http::{Request, Response},
    routing::{get, post},
};
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::state::AppState;

/// API version prefix.
pub const API_PREFIX: &str = "/api/v1";

/// Create the signup routes router.
pub fn signup_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup::complete))
        .route("/signup/email", post(signup::email))
        .route("/signup/password", post(signup::password))
        .route("/signup/verify-otp", post(signup::verify_otp))
        .route("/signup/resend-otp", post(signup::resend_otp))
}

/// Build the full application router with request tracing.
///
/// Sentry layers are added by the binary so tests can drive this router
/// without a Sentry client.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        .nest(API_PREFIX, signup_routes())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &Response<_>, latency: std::time::Duration, span: &Span| {
                        span.record("status", response.status().as_u16());
                        #[allow(clippy::cast_possible_truncation)]
                        span.record("latency_ms", latency.as_millis() as u64);
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
