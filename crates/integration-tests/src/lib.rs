//! Integration tests for the signup service.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p signup-integration-tests
//! ```
//!
//! The router is driven in-process with `tower::ServiceExt::oneshot`, backed
//! by the in-memory store and the outbox mailer, so no database or SMTP
//! server is needed.
//!
//! # Test Categories
//!
//! - `signup_flow` - The staged flow end to end
//! - `signup_failures` - Validation, compensation and dispatch policy
//! - `store_timeout` - Store operations that exceed their bound

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use serde_json::{Value, json};
use tower::ServiceExt;

use signup_core::Email;
use signup_server::db::{Collection, DocumentStore, MemoryDocumentStore, TimeoutStore};
use signup_server::routes;
use signup_server::services::{Argon2Hasher, OutboxMailer, SignupPolicy};
use signup_server::state::AppState;

/// Password used by the helpers.
pub const PASSWORD: &str = "secret123";

/// An in-process signup server and handles on its collaborators.
pub struct TestContext {
    pub store: Arc<MemoryDocumentStore>,
    pub outbox: Arc<OutboxMailer>,
    router: Router,
}

impl TestContext {
    /// Server with the default signup policy.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(SignupPolicy::default())
    }

    #[must_use]
    pub fn with_policy(policy: SignupPolicy) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let outbox = Arc::new(OutboxMailer::new());
        let bounded: Arc<dyn DocumentStore> = Arc::new(TimeoutStore::new(
            store.clone(),
            Duration::from_secs(5),
        ));
        let router = Self::router(bounded, outbox.clone(), policy);

        Self {
            store,
            outbox,
            router,
        }
    }

    /// Build a router over an arbitrary store.
    #[must_use]
    pub fn router(
        store: Arc<dyn DocumentStore>,
        outbox: Arc<OutboxMailer>,
        policy: SignupPolicy,
    ) -> Router {
        // Cheap Argon2 parameters keep the suite fast.
        let hasher = Argon2Hasher::with_params(1024, 1, 1).unwrap();
        routes::app(AppState::new(store, outbox, Arc::new(hasher), policy))
    }

    /// POST a JSON body and return the status with the parsed response body.
    pub async fn post(&self, uri: &str, body: &Value) -> (StatusCode, Value) {
        send(&self.router, uri, body).await
    }

    /// Number of pending signups.
    pub async fn pending_count(&self) -> usize {
        self.store.count(Collection::PendingSignups).await
    }

    /// Number of users.
    pub async fn user_count(&self) -> usize {
        self.store.count(Collection::Users).await
    }

    /// Stage 1; returns the signup token.
    pub async fn begin(&self, email: &str) -> String {
        let (status, body) = self
            .post("/api/v1/signup/email", &json!({ "email": email }))
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");
        body["signupToken"].as_str().unwrap().to_owned()
    }

    /// Stages 1 and 2; returns the token and the emailed passcode.
    pub async fn through_password(&self, email: &str) -> (String, u32) {
        let token = self.begin(email).await;
        let (status, body) = self
            .post(
                "/api/v1/signup/password",
                &json!({ "signupToken": token, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "{body}");

        let otp = self.last_otp(email).await.unwrap();
        (token, otp)
    }

    /// The most recent passcode emailed to `email`.
    pub async fn last_otp(&self, email: &str) -> Option<u32> {
        self.outbox
            .last_otp_for(&Email::parse(email).unwrap())
            .await
            .map(|otp| otp.as_u32())
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// POST a JSON body to `router`.
pub async fn send(router: &Router, uri: &str, body: &Value) -> (StatusCode, Value) {
    let request = Request::post(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();

    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

/// A complete promotion body for a verified signup.
#[must_use]
pub fn signup_body(token: &str, otp: u32, email: &str) -> Value {
    json!({
        "signupToken": token,
        "otp": otp,
        "username": "dishank",
        "email": email,
        "password": PASSWORD,
        "subscribed": true,
        "personal": { "age": 30, "gender": "male", "height": 180.0, "weight": 72.5 },
        "device": { "theme": "dark", "notificationStatus": true, "timezone": "Asia/Kolkata" }
    })
}

/// A passcode different from `otp` but still six digits.
#[must_use]
pub const fn other_otp(otp: u32) -> u32 {
    if otp == 999_999 { 100_000 } else { otp + 1 }
}
