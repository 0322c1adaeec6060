//! Signup API routes.
//!
//! JSON endpoints for each signup stage. Handlers take the body as
//! `Result<Json<T>, JsonRejection>` so malformed JSON is answered with the
//! same `{"error": ...}` body as every other failure.

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::Serialize;

use crate::error::Result;
use crate::models::payload::{
    EmailRequest, OtpRequest, PasswordRequest, ResendRequest, SignupRequest,
};
use crate::state::AppState;

/// Response from starting a signup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAccepted {
    pub signup_token: String,
    pub message: &'static str,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct Message {
    pub message: &'static str,
}

/// Result of a passcode check.
#[derive(Debug, Serialize)]
pub struct OtpVerification {
    pub verified: bool,
    pub message: &'static str,
}

/// Response from promoting a signup.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupCompleted {
    pub user_id: String,
    pub message: &'static str,
}

/// Start a signup.
///
/// POST /api/v1/signup/email
///
/// # Errors
///
/// 400 for an invalid email, 409 if the email is taken.
pub async fn email(
    State(state): State<AppState>,
    body: std::result::Result<Json<EmailRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EmailAccepted>)> {
    let Json(request) = body?;
    let token = state.signup().begin_signup(&request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(EmailAccepted {
            signup_token: token.to_string(),
            message: "email saved",
        }),
    ))
}

/// Store the password and email a passcode.
///
/// POST /api/v1/signup/password
///
/// # Errors
///
/// 400 for an invalid payload or unknown token, 500 if the passcode cannot
/// be sent.
pub async fn password(
    State(state): State<AppState>,
    body: std::result::Result<Json<PasswordRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>)> {
    let Json(request) = body?;
    state.signup().set_password(&request).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(Message {
            message: "password saved",
        }),
    ))
}

/// Check a passcode.
///
/// POST /api/v1/signup/verify-otp
///
/// A wrong code is not an error: the response is 200 with `verified: false`.
///
/// # Errors
///
/// 400 if the token or passcode is missing or malformed.
pub async fn verify_otp(
    State(state): State<AppState>,
    body: std::result::Result<Json<OtpRequest>, JsonRejection>,
) -> Result<Json<OtpVerification>> {
    let Json(request) = body?;
    let verified = state.signup().verify_otp(&request).await?;

    let message = if verified {
        "otp verified"
    } else {
        "invalid or expired otp"
    };
    Ok(Json(OtpVerification { verified, message }))
}

/// Send a fresh passcode.
///
/// POST /api/v1/signup/resend-otp
///
/// # Errors
///
/// 400 for an unknown token or a signup without a password.
pub async fn resend_otp(
    State(state): State<AppState>,
    body: std::result::Result<Json<ResendRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Message>)> {
    let Json(request) = body?;
    state.signup().resend_otp(&request).await?;

    Ok((StatusCode::ACCEPTED, Json(Message { message: "otp sent" })))
}

/// Promote a verified signup to a user.
///
/// POST /api/v1/signup
///
/// # Errors
///
/// 400 for an invalid payload, unknown token or passcode mismatch, 409 if
/// the email is already registered.
pub async fn complete(
    State(state): State<AppState>,
    body: std::result::Result<Json<SignupRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SignupCompleted>)> {
    let Json(request) = body?;
    let user_id = state.signup().promote(&request).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupCompleted {
            user_id: user_id.to_string(),
            message: "signup complete",
        }),
    ))
}
