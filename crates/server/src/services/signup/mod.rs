//! Staged signup state machine.
//!
//! A signup moves through one request per stage, correlated by its signup
//! token:
//!
//! 1. [`SignupService::begin_signup`] - email in, pending record and token out
//! 2. [`SignupService::set_password`] - hash stored, then a passcode is issued
//!    and emailed
//! 3. [`SignupService::verify_otp`] - does the token hold this passcode?
//! 4. [`SignupService::promote`] - the pending record becomes a user
//!
//! [`SignupService::resend_otp`] re-issues the passcode for a record that
//! already has a password.
//!
//! Failed stages delete the partial record before the error is returned
//! (compensation). A failed delete is logged and never replaces the error
//! being reported. Whether an undeliverable passcode also discards the record
//! is governed by [`DispatchFailurePolicy`].

mod error;

pub use error::{ErrorKind, SignupError};

use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;

use signup_core::{Email, SignupStage, SignupToken, UserId};

use crate::db::{DocumentStore, PendingSignupRepository, StoreError, UserRepository};
use crate::models::NewUser;
use crate::models::payload::{
    EmailRequest, OtpRequest, PasswordRequest, ResendRequest, SignupRequest,
};
use crate::services::email::{MailDispatcher, MailTemplate};
use crate::services::otp::generate_otp;
use crate::services::password::PasswordHashing;
use crate::validation::{Payload, ValidationErrors};

/// Attempts to delete a pending signup after its user was created.
const PROMOTION_CLEANUP_ATTEMPTS: u32 = 3;
/// Base delay between cleanup attempts (multiplied by the attempt number).
const PROMOTION_CLEANUP_BACKOFF: Duration = Duration::from_millis(50);

/// What to do with a pending signup whose passcode email could not be sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchFailurePolicy {
    /// Keep the record and its passcode so the client can resend.
    #[default]
    Keep,
    /// Delete the record like any other failed stage.
    Delete,
}

impl FromStr for DispatchFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(Self::Keep),
            "delete" => Ok(Self::Delete),
            other => Err(format!("expected 'keep' or 'delete', got '{other}'")),
        }
    }
}

/// Tunables for the signup flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignupPolicy {
    /// Lifetime stated in the passcode email. Advisory only.
    pub otp_expiry_minutes: u32,
    /// Deliver every signup email here instead (development only).
    pub dev_mail_override: Option<Email>,
    pub dispatch_failure: DispatchFailurePolicy,
}

impl Default for SignupPolicy {
    fn default() -> Self {
        Self {
            otp_expiry_minutes: 10,
            dev_mail_override: None,
            dispatch_failure: DispatchFailurePolicy::Keep,
        }
    }
}

/// Signup service.
///
/// Owns every transition of a pending signup. Built per request from the
/// shared application state.
pub struct SignupService<'a> {
    pending: PendingSignupRepository<'a>,
    users: UserRepository<'a>,
    mailer: &'a dyn MailDispatcher,
    hasher: &'a dyn PasswordHashing,
    policy: &'a SignupPolicy,
}

impl<'a> SignupService<'a> {
    /// Create a new signup service.
    #[must_use]
    pub const fn new(
        store: &'a dyn DocumentStore,
        mailer: &'a dyn MailDispatcher,
        hasher: &'a dyn PasswordHashing,
        policy: &'a SignupPolicy,
    ) -> Self {
        Self {
            pending: PendingSignupRepository::new(store),
            users: UserRepository::new(store),
            mailer,
            hasher,
            policy,
        }
    }

    // =========================================================================
    // Stage 1: Email
    // =========================================================================

    /// Start a signup for an email address.
    ///
    /// # Errors
    ///
    /// Returns `SignupError::InvalidPayload` if the email is malformed.
    /// Returns `SignupError::EmailTaken` if a user or pending signup already
    /// holds the email, including when a concurrent insert wins the race.
    #[tracing::instrument(skip_all)]
    pub async fn begin_signup(&self, request: &EmailRequest) -> Result<SignupToken, SignupError> {
        request.validate()?;
        let email = Email::parse(&request.email)?;

        if self.users.exists(&email).await? || self.pending.get_by_email(&email).await?.is_some() {
            return Err(SignupError::EmailTaken);
        }

        let record = self.pending.create(&email).await?;

        tracing::info!(
            email = %email,
            signup_token = %record.signup_token,
            "Signup started"
        );
        Ok(record.signup_token)
    }

    // =========================================================================
    // Stage 2: Password (then passcode)
    // =========================================================================

    /// Hash and store the password, then issue and email a passcode.
    ///
    /// An invalid payload, a hashing failure or a failed store update deletes
    /// the pending signup before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `SignupError::InvalidPayload` for a missing token or a password
    /// outside 6-128 characters.
    /// Returns `SignupError::SignupNotFound` if no pending signup holds the token.
    /// Returns `SignupError::PasswordHash` if hashing fails.
    /// Returns `SignupError::Dispatch` if the passcode email cannot be sent.
    #[tracing::instrument(skip_all, fields(signup_token = %request.signup_token))]
    pub async fn set_password(&self, request: &PasswordRequest) -> Result<(), SignupError> {
        let token = SignupToken::from_str(&request.signup_token).ok();

        if let Err(errors) = request.validate() {
            self.discard(token, "invalid password payload").await;
            return Err(errors.into());
        }

        // A token that is not a UUID cannot match any record.
        let Some(token) = token else {
            return Err(SignupError::SignupNotFound);
        };

        let password_hash = match self.hasher.hash(&request.password) {
            Ok(hash) => hash,
            Err(e) => {
                self.discard(Some(token), "password hashing failed").await;
                return Err(e.into());
            }
        };

        match self.pending.set_password_hash(token, &password_hash).await {
            Ok(()) => {}
            Err(StoreError::NotFound) => return Err(SignupError::SignupNotFound),
            Err(e) => {
                self.discard(Some(token), "password update failed").await;
                return Err(e.into());
            }
        }

        tracing::info!("Password stored");
        self.issue_otp(token).await
    }

    /// Issue a fresh passcode for a signup that already has a password.
    ///
    /// # Errors
    ///
    /// Returns `SignupError::SignupNotFound` if no pending signup holds the token.
    /// Returns `SignupError::PasswordNotSet` if the password stage has not run.
    /// Returns `SignupError::Dispatch` if the passcode email cannot be sent.
    #[tracing::instrument(skip_all, fields(signup_token = %request.signup_token))]
    pub async fn resend_otp(&self, request: &ResendRequest) -> Result<(), SignupError> {
        request.validate()?;
        let token =
            SignupToken::from_str(&request.signup_token).map_err(|_| SignupError::SignupNotFound)?;

        let record = self
            .pending
            .get_by_token(token)
            .await?
            .ok_or(SignupError::SignupNotFound)?;

        if !record.stage().can_advance_to(SignupStage::OtpIssued) {
            return Err(SignupError::PasswordNotSet);
        }

        self.issue_otp(token).await
    }

    /// Attach a new passcode to the record and email it.
    async fn issue_otp(&self, token: SignupToken) -> Result<(), SignupError> {
        let code = generate_otp();
        self.pending.attach_otp(token, code).await?;

        let record = self
            .pending
            .get_by_token(token)
            .await?
            .ok_or(SignupError::SignupNotFound)?;

        let template = MailTemplate::Otp {
            code,
            expiry_minutes: self.policy.otp_expiry_minutes,
        };

        if let Err(e) = self
            .mailer
            .send_templated(self.destination(&record.email), &template)
            .await
        {
            tracing::error!(error = %e, signup_token = %token, "Failed to send passcode email");
            if self.policy.dispatch_failure == DispatchFailurePolicy::Delete {
                self.discard(Some(token), "passcode dispatch failed").await;
            }
            return Err(e.into());
        }

        tracing::info!(email = %record.email, "Passcode issued");
        Ok(())
    }

    // =========================================================================
    // Stage 3: Verification
    // =========================================================================

    /// Returns true only if one pending signup holds both the token and the
    /// passcode.
    ///
    /// Lookup failures (unknown token, store errors, timeouts) are logged and
    /// reported as `false`.
    ///
    /// # Errors
    ///
    /// Returns `SignupError::InvalidPayload` if the token or passcode is missing
    /// or the passcode is not six digits.
    #[tracing::instrument(skip_all, fields(signup_token = %request.signup_token))]
    pub async fn verify_otp(&self, request: &OtpRequest) -> Result<bool, SignupError> {
        request.validate()?;

        let (Ok(token), Some(otp)) = (SignupToken::from_str(&request.signup_token), request.otp)
        else {
            return Ok(false);
        };

        match self.pending.get_by_token_and_otp(token, otp).await {
            Ok(Some(_)) => {
                tracing::info!("Passcode verified");
                Ok(true)
            }
            Ok(None) => {
                tracing::info!("Passcode did not match");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Passcode lookup failed");
                Ok(false)
            }
        }
    }

    // =========================================================================
    // Promotion
    // =========================================================================

    /// Turn a verified pending signup into a user.
    ///
    /// The user is inserted before the pending signup is deleted. If the
    /// insert fails the pending signup is kept so the client can retry; if
    /// the delete fails after a successful insert it is retried and then
    /// logged. The welcome email is best-effort.
    ///
    /// # Errors
    ///
    /// Returns `SignupError::InvalidPayload` if profile fields are missing or
    /// out of range.
    /// Returns `SignupError::SignupNotFound` if no pending signup holds the token.
    /// Returns `SignupError::InvalidOtp` if the passcode does not match.
    /// Returns `SignupError::CredentialsMismatch` if the email or password
    /// differ from the ones collected.
    /// Returns `SignupError::EmailTaken` if a user already holds the email.
    #[tracing::instrument(skip_all, fields(signup_token = %request.signup_token))]
    pub async fn promote(&self, request: &SignupRequest) -> Result<UserId, SignupError> {
        request.validate()?;
        let Some(personal) = request.personal.clone() else {
            return Err(ValidationErrors::single("personal", "is required").into());
        };
        let Some(device) = request.device.clone() else {
            return Err(ValidationErrors::single("device", "is required").into());
        };

        let token =
            SignupToken::from_str(&request.signup_token).map_err(|_| SignupError::SignupNotFound)?;

        let record = self
            .pending
            .get_by_token(token)
            .await?
            .ok_or(SignupError::SignupNotFound)?;

        if request.otp.is_none() || record.otp.map(|otp| otp.as_u32()) != request.otp {
            return Err(SignupError::InvalidOtp);
        }

        let Some(password_hash) = record.password_hash else {
            return Err(SignupError::PasswordNotSet);
        };

        let email = Email::parse(&request.email)?;
        if email != record.email || !self.hasher.verify(&request.password, &password_hash)? {
            return Err(SignupError::CredentialsMismatch);
        }

        if self.users.exists(&email).await? {
            return Err(SignupError::EmailTaken);
        }

        let user = NewUser {
            username: request.username.trim().to_owned(),
            email,
            password_hash,
            subscribed: request.subscribed,
            personal,
            device,
            created_at: Utc::now(),
        };

        let user_id = self.users.create(&user).await?;
        tracing::info!(user_id = %user_id, email = %user.email, "User created");

        self.remove_promoted(token).await;
        self.send_welcome(&user).await;

        Ok(user_id)
    }

    /// Delete the pending signup of a promoted user, retrying on failure.
    async fn remove_promoted(&self, token: SignupToken) {
        for attempt in 1..=PROMOTION_CLEANUP_ATTEMPTS {
            match self.pending.delete(token).await {
                Ok(_) => return,
                Err(e) => {
                    tracing::warn!(
                        error = %e,
                        signup_token = %token,
                        attempt,
                        "Failed to delete promoted signup"
                    );
                }
            }
            if attempt < PROMOTION_CLEANUP_ATTEMPTS {
                tokio::time::sleep(PROMOTION_CLEANUP_BACKOFF * attempt).await;
            }
        }

        tracing::error!(
            signup_token = %token,
            "Promoted signup left behind; prune will remove it"
        );
    }

    async fn send_welcome(&self, user: &NewUser) {
        let template = MailTemplate::Welcome {
            name: user.username.clone(),
        };
        if let Err(e) = self
            .mailer
            .send_templated(self.destination(&user.email), &template)
            .await
        {
            tracing::warn!(error = %e, email = %user.email, "Failed to send welcome email");
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Where signup email for `email` is delivered.
    fn destination<'e>(&'e self, email: &'e Email) -> &'e Email {
        self.policy.dev_mail_override.as_ref().unwrap_or(email)
    }

    /// Compensation: delete the pending signup for `token`, logging failures.
    async fn discard(&self, token: Option<SignupToken>, reason: &'static str) {
        let Some(token) = token else {
            return;
        };

        match self.pending.delete(token).await {
            Ok(true) => tracing::info!(signup_token = %token, reason, "Discarded pending signup"),
            Ok(false) => {
                tracing::debug!(signup_token = %token, reason, "No pending signup to discard");
            }
            Err(e) => tracing::error!(
                error = %e,
                signup_token = %token,
                reason,
                "Failed to discard pending signup"
            ),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests;
