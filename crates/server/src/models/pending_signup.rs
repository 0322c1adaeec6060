//! Pending signup record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signup_core::{Email, Otp, SignupStage, SignupToken};

/// An in-progress signup, addressed by its signup token.
///
/// Created with only `email` and `signupToken`; the password stage adds
/// `passwordHash` and the OTP stage adds `otp`. A record without a password
/// hash never carries an OTP.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingSignup {
    /// Correlation key for every stage after the first.
    pub signup_token: SignupToken,
    /// Normalized email address, unique across pending signups and users.
    pub email: Email,
    /// Argon2 PHC string, set by the password stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    /// Passcode sent by email, set by the OTP stage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otp: Option<Otp>,
    /// Refreshed on every mutation.
    pub updated_at: DateTime<Utc>,
}

impl PendingSignup {
    /// A fresh record at the `EmailCollected` stage.
    #[must_use]
    pub fn new(email: Email) -> Self {
        Self {
            signup_token: SignupToken::generate(),
            email,
            password_hash: None,
            otp: None,
            updated_at: Utc::now(),
        }
    }

    /// Stage implied by the fields this record holds.
    #[must_use]
    pub const fn stage(&self) -> SignupStage {
        SignupStage::of_record(self.password_hash.is_some(), self.otp.is_some())
    }
}
