//! Signup error types.

use thiserror::Error;

use crate::db::StoreError;
use crate::services::email::MailError;
use crate::services::password::HashError;
use crate::validation::ValidationErrors;

/// Coarse classification used to pick a response status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The request itself is wrong.
    BadRequest,
    /// The email is already taken.
    Conflict,
    /// No pending signup holds the token.
    NotFound,
    /// The store did not answer in time.
    Timeout,
    /// Hashing, dispatch or an unclassified store failure.
    Internal,
}

/// Errors that can occur during signup operations.
#[derive(Debug, Error)]
pub enum SignupError {
    /// Invalid email format.
    #[error("invalid email: {0}")]
    InvalidEmail(#[from] signup_core::EmailError),

    /// Payload failed schema validation.
    #[error("invalid request: {0}")]
    InvalidPayload(#[from] ValidationErrors),

    /// A user or pending signup already holds the email.
    #[error("email is already registered")]
    EmailTaken,

    /// No pending signup matches the token.
    #[error("signup not found")]
    SignupNotFound,

    /// The passcode does not match the pending signup.
    #[error("invalid verification code")]
    InvalidOtp,

    /// The pending signup has no password yet.
    #[error("password has not been set for this signup")]
    PasswordNotSet,

    /// Email or password differ from what the signup collected.
    #[error("signup details do not match")]
    CredentialsMismatch,

    /// Store operation exceeded its bound.
    #[error("store operation timed out")]
    Timeout,

    /// Store error.
    #[error("store error: {0}")]
    Store(StoreError),

    /// Password hashing error.
    #[error("password hashing error: {0}")]
    PasswordHash(#[from] HashError),

    /// Mail delivery error.
    #[error("email dispatch failed: {0}")]
    Dispatch(#[from] MailError),
}

impl SignupError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidEmail(_)
            | Self::InvalidPayload(_)
            | Self::InvalidOtp
            | Self::PasswordNotSet
            | Self::CredentialsMismatch => ErrorKind::BadRequest,
            Self::EmailTaken => ErrorKind::Conflict,
            Self::SignupNotFound => ErrorKind::NotFound,
            Self::Timeout => ErrorKind::Timeout,
            Self::Store(_) | Self::PasswordHash(_) | Self::Dispatch(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for SignupError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Timeout(_) => Self::Timeout,
            StoreError::Conflict(_) => Self::EmailTaken,
            StoreError::NotFound => Self::SignupNotFound,
            other => Self::Store(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        let timeout = SignupError::from(StoreError::Timeout(Duration::from_secs(30)));
        assert_eq!(timeout.kind(), ErrorKind::Timeout);

        let conflict = SignupError::from(StoreError::Conflict("email".to_owned()));
        assert_eq!(conflict.kind(), ErrorKind::Conflict);

        let missing = SignupError::from(StoreError::NotFound);
        assert_eq!(missing.kind(), ErrorKind::NotFound);

        let corrupt = SignupError::from(StoreError::DataCorruption("bad".to_owned()));
        assert_eq!(corrupt.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_dispatch_is_internal() {
        let error = SignupError::from(MailError::Rejected("down".to_owned()));
        assert_eq!(error.kind(), ErrorKind::Internal);
        assert_eq!(SignupError::InvalidOtp.kind(), ErrorKind::BadRequest);
    }
}
