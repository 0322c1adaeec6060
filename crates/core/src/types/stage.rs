//! Signup lifecycle stages.

use serde::{Deserialize, Serialize};

/// Where a signup currently sits in the staged pipeline.
///
/// ```text
/// NoRecord -> EmailCollected -> PasswordSet -> OtpIssued -> Verified -> Promoted
///                                                  ^   |
///                                                  +---+  (resend)
/// ```
///
/// `Verified` and `Promoted` are terminal: a verified record is consumed by
/// promotion, after which only the user account remains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignupStage {
    NoRecord,
    EmailCollected,
    PasswordSet,
    OtpIssued,
    Verified,
    Promoted,
}

impl SignupStage {
    /// Derive the stage of a stored pending record from the fields it holds.
    ///
    /// A record never carries a passcode without a password hash, so an
    /// `otp` without a hash is reported as `EmailCollected`.
    #[must_use]
    pub const fn of_record(has_password_hash: bool, has_otp: bool) -> Self {
        match (has_password_hash, has_otp) {
            (false, _) => Self::EmailCollected,
            (true, false) => Self::PasswordSet,
            (true, true) => Self::OtpIssued,
        }
    }

    /// Returns true if the pipeline allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_advance_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NoRecord, Self::EmailCollected)
                | (Self::EmailCollected, Self::PasswordSet)
                | (Self::PasswordSet | Self::OtpIssued, Self::OtpIssued)
                | (Self::OtpIssued, Self::Verified)
                | (Self::Verified, Self::Promoted)
        )
    }

    /// Returns true once no further stage request applies.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Verified | Self::Promoted)
    }
}
