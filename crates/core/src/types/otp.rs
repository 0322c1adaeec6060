//! One-time passcode type.

use core::fmt;
use core::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing an [`Otp`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum OtpError {
    /// The value is not a six-digit number.
    #[error("passcode must be a 6-digit number between {min} and {max} (got {value})")]
    OutOfRange {
        /// The rejected value.
        value: u32,
        /// Smallest valid passcode.
        min: u32,
        /// Largest valid passcode.
        max: u32,
    },
}

/// A six-digit one-time passcode in `[100000, 999999]`.
///
/// Stored as a JSON number on the pending signup record and compared by
/// exact value during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Otp(u32);

impl Otp {
    /// Smallest valid passcode.
    pub const MIN: u32 = 100_000;
    /// Largest valid passcode.
    pub const MAX: u32 = 999_999;
    /// Number of distinct passcodes.
    pub const SPAN: u32 = Self::MAX - Self::MIN + 1;

    /// The full range of valid passcodes.
    #[must_use]
    pub const fn range() -> RangeInclusive<u32> {
        Self::MIN..=Self::MAX
    }

    /// Create a passcode from a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`OtpError::OutOfRange`] unless `value` has exactly six digits.
    pub const fn new(value: u32) -> Result<Self, OtpError> {
        if value < Self::MIN || value > Self::MAX {
            return Err(OtpError::OutOfRange {
                value,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(value))
    }

    /// Passcode at `offset` past [`Otp::MIN`], wrapping at [`Otp::SPAN`].
    ///
    /// Total over `u32`; an offset drawn uniformly from `0..SPAN` yields a
    /// uniform passcode.
    #[must_use]
    pub const fn from_offset(offset: u32) -> Self {
        Self(Self::MIN + offset % Self::SPAN)
    }

    /// Get the numeric value.
    #[must_use]
    pub const fn as_u32(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:06}", self.0)
    }
}

impl TryFrom<u32> for Otp {
    type Error = OtpError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Otp> for u32 {
    fn from(otp: Otp) -> Self {
        otp.0
    }
}
