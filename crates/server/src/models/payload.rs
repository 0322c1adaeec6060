//! Request bodies for the signup stages.
//!
//! Every field defaults when absent so that a missing field is reported by
//! [`Payload::validate`] as a 400 with a field message rather than as a body
//! decoding failure.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::user::{DeviceInfo, PersonalInfo};
use crate::validation::{Field, Payload, Rule, Schema};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 6;
/// Maximum password length.
pub const MAX_PASSWORD_LENGTH: usize = 128;

const PASSWORD_RULES: &[Rule] = &[
    Rule::Required,
    Rule::Length {
        min: MIN_PASSWORD_LENGTH,
        max: MAX_PASSWORD_LENGTH,
    },
];
const TOKEN_RULES: &[Rule] = &[Rule::Required];
const OTP_RULES: &[Rule] = &[
    Rule::Required,
    Rule::Integer,
    Rule::Range {
        min: 100_000.0,
        max: 999_999.0,
    },
];

/// Stage 1: `POST /signup/email`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailRequest {
    #[serde(default)]
    pub email: String,
}

impl Payload for EmailRequest {
    const SCHEMA: Schema = Schema {
        fields: &[Field::new("email", &[Rule::Required, Rule::Email])],
    };
}

/// Stage 2: `POST /signup/password`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordRequest {
    #[serde(default)]
    pub signup_token: String,
    #[serde(default)]
    pub password: String,
}

impl Payload for PasswordRequest {
    const SCHEMA: Schema = Schema {
        fields: &[
            Field::new("signupToken", TOKEN_RULES),
            Field::new("password", PASSWORD_RULES),
        ],
    };
}

impl fmt::Debug for PasswordRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PasswordRequest")
            .field("signup_token", &self.signup_token)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Stage 3: `POST /signup/verify-otp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRequest {
    #[serde(default)]
    pub signup_token: String,
    #[serde(default)]
    pub otp: Option<u32>,
}

impl Payload for OtpRequest {
    const SCHEMA: Schema = Schema {
        fields: &[
            Field::new("signupToken", TOKEN_RULES),
            Field::new("otp", OTP_RULES),
        ],
    };
}

/// `POST /signup/resend-otp`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResendRequest {
    #[serde(default)]
    pub signup_token: String,
}

impl Payload for ResendRequest {
    const SCHEMA: Schema = Schema {
        fields: &[Field::new("signupToken", TOKEN_RULES)],
    };
}

/// Promotion: `POST /signup`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignupRequest {
    #[serde(default)]
    pub signup_token: String,
    #[serde(default)]
    pub otp: Option<u32>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub subscribed: bool,
    #[serde(default)]
    pub personal: Option<PersonalInfo>,
    #[serde(default)]
    pub device: Option<DeviceInfo>,
}

impl Payload for SignupRequest {
    const SCHEMA: Schema = Schema {
        fields: &[
            Field::new("signupToken", TOKEN_RULES),
            Field::new("otp", OTP_RULES),
            Field::new(
                "username",
                &[Rule::Required, Rule::Length { min: 3, max: 50 }],
            ),
            Field::new("email", &[Rule::Required, Rule::Email]),
            Field::new("password", PASSWORD_RULES),
            Field::new("personal", &[Rule::Required]),
            Field::new(
                "personal.age",
                &[Rule::Required, Rule::Range { min: 0.0, max: 120.0 }],
            ),
            Field::new("personal.height", &[Rule::Range { min: 0.0, max: 300.0 }]),
            Field::new("personal.weight", &[Rule::Range { min: 0.0, max: 500.0 }]),
            Field::new("device", &[Rule::Required]),
            Field::new("device.timezone", &[Rule::Required]),
        ],
    };
}

impl fmt::Debug for SignupRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignupRequest")
            .field("signup_token", &self.signup_token)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .field("subscribed", &self.subscribed)
            .field("personal", &self.personal)
            .field("device", &self.device)
            .finish_non_exhaustive()
    }
}
