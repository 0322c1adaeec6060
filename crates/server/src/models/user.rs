//! User domain types.
//!
//! A user exists only after a verified pending signup has been promoted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use signup_core::{Email, UserId};

/// Self-reported gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
    Other,
}

/// UI theme preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    Light,
    Dark,
}

/// Personal details collected at signup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonalInfo {
    /// Age in years (0-120).
    pub age: u8,
    pub gender: Gender,
    /// Height in centimetres (0-300).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f64>,
    /// Weight in kilograms (0-500).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

/// Device preferences collected at signup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub theme: Theme,
    pub notification_status: bool,
    /// IANA zone name, e.g. `Asia/Kolkata`.
    pub timezone: String,
}

/// A user about to be inserted (no ID yet).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub subscribed: bool,
    pub personal: PersonalInfo,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
}

/// A promoted user account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Identity assigned by the document store.
    pub id: UserId,
    pub username: String,
    pub email: Email,
    pub password_hash: String,
    pub subscribed: bool,
    pub personal: PersonalInfo,
    pub device: DeviceInfo,
    pub created_at: DateTime<Utc>,
}
