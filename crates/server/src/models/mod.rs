//! Domain models for the signup pipeline.
//!
//! These are the records the repositories read and write. Request payloads
//! live in [`payload`].

pub mod payload;
pub mod pending_signup;
pub mod user;

pub use pending_signup::PendingSignup;
pub use user::{DeviceInfo, Gender, NewUser, PersonalInfo, Theme, User};
