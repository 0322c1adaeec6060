//! Core types for the signup pipeline.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod email;
pub mod id;
pub mod otp;
pub mod stage;

pub use email::{Email, EmailError};
pub use id::*;
pub use otp::{Otp, OtpError};
pub use stage::SignupStage;
