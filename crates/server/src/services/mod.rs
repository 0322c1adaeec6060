//! Business logic services for the signup pipeline.
//!
//! # Services
//!
//! - `email` - Templated mail delivery (SMTP or in-process outbox)
//! - `otp` - Six-digit passcode generation
//! - `password` - Argon2id password hashing
//! - `signup` - The staged signup state machine and promotion

pub mod email;
pub mod otp;
pub mod password;
pub mod signup;

pub use email::{MailDispatcher, MailError, MailTemplate, OutboxMailer, SentMail, SmtpMailer};
pub use otp::generate_otp;
pub use password::{Argon2Hasher, HashError, PasswordHashing};
pub use signup::{DispatchFailurePolicy, ErrorKind, SignupError, SignupPolicy, SignupService};
