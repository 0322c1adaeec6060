//! Signup Core - Shared types library.
//!
//! This crate provides the types shared by every signup component:
//! - `server` - HTTP API and the signup state machine
//! - `cli` - Collection setup and pending-signup maintenance
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for emails, tokens, IDs, passcodes and signup stages

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
