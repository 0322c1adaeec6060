//! Pending signup repository.
//!
//! Every lookup after the first stage goes through the signup token.

use chrono::{DateTime, Utc};

use signup_core::{Email, Otp, SignupToken};

use super::{Collection, DocumentStore, Filter, Patch, StoreError, fields, from_document, to_document};
use crate::models::PendingSignup;

/// Repository for pending signup records.
pub struct PendingSignupRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> PendingSignupRepository<'a> {
    /// Create a new pending signup repository.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    fn by_token(token: SignupToken) -> Filter {
        Filter::new().eq(fields::SIGNUP_TOKEN, token.to_string())
    }

    async fn find(&self, filter: &Filter) -> Result<Option<PendingSignup>, StoreError> {
        self.store
            .find_one(Collection::PendingSignups, filter)
            .await?
            .map(|document| from_document(document, "pending signup"))
            .transpose()
    }

    /// Get the pending signup for an email address.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails or the record is malformed.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<PendingSignup>, StoreError> {
        self.find(&Filter::new().eq(fields::EMAIL, email.as_str()))
            .await
    }

    /// Get the pending signup for a signup token.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails or the record is malformed.
    pub async fn get_by_token(
        &self,
        token: SignupToken,
    ) -> Result<Option<PendingSignup>, StoreError> {
        self.find(&Self::by_token(token)).await
    }

    /// Get the pending signup holding exactly this token and passcode.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails or the record is malformed.
    pub async fn get_by_token_and_otp(
        &self,
        token: SignupToken,
        otp: u32,
    ) -> Result<Option<PendingSignup>, StoreError> {
        self.find(&Self::by_token(token).eq(fields::OTP, otp)).await
    }

    /// Insert a fresh record for `email` and return it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if a pending signup already holds the email.
    pub async fn create(&self, email: &Email) -> Result<PendingSignup, StoreError> {
        let record = PendingSignup::new(email.clone());
        self.store
            .insert_one(Collection::PendingSignups, to_document(&record)?)
            .await?;
        Ok(record)
    }

    /// Store the password hash and refresh `updatedAt`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record holds the token.
    pub async fn set_password_hash(
        &self,
        token: SignupToken,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let patch = Patch::new()
            .set(fields::PASSWORD_HASH, password_hash)
            .set(fields::UPDATED_AT, Utc::now().to_rfc3339());
        self.patch(token, &patch).await
    }

    /// Attach a passcode and refresh `updatedAt`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if no record holds the token.
    pub async fn attach_otp(&self, token: SignupToken, otp: Otp) -> Result<(), StoreError> {
        let patch = Patch::new()
            .set(fields::OTP, otp.as_u32())
            .set(fields::UPDATED_AT, Utc::now().to_rfc3339());
        self.patch(token, &patch).await
    }

    async fn patch(&self, token: SignupToken, patch: &Patch) -> Result<(), StoreError> {
        let matched = self
            .store
            .update_one(Collection::PendingSignups, &Self::by_token(token), patch)
            .await?;
        if matched == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    /// Delete the record for a token.
    ///
    /// Returns true if a record was deleted.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the delete fails.
    pub async fn delete(&self, token: SignupToken) -> Result<bool, StoreError> {
        let deleted = self
            .store
            .delete_one(Collection::PendingSignups, &Self::by_token(token))
            .await?;
        Ok(deleted > 0)
    }

    /// Delete every record not updated since `cutoff`.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the delete fails.
    pub async fn delete_stale(&self, cutoff: DateTime<Utc>) -> Result<u64, StoreError> {
        self.store
            .delete_stale(Collection::PendingSignups, cutoff)
            .await
    }
}
