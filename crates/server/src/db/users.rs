//! User repository.

use signup_core::{Email, UserId};

use super::{Collection, DocumentStore, Filter, StoreError, fields, from_document, to_document};
use crate::models::{NewUser, User};

/// Repository for promoted users.
pub struct UserRepository<'a> {
    store: &'a dyn DocumentStore,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(store: &'a dyn DocumentStore) -> Self {
        Self { store }
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails or the stored user is malformed.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, StoreError> {
        self.store
            .find_one(
                Collection::Users,
                &Filter::new().eq(fields::EMAIL, email.as_str()),
            )
            .await?
            .map(|document| from_document(document, "user"))
            .transpose()
    }

    /// Returns true if a user already holds this email.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the lookup fails.
    pub async fn exists(&self, email: &Email) -> Result<bool, StoreError> {
        let found = self
            .store
            .find_one(
                Collection::Users,
                &Filter::new().eq(fields::EMAIL, email.as_str()),
            )
            .await?;
        Ok(found.is_some())
    }

    /// Insert a new user.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the email already exists.
    pub async fn create(&self, user: &NewUser) -> Result<UserId, StoreError> {
        let id = self
            .store
            .insert_one(Collection::Users, to_document(user)?)
            .await?;
        Ok(UserId::new(id))
    }
}
