//! Application state shared across handlers.

use std::sync::Arc;

use crate::db::DocumentStore;
use crate::services::{MailDispatcher, PasswordHashing, SignupPolicy, SignupService};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the store, mail dispatcher, password hasher and signup policy.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    store: Arc<dyn DocumentStore>,
    mailer: Arc<dyn MailDispatcher>,
    hasher: Arc<dyn PasswordHashing>,
    policy: SignupPolicy,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `store` - Document store, usually wrapped in a `TimeoutStore`
    /// * `mailer` - Dispatcher for passcode and welcome email
    /// * `hasher` - Password hasher
    /// * `policy` - Signup tunables
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        mailer: Arc<dyn MailDispatcher>,
        hasher: Arc<dyn PasswordHashing>,
        policy: SignupPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                store,
                mailer,
                hasher,
                policy,
            }),
        }
    }

    /// Get a reference to the document store.
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.inner.store.as_ref()
    }

    #[must_use]
    pub fn mailer(&self) -> &dyn MailDispatcher {
        self.inner.mailer.as_ref()
    }

    #[must_use]
    pub fn hasher(&self) -> &dyn PasswordHashing {
        self.inner.hasher.as_ref()
    }

    #[must_use]
    pub fn policy(&self) -> &SignupPolicy {
        &self.inner.policy
    }

    /// Build a signup service borrowing this state.
    #[must_use]
    pub fn signup(&self) -> SignupService<'_> {
        SignupService::new(self.store(), self.mailer(), self.hasher(), self.policy())
    }
}
