use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::*;
use crate::db::{Collection, Document, Filter, MemoryDocumentStore, Patch};
use crate::models::{DeviceInfo, Gender, PersonalInfo, Theme};
use crate::services::email::OutboxMailer;
use crate::services::password::{Argon2Hasher, HashError};

const PASSWORD: &str = "secret123";

/// Memory store whose writes can be made to fail.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryDocumentStore,
    /// Refuse inserts into the user collection only.
    fail_user_inserts: AtomicBool,
    fail_updates: AtomicBool,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn find_one(
        &self,
        collection: Collection,
        filter: &Filter,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.find_one(collection, filter).await
    }

    async fn insert_one(
        &self,
        collection: Collection,
        document: Document,
    ) -> Result<Uuid, StoreError> {
        if collection == Collection::Users && self.fail_user_inserts.load(Ordering::SeqCst) {
            return Err(StoreError::DataCorruption("insert refused".to_owned()));
        }
        self.inner.insert_one(collection, document).await
    }

    async fn update_one(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64, StoreError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(StoreError::DataCorruption("update refused".to_owned()));
        }
        self.inner.update_one(collection, filter, patch).await
    }

    async fn delete_one(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(StoreError::DataCorruption("delete refused".to_owned()));
        }
        self.inner.delete_one(collection, filter).await
    }

    async fn delete_stale(
        &self,
        collection: Collection,
        cutoff: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        self.inner.delete_stale(collection, cutoff).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct FailingHasher;

impl PasswordHashing for FailingHasher {
    fn hash(&self, _plaintext: &str) -> Result<String, HashError> {
        Err(HashError::Hash("out of memory".to_owned()))
    }

    fn verify(&self, _plaintext: &str, _digest: &str) -> Result<bool, HashError> {
        Ok(false)
    }
}

struct Harness {
    store: FlakyStore,
    mailer: OutboxMailer,
    hasher: Argon2Hasher,
    policy: SignupPolicy,
}

impl Harness {
    fn new() -> Self {
        Self::with_policy(SignupPolicy::default())
    }

    fn with_policy(policy: SignupPolicy) -> Self {
        Self {
            store: FlakyStore::default(),
            mailer: OutboxMailer::new(),
            hasher: Argon2Hasher::new(),
            policy,
        }
    }

    fn service(&self) -> SignupService<'_> {
        SignupService::new(&self.store, &self.mailer, &self.hasher, &self.policy)
    }

    async fn pending_count(&self) -> usize {
        self.store.inner.count(Collection::PendingSignups).await
    }

    async fn begin(&self, email: &str) -> SignupToken {
        self.service()
            .begin_signup(&EmailRequest {
                email: email.to_owned(),
            })
            .await
            .unwrap()
    }

    /// Run stages one and two; returns the token and the emailed passcode.
    async fn through_password(&self, email: &str) -> (SignupToken, u32) {
        let token = self.begin(email).await;
        self.service()
            .set_password(&password_request(token, PASSWORD))
            .await
            .unwrap();
        let otp = self
            .mailer
            .last_otp_for(&Email::parse(email).unwrap())
            .await
            .unwrap();
        (token, otp.as_u32())
    }
}

fn password_request(token: SignupToken, password: &str) -> PasswordRequest {
    PasswordRequest {
        signup_token: token.to_string(),
        password: password.to_owned(),
    }
}

fn signup_request(token: SignupToken, otp: u32, email: &str) -> SignupRequest {
    SignupRequest {
        signup_token: token.to_string(),
        otp: Some(otp),
        username: "dishank".to_owned(),
        email: email.to_owned(),
        password: PASSWORD.to_owned(),
        subscribed: true,
        personal: Some(PersonalInfo {
            age: 30,
            gender: Gender::Male,
            height: Some(180.0),
            weight: None,
        }),
        device: Some(DeviceInfo {
            theme: Theme::Dark,
            notification_status: true,
            timezone: "Asia/Kolkata".to_owned(),
        }),
    }
}

// =============================================================================
// Stage 1
// =============================================================================

#[tokio::test]
async fn test_begin_signup_creates_pending_record() {
    let harness = Harness::new();
    let token = harness.begin("A@X.com").await;

    let record = PendingSignupRepository::new(&harness.store)
        .get_by_token(token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.email.as_str(), "a@x.com");
    assert_eq!(record.stage(), SignupStage::EmailCollected);
}

#[tokio::test]
async fn test_begin_signup_rejects_duplicate_email() {
    let harness = Harness::new();
    harness.begin("a@x.com").await;

    let result = harness
        .service()
        .begin_signup(&EmailRequest {
            email: "a@x.com".to_owned(),
        })
        .await;
    assert!(matches!(result, Err(SignupError::EmailTaken)));
    assert_eq!(harness.pending_count().await, 1);
}

#[tokio::test]
async fn test_begin_signup_rejects_registered_email() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await
        .unwrap();

    let result = harness
        .service()
        .begin_signup(&EmailRequest {
            email: "a@x.com".to_owned(),
        })
        .await;
    assert!(matches!(result, Err(SignupError::EmailTaken)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_begin_signup_admits_one() {
    const CALLERS: usize = 16;
    let harness = Arc::new(Harness::new());

    let handles: Vec<_> = (0..CALLERS)
        .map(|_| {
            let harness = Arc::clone(&harness);
            tokio::spawn(async move {
                harness
                    .service()
                    .begin_signup(&EmailRequest {
                        email: "race@x.com".to_owned(),
                    })
                    .await
            })
        })
        .collect();

    let mut admitted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => admitted += 1,
            Err(e) => {
                assert_eq!(e.kind(), ErrorKind::Conflict, "unexpected error: {e}");
                conflicts += 1;
            }
        }
    }

    assert_eq!(admitted, 1);
    assert_eq!(conflicts, CALLERS - 1);
    assert_eq!(harness.pending_count().await, 1);
}

#[tokio::test]
async fn test_begin_signup_rejects_malformed_email() {
    let harness = Harness::new();
    let result = harness
        .service()
        .begin_signup(&EmailRequest {
            email: "not-an-email".to_owned(),
        })
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::BadRequest);
    assert_eq!(harness.pending_count().await, 0);
}

// =============================================================================
// Stage 2
// =============================================================================

#[tokio::test]
async fn test_set_password_hashes_and_sends_otp() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;

    let record = PendingSignupRepository::new(&harness.store)
        .get_by_token(token)
        .await
        .unwrap()
        .unwrap();
    let hash = record.password_hash.unwrap();
    assert_ne!(hash, PASSWORD);
    assert!(harness.hasher.verify(PASSWORD, &hash).unwrap());
    assert_eq!(record.otp.map(|code| code.as_u32()), Some(otp));

    let sent = harness.mailer.sent().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Your OTP Verification Code");
    assert!(sent[0].text.contains("10 minutes"));
}

#[tokio::test]
async fn test_short_password_discards_signup() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;

    let result = harness
        .service()
        .set_password(&password_request(token, "abc"))
        .await;

    let Err(SignupError::InvalidPayload(errors)) = result else {
        panic!("expected a validation error");
    };
    assert!(errors.has_field("password"));
    assert_eq!(harness.pending_count().await, 0);
    assert!(harness.mailer.sent().await.is_empty());
}

#[tokio::test]
async fn test_set_password_unknown_token() {
    let harness = Harness::new();

    let result = harness
        .service()
        .set_password(&password_request(SignupToken::generate(), PASSWORD))
        .await;
    assert!(matches!(result, Err(SignupError::SignupNotFound)));

    let garbage = PasswordRequest {
        signup_token: "not-a-token".to_owned(),
        password: PASSWORD.to_owned(),
    };
    let result = harness.service().set_password(&garbage).await;
    assert!(matches!(result, Err(SignupError::SignupNotFound)));
}

#[tokio::test]
async fn test_hash_failure_discards_signup() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;

    let service = SignupService::new(
        &harness.store,
        &harness.mailer,
        &FailingHasher,
        &harness.policy,
    );
    let result = service.set_password(&password_request(token, PASSWORD)).await;

    assert!(matches!(result, Err(SignupError::PasswordHash(_))));
    assert_eq!(harness.pending_count().await, 0);
}

#[tokio::test]
async fn test_update_failure_discards_signup() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;
    harness.store.fail_updates.store(true, Ordering::SeqCst);

    let result = harness
        .service()
        .set_password(&password_request(token, PASSWORD))
        .await;

    assert_eq!(result.unwrap_err().kind(), ErrorKind::Internal);
    assert_eq!(harness.pending_count().await, 0);
}

#[tokio::test]
async fn test_failed_compensation_keeps_original_error() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;
    harness.store.fail_deletes.store(true, Ordering::SeqCst);

    let result = harness
        .service()
        .set_password(&password_request(token, "abc"))
        .await;

    assert!(matches!(result, Err(SignupError::InvalidPayload(_))));
    assert_eq!(harness.pending_count().await, 1);
}

#[tokio::test]
async fn test_dispatch_failure_keeps_record_by_default() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;
    harness.mailer.set_rejecting(true);

    let result = harness
        .service()
        .set_password(&password_request(token, PASSWORD))
        .await;
    assert!(matches!(result, Err(SignupError::Dispatch(_))));
    assert_eq!(harness.pending_count().await, 1);

    harness.mailer.set_rejecting(false);
    harness
        .service()
        .resend_otp(&ResendRequest {
            signup_token: token.to_string(),
        })
        .await
        .unwrap();
    assert_eq!(harness.mailer.sent().await.len(), 1);
}

#[tokio::test]
async fn test_dispatch_failure_deletes_record_when_configured() {
    let harness = Harness::with_policy(SignupPolicy {
        dispatch_failure: DispatchFailurePolicy::Delete,
        ..SignupPolicy::default()
    });
    let token = harness.begin("a@x.com").await;
    harness.mailer.set_rejecting(true);

    let result = harness
        .service()
        .set_password(&password_request(token, PASSWORD))
        .await;
    assert!(matches!(result, Err(SignupError::Dispatch(_))));
    assert_eq!(harness.pending_count().await, 0);
}

#[tokio::test]
async fn test_dev_override_redirects_mail() {
    let override_to = Email::parse("dev@example.com").unwrap();
    let harness = Harness::with_policy(SignupPolicy {
        dev_mail_override: Some(override_to.clone()),
        ..SignupPolicy::default()
    });
    let token = harness.begin("a@x.com").await;
    harness
        .service()
        .set_password(&password_request(token, PASSWORD))
        .await
        .unwrap();

    assert!(harness.mailer.last_otp_for(&override_to).await.is_some());
    assert!(
        harness
            .mailer
            .last_otp_for(&Email::parse("a@x.com").unwrap())
            .await
            .is_none()
    );
}

// =============================================================================
// Resend
// =============================================================================

#[tokio::test]
async fn test_resend_requires_password() {
    let harness = Harness::new();
    let token = harness.begin("a@x.com").await;

    let result = harness
        .service()
        .resend_otp(&ResendRequest {
            signup_token: token.to_string(),
        })
        .await;
    assert!(matches!(result, Err(SignupError::PasswordNotSet)));
}

#[tokio::test]
async fn test_resend_replaces_otp() {
    let harness = Harness::new();
    let (token, first) = harness.through_password("a@x.com").await;

    harness
        .service()
        .resend_otp(&ResendRequest {
            signup_token: token.to_string(),
        })
        .await
        .unwrap();

    let second = harness
        .mailer
        .last_otp_for(&Email::parse("a@x.com").unwrap())
        .await
        .unwrap()
        .as_u32();
    let record = PendingSignupRepository::new(&harness.store)
        .get_by_token(token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.otp.map(|code| code.as_u32()), Some(second));
    assert_eq!(harness.mailer.sent().await.len(), 2);

    // The stored code is the only one that verifies.
    if first != second {
        let stale = OtpRequest {
            signup_token: token.to_string(),
            otp: Some(first),
        };
        assert!(!harness.service().verify_otp(&stale).await.unwrap());
    }
}

// =============================================================================
// Stage 3
// =============================================================================

#[tokio::test]
async fn test_verify_otp() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    let wrong = if otp == 999_999 { 100_000 } else { otp + 1 };

    let request = |code: u32| OtpRequest {
        signup_token: token.to_string(),
        otp: Some(code),
    };
    assert!(harness.service().verify_otp(&request(otp)).await.unwrap());
    assert!(!harness.service().verify_otp(&request(wrong)).await.unwrap());

    let unknown = OtpRequest {
        signup_token: SignupToken::generate().to_string(),
        otp: Some(otp),
    };
    assert!(!harness.service().verify_otp(&unknown).await.unwrap());
}

#[tokio::test]
async fn test_verify_otp_rejects_bad_shape() {
    let harness = Harness::new();
    let request = OtpRequest {
        signup_token: SignupToken::generate().to_string(),
        otp: Some(12_345),
    };

    let result = harness.service().verify_otp(&request).await;
    assert!(matches!(result, Err(SignupError::InvalidPayload(_))));
}

// =============================================================================
// Promotion
// =============================================================================

#[tokio::test]
async fn test_promote_creates_user_and_removes_pending() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;

    let user_id = harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await
        .unwrap();

    let user = UserRepository::new(&harness.store)
        .get_by_email(&Email::parse("a@x.com").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.username, "dishank");
    assert!(harness.hasher.verify(PASSWORD, &user.password_hash).unwrap());
    assert_eq!(harness.pending_count().await, 0);

    let last = harness.mailer.sent().await.pop().unwrap();
    assert_eq!(last.subject, "Welcome, dishank!");
}

#[tokio::test]
async fn test_promote_rejects_wrong_otp() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    let wrong = if otp == 999_999 { 100_000 } else { otp + 1 };

    let result = harness
        .service()
        .promote(&signup_request(token, wrong, "a@x.com"))
        .await;
    assert!(matches!(result, Err(SignupError::InvalidOtp)));
    assert_eq!(harness.pending_count().await, 1);
}

#[tokio::test]
async fn test_promote_rejects_mismatched_credentials() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;

    let result = harness
        .service()
        .promote(&signup_request(token, otp, "b@x.com"))
        .await;
    assert!(matches!(result, Err(SignupError::CredentialsMismatch)));

    let mut request = signup_request(token, otp, "a@x.com");
    request.password = "other-password".to_owned();
    let result = harness.service().promote(&request).await;
    assert!(matches!(result, Err(SignupError::CredentialsMismatch)));
}

#[tokio::test]
async fn test_promote_survives_cleanup_failure() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    harness.store.fail_deletes.store(true, Ordering::SeqCst);

    harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await
        .unwrap();

    assert_eq!(harness.store.inner.count(Collection::Users).await, 1);
    assert_eq!(harness.pending_count().await, 1);
}

#[tokio::test]
async fn test_promote_insert_failure_keeps_pending() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    harness.store.fail_user_inserts.store(true, Ordering::SeqCst);

    let result = harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await;
    assert!(matches!(result, Err(SignupError::Store(_))));
    assert_eq!(harness.pending_count().await, 1);
    assert_eq!(harness.store.inner.count(Collection::Users).await, 0);

    harness.store.fail_user_inserts.store(false, Ordering::SeqCst);
    harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await
        .unwrap();
    assert_eq!(harness.pending_count().await, 0);
    assert_eq!(harness.store.inner.count(Collection::Users).await, 1);
}

#[tokio::test]
async fn test_promote_ignores_welcome_failure() {
    let harness = Harness::new();
    let (token, otp) = harness.through_password("a@x.com").await;
    harness.mailer.set_rejecting(true);

    let result = harness
        .service()
        .promote(&signup_request(token, otp, "a@x.com"))
        .await;
    assert!(result.is_ok());
}

#[test]
fn test_dispatch_policy_parses() {
    assert_eq!(
        "keep".parse::<DispatchFailurePolicy>().unwrap(),
        DispatchFailurePolicy::Keep
    );
    assert_eq!(
        " DELETE ".parse::<DispatchFailurePolicy>().unwrap(),
        DispatchFailurePolicy::Delete
    );
    assert!("drop".parse::<DispatchFailurePolicy>().is_err());
}
