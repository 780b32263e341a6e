// ✅ Whitelist Verifier - is this identity covered by a CLA right now?
//
// Candidate agreements are the ones the identity signed plus the ones whose
// addenda ever added it. Each candidate's full addendum history is reconciled;
// one active set containing the identity (kind + value) is enough.
// Every request reads the store independently; nothing is cached or shared.

use crate::addendum::Addendum;
use crate::agreement::Agreement;
use crate::error::StoreError;
use crate::identity::Identity;
use crate::store::DocumentStore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

// ============================================================================
// RESPONSE MODEL
// ============================================================================

/// Body returned to Gerrit: `{"status": "success" | "failure" | "error", "message"?}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum VerificationStatus {
    Success,
    Failure { message: String },
    Error { message: String },
}

impl VerificationStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationStatus::Success)
    }
}

/// User-facing text for rejected and failed verifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guidance {
    pub sign_url: String,
    pub help_url: String,
    pub support_email: String,
}

impl Default for Guidance {
    fn default() -> Self {
        Guidance {
            sign_url: "https://cla.opennetworking.org".to_string(),
            help_url: "https://wiki.opennetworking.org/x/BgCUI".to_string(),
            support_email: "support@opennetworking.org".to_string(),
        }
    }
}

impl Guidance {
    pub fn missing_email(&self) -> VerificationStatus {
        VerificationStatus::Error {
            message: "missing email in request".to_string(),
        }
    }

    pub fn not_covered(&self, email: &str) -> VerificationStatus {
        VerificationStatus::Failure {
            message: format!(
                "Hi, this is the CLA bot 🤖 Thanks for wanting to contribute! \
                 Before we can accept your change you need to sign a \
                 Contributor License Agreement (CLA). Signing online takes only \
                 a few minutes:\n\n✒️ 👉 {}\n\n\
                 After signing, make sure {} is added to the agreement.\
                 \n\nFor more information or help:\n{}",
                self.sign_url, email, self.help_url
            ),
        }
    }

    pub fn malformed_request(&self) -> VerificationStatus {
        VerificationStatus::Error {
            message: "malformed request query".to_string(),
        }
    }

    /// Sanitized reply for internal failures; details stay in the server log.
    pub fn internal_error(&self) -> VerificationStatus {
        VerificationStatus::Error {
            message: format!(
                "Internal error, unable to verify CLA. \
                 If the problem persists, please contact {}",
                self.support_email
            ),
        }
    }
}

// ============================================================================
// VERIFIER
// ============================================================================

#[derive(Clone)]
pub struct WhitelistVerifier {
    store: Arc<dyn DocumentStore>,
}

impl WhitelistVerifier {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        WhitelistVerifier { store }
    }

    /// Agreements signed by, or ever extended to, `identity`, keyed by id.
    async fn candidate_agreements(
        &self,
        identity: &Identity,
    ) -> Result<BTreeMap<String, Agreement>, StoreError> {
        let store = self.store.as_ref();
        let mut candidates = BTreeMap::new();

        for agreement in Agreement::signed_by(store, identity).await? {
            if let Some(id) = agreement.id() {
                candidates.insert(id.to_string(), agreement);
            }
        }

        for addendum in Addendum::adding(store, identity).await? {
            let id = addendum.agreement_id();
            if candidates.contains_key(id) {
                continue;
            }
            match Agreement::get(store, id).await? {
                Some(agreement) => {
                    candidates.insert(id.to_string(), agreement);
                }
                None => debug!(agreement = id, "addendum references unknown agreement"),
            }
        }

        Ok(candidates)
    }

    pub async fn is_whitelisted(&self, identity: &Identity) -> Result<bool, StoreError> {
        let candidates = self.candidate_agreements(identity).await?;
        debug!(%identity, candidates = candidates.len(), "verifying identity");

        for (id, agreement) in &candidates {
            if agreement.active_set(self.store.as_ref()).await?.contains_principal(identity) {
                debug!(%identity, agreement = %id, "identity authorized");
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Gerrit check for one e-mail address, taken exactly as sent.
    /// An address that is not a valid identity (e.g. empty) is simply not covered.
    pub async fn verify_email(
        &self,
        email: &str,
        guidance: &Guidance,
    ) -> Result<VerificationStatus, StoreError> {
        let identity = match Identity::parse(&format!("email:{}", email)) {
            Ok(identity) => identity,
            Err(e) => {
                debug!(%email, error = %e, "not a valid identity");
                return Ok(guidance.not_covered(email));
            }
        };
        if self.is_whitelisted(&identity).await? {
            Ok(VerificationStatus::Success)
        } else {
            Ok(guidance.not_covered(email))
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::agreement::AgreementType;
    use crate::store::{MemoryStore, Query, SqliteStore, StoredDocument};
    use async_trait::async_trait;
    use tokio::sync::broadcast;

    /// Store whose every call fails, for error-path tests.
    pub(crate) struct BrokenStore;

    #[async_trait]
    impl DocumentStore for BrokenStore {
        async fn create(&self, _: &str, _: serde_json::Value) -> Result<String, StoreError> {
            Err(StoreError::Unavailable("backend offline".to_string()))
        }

        async fn get(&self, _: &str, _: &str) -> Result<Option<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("backend offline".to_string()))
        }

        async fn query(&self, _: &str, _: &Query) -> Result<Vec<StoredDocument>, StoreError> {
            Err(StoreError::Unavailable("backend offline".to_string()))
        }

        fn changes(&self) -> broadcast::Receiver<String> {
            broadcast::channel(1).1
        }
    }

    async fn corporate(store: &dyn DocumentStore, signer: &str) -> String {
        Agreement::create(
            AgreementType::Corporate,
            "corporate CLA",
            Identity::email(signer),
            Some("Acme".to_string()),
        )
        .unwrap()
        .save(store)
        .await
        .unwrap()
    }

    async fn amend(store: &dyn DocumentStore, agreement: &str, added: &[&str], removed: &[&str]) {
        Addendum::create(
            agreement,
            added.iter().map(|e| Identity::email(*e)).collect(),
            removed.iter().map(|e| Identity::email(*e)).collect(),
        )
        .unwrap()
        .save(store)
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_employee_added_to_corporate_agreement_is_whitelisted() {
        let store = Arc::new(MemoryStore::new());
        let b = corporate(store.as_ref(), "legal@acme.com").await;
        amend(store.as_ref(), &b, &["bob@acme.com"], &[]).await;

        let verifier = WhitelistVerifier::new(store);
        assert!(verifier.is_whitelisted(&Identity::email("bob@acme.com")).await.unwrap());
        assert!(!verifier.is_whitelisted(&Identity::email("carol@acme.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_signer_is_not_auto_enrolled() {
        let store = Arc::new(MemoryStore::new());
        Agreement::create(AgreementType::Individual, "cla", Identity::email("alice@x.com"), None)
            .unwrap()
            .save(store.as_ref())
            .await
            .unwrap();

        let verifier = WhitelistVerifier::new(store);
        assert!(!verifier.is_whitelisted(&Identity::email("alice@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_signer_enrolled_by_addendum_is_whitelisted() {
        let store = Arc::new(MemoryStore::new());
        let a = Agreement::create(AgreementType::Individual, "cla", Identity::email("alice@x.com"), None)
            .unwrap()
            .save(store.as_ref())
            .await
            .unwrap();
        amend(store.as_ref(), &a, &["alice@x.com"], &[]).await;

        let verifier = WhitelistVerifier::new(store);
        assert!(verifier.is_whitelisted(&Identity::email("alice@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_removed_employee_is_no_longer_whitelisted() {
        let store = Arc::new(MemoryStore::new());
        let b = corporate(store.as_ref(), "legal@acme.com").await;
        amend(store.as_ref(), &b, &["bob@acme.com", "dave@acme.com"], &[]).await;
        amend(store.as_ref(), &b, &[], &["bob@acme.com"]).await;

        let verifier = WhitelistVerifier::new(store);
        assert!(!verifier.is_whitelisted(&Identity::email("bob@acme.com")).await.unwrap());
        assert!(verifier.is_whitelisted(&Identity::email("dave@acme.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_any_agreement_is_enough() {
        let store = Arc::new(MemoryStore::new());
        let old = corporate(store.as_ref(), "legal@old.com").await;
        let new = corporate(store.as_ref(), "legal@new.com").await;
        amend(store.as_ref(), &old, &["eve@x.com"], &[]).await;
        amend(store.as_ref(), &old, &[], &["eve@x.com"]).await;
        amend(store.as_ref(), &new, &["eve@x.com"], &[]).await;

        let verifier = WhitelistVerifier::new(store);
        assert!(verifier.is_whitelisted(&Identity::email("eve@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_addendum_for_unknown_agreement_authorizes_nobody() {
        let store = Arc::new(MemoryStore::new());
        amend(store.as_ref(), "no-such-agreement", &["mallory@x.com"], &[]).await;

        let verifier = WhitelistVerifier::new(store);
        assert!(!verifier.is_whitelisted(&Identity::email("mallory@x.com")).await.unwrap());
    }

    #[tokio::test]
    async fn test_verify_email_statuses() {
        let store = Arc::new(MemoryStore::new());
        let b = corporate(store.as_ref(), "legal@acme.com").await;
        amend(store.as_ref(), &b, &["bob@acme.com"], &[]).await;

        let verifier = WhitelistVerifier::new(store);
        let guidance = Guidance::default();

        let ok = verifier.verify_email("bob@acme.com", &guidance).await.unwrap();
        assert_eq!(ok, VerificationStatus::Success);
        assert_eq!(serde_json::to_value(&ok).unwrap(), serde_json::json!({"status": "success"}));

        let rejected = verifier.verify_email("carol@acme.com", &guidance).await.unwrap();
        match &rejected {
            VerificationStatus::Failure { message } => {
                assert!(message.contains("https://cla.opennetworking.org"));
                assert!(message.contains("carol@acme.com"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(serde_json::to_value(&rejected).unwrap()["status"], "failure");
    }

    #[tokio::test]
    async fn test_roster_changes_on_sqlite_backend() {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let b = corporate(store.as_ref(), "legal@acme.com").await;

        amend(store.as_ref(), &b, &["bob@acme.com"], &[]).await;
        amend(store.as_ref(), &b, &[], &["bob@acme.com"]).await;
        amend(store.as_ref(), &b, &["bob@acme.com", "dave@acme.com"], &[]).await;
        amend(store.as_ref(), &b, &[], &["dave@acme.com"]).await;

        let agreement = Agreement::get(store.as_ref(), &b).await.unwrap().unwrap();
        let history = agreement.addendums(store.as_ref()).await.unwrap();
        assert_eq!(history.len(), 4);
        assert!(history.windows(2).all(|w| w[0].created_at() <= w[1].created_at()));
        assert_eq!(
            agreement.active_users(store.as_ref()).await.unwrap(),
            vec![Identity::email("bob@acme.com")]
        );

        let verifier = WhitelistVerifier::new(store);
        assert!(verifier.is_whitelisted(&Identity::email("bob@acme.com")).await.unwrap());
        assert!(!verifier.is_whitelisted(&Identity::email("dave@acme.com")).await.unwrap());
        assert!(!verifier.is_whitelisted(&Identity::email("legal@acme.com")).await.unwrap());

        println!("✅ SQLite roster test passed: bob=true dave=false");
    }

    #[tokio::test]
    async fn test_empty_email_is_not_covered() {
        let verifier = WhitelistVerifier::new(Arc::new(MemoryStore::new()));

        let status = verifier.verify_email("", &Guidance::default()).await.unwrap();
        assert!(matches!(status, VerificationStatus::Failure { .. }));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let verifier = WhitelistVerifier::new(Arc::new(BrokenStore));
        let err = verifier
            .verify_email("bob@acme.com", &Guidance::default())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_internal_error_message_is_sanitized() {
        let guidance = Guidance {
            support_email: "help@example.org".to_string(),
            ..Guidance::default()
        };
        match guidance.internal_error() {
            VerificationStatus::Error { message } => {
                assert!(message.starts_with("Internal error, unable to verify CLA."));
                assert!(message.contains("help@example.org"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }
}
