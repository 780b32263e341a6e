// 📜 Agreement Entity - a signed CLA (individual or corporate)
//
// The agreement itself is immutable once saved. Who it currently authorizes
// lives in its addenda, not on the agreement record.
//
// The signer is NOT implicitly authorized: an agreement with no addenda
// authorizes nobody.

use crate::addendum::Addendum;
use crate::error::{ClaError, StoreError, ValidationError};
use crate::identity::{Identity, IdentityKind};
use crate::membership::{self, ActiveSet};
use crate::store::{self, DocumentStore, Filter, Query, StoredDocument, Subscription};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

pub const AGREEMENT_COLLECTION: &str = "agreements";

// ============================================================================
// AGREEMENT TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgreementType {
    /// Individual CLA
    Individual,

    /// Corporate CLA (covers an organization's employees, requires organization)
    Corporate,
}

impl AgreementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgreementType::Individual => "individual",
            AgreementType::Corporate => "corporate",
        }
    }
}

// ============================================================================
// PERSISTED SHAPE
// ============================================================================

/// `{dateSigned, type, body, signer, organization?}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgreementDocument {
    pub date_signed: DateTime<Utc>,
    #[serde(rename = "type")]
    pub agreement_type: AgreementType,
    pub body: String,
    pub signer: Identity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization: Option<String>,
}

// ============================================================================
// AGREEMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct Agreement {
    /// Assigned by the store on save
    id: Option<String>,
    agreement_type: AgreementType,
    body: String,
    signer: Identity,
    organization: Option<String>,
    date_signed: DateTime<Utc>,
}

impl Agreement {
    /// New, unsaved agreement signed now.
    pub fn create(
        agreement_type: AgreementType,
        body: impl Into<String>,
        signer: Identity,
        organization: Option<String>,
    ) -> Result<Self, ValidationError> {
        Self::build(agreement_type, body.into(), signer, organization, Utc::now())
    }

    fn build(
        agreement_type: AgreementType,
        body: String,
        signer: Identity,
        organization: Option<String>,
        date_signed: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let organization = match agreement_type {
            AgreementType::Corporate => match organization {
                Some(org) => Some(org),
                None => {
                    return Err(ValidationError::new(
                        "organization",
                        "agreement type is corporate and organization is missing",
                    ))
                }
            },
            // Only corporate agreements carry an organization
            AgreementType::Individual => None,
        };

        Ok(Agreement {
            id: None,
            agreement_type,
            body,
            signer,
            organization,
            date_signed,
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn agreement_type(&self) -> AgreementType {
        self.agreement_type
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn signer(&self) -> &Identity {
        &self.signer
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn date_signed(&self) -> DateTime<Utc> {
        self.date_signed
    }

    pub fn to_document(&self) -> AgreementDocument {
        AgreementDocument {
            date_signed: self.date_signed,
            agreement_type: self.agreement_type,
            body: self.body.clone(),
            signer: self.signer.clone(),
            organization: self.organization.clone(),
        }
    }

    /// JSON form; `organization` is present iff the agreement is corporate.
    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(self.to_document())?)
    }

    /// Rebuild from a stored document, re-checking construction invariants.
    pub fn from_persisted(doc: &StoredDocument) -> Result<Self, StoreError> {
        let data: AgreementDocument = doc.decode(AGREEMENT_COLLECTION)?;
        let mut agreement = Self::build(
            data.agreement_type,
            data.body,
            data.signer,
            data.organization,
            data.date_signed,
        )
        .map_err(|e| StoreError::MalformedDocument {
            collection: AGREEMENT_COLLECTION.to_string(),
            id: doc.id.clone(),
            reason: e.to_string(),
        })?;
        agreement.id = Some(doc.id.clone());
        Ok(agreement)
    }

    /// Persist once and remember the generated id.
    pub async fn save(&mut self, store: &dyn DocumentStore) -> Result<String, StoreError> {
        if let Some(id) = &self.id {
            return Ok(id.clone());
        }

        let id = store.create(AGREEMENT_COLLECTION, self.to_json()?).await?;
        info!(
            agreement = %id,
            kind = self.agreement_type.as_str(),
            signer = %self.signer,
            "agreement saved"
        );
        self.id = Some(id.clone());
        Ok(id)
    }

    /// Load by id; `None` when no such agreement exists.
    pub async fn get(store: &dyn DocumentStore, id: &str) -> Result<Option<Agreement>, StoreError> {
        store
            .get(AGREEMENT_COLLECTION, id)
            .await?
            .map(|doc| Agreement::from_persisted(&doc))
            .transpose()
    }

    /// Agreements whose signer is `identity` (kind + value).
    pub async fn signed_by(
        store: &dyn DocumentStore,
        identity: &Identity,
    ) -> Result<Vec<Agreement>, StoreError> {
        store
            .query(AGREEMENT_COLLECTION, &signer_query(identity))
            .await?
            .iter()
            .map(Agreement::from_persisted)
            .collect()
    }

    /// Full addendum history, oldest first. Unsaved agreements have none.
    pub async fn addendums(&self, store: &dyn DocumentStore) -> Result<Vec<Addendum>, StoreError> {
        match &self.id {
            Some(id) => Addendum::list_for(store, id).await,
            None => Ok(Vec::new()),
        }
    }

    pub async fn active_set(&self, store: &dyn DocumentStore) -> Result<ActiveSet, StoreError> {
        let addenda = self.addendums(store).await?;
        let active = membership::reconcile(&addenda);
        debug!(
            agreement = self.id.as_deref().unwrap_or("<unsaved>"),
            addenda = addenda.len(),
            active = active.len(),
            "membership reconciled"
        );
        Ok(active)
    }

    /// Identities currently authorized under this agreement (unordered).
    pub async fn active_users(&self, store: &dyn DocumentStore) -> Result<Vec<Identity>, StoreError> {
        Ok(self.active_set(store).await?.into_vec())
    }

    /// Live view of the agreements signed by `email`.
    pub fn subscribe(store: Arc<dyn DocumentStore>, email: &str) -> AgreementFeed {
        let query = signer_query(&Identity::new(IdentityKind::Email, email, None));
        AgreementFeed {
            inner: store::subscribe(store, AGREEMENT_COLLECTION, query),
        }
    }
}

fn signer_query(identity: &Identity) -> Query {
    Query::new()
        .filter(Filter::equals("signer.kind", identity.kind().as_str()))
        .filter(Filter::equals("signer.value", identity.value()))
}

// ============================================================================
// LIVE FEED
// ============================================================================

/// Snapshots of a signer's agreements. Drop (or `cancel`) to stop.
pub struct AgreementFeed {
    inner: Subscription,
}

impl AgreementFeed {
    pub async fn next(&mut self) -> Option<Result<Vec<Agreement>, ClaError>> {
        let snapshot = self.inner.next().await?;
        let agreements = snapshot
            .and_then(|docs| docs.iter().map(Agreement::from_persisted).collect())
            .map_err(ClaError::from);
        Some(agreements)
    }

    pub fn cancel(self) {
        self.inner.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn alice() -> Identity {
        Identity::email("alice@x.com")
    }

    #[test]
    fn test_corporate_requires_organization() {
        let err = Agreement::create(AgreementType::Corporate, "text", alice(), None).unwrap_err();
        assert_eq!(err.field, "organization");

        let ok = Agreement::create(AgreementType::Corporate, "text", alice(), Some("Acme".to_string()));
        assert!(ok.is_ok());
    }

    #[test]
    fn test_individual_drops_organization() {
        let agreement =
            Agreement::create(AgreementType::Individual, "text", alice(), Some("Ignored".to_string())).unwrap();
        assert_eq!(agreement.organization(), None);
        assert_eq!(agreement.id(), None);

        let json = agreement.to_json().unwrap();
        assert!(json.get("organization").is_none());
        assert_eq!(json["type"], "individual");
        assert_eq!(json["signer"]["value"], "alice@x.com");
        assert!(json.get("dateSigned").is_some());
    }

    #[test]
    fn test_round_trip_through_persisted_form() {
        let original = Agreement::create(
            AgreementType::Corporate,
            "corporate text",
            alice(),
            Some("Acme".to_string()),
        )
        .unwrap();

        let doc = StoredDocument {
            id: "agr-1".to_string(),
            seq: 1,
            data: original.to_json().unwrap(),
        };
        let restored = Agreement::from_persisted(&doc).unwrap();

        assert_eq!(restored.id(), Some("agr-1"));
        assert_eq!(restored.agreement_type(), original.agreement_type());
        assert_eq!(restored.body(), original.body());
        assert_eq!(restored.signer(), original.signer());
        assert_eq!(restored.organization(), Some("Acme"));
        assert_eq!(restored.date_signed(), original.date_signed());
    }

    #[test]
    fn test_persisted_corporate_without_organization_is_malformed() {
        let doc = StoredDocument {
            id: "bad".to_string(),
            seq: 1,
            data: serde_json::json!({
                "dateSigned": "2024-01-01T00:00:00Z",
                "type": "corporate",
                "body": "x",
                "signer": {"kind": "email", "value": "a@b.c"}
            }),
        };
        let err = Agreement::from_persisted(&doc).unwrap_err();
        assert!(matches!(err, StoreError::MalformedDocument { .. }));
    }

    #[tokio::test]
    async fn test_save_assigns_id_and_get_loads_it() {
        let store = MemoryStore::new();
        let mut agreement = Agreement::create(AgreementType::Individual, "text", alice(), None).unwrap();

        let id = agreement.save(&store).await.unwrap();
        assert_eq!(agreement.id(), Some(id.as_str()));

        let loaded = Agreement::get(&store, &id).await.unwrap().unwrap();
        assert_eq!(loaded, agreement);
        assert!(Agreement::get(&store, "nope").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_individual_without_addenda_has_no_active_users() {
        let store = MemoryStore::new();
        let mut agreement = Agreement::create(AgreementType::Individual, "text", alice(), None).unwrap();
        agreement.save(&store).await.unwrap();

        assert!(agreement.addendums(&store).await.unwrap().is_empty());
        assert!(agreement.active_users(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_corporate_addendum_enrolls_employee() {
        let store = MemoryStore::new();
        let mut agreement = Agreement::create(
            AgreementType::Corporate,
            "text",
            Identity::email("legal@acme.com"),
            Some("Acme".to_string()),
        )
        .unwrap();
        let id = agreement.save(&store).await.unwrap();

        let bob = Identity::email("bob@acme.com");
        Addendum::create(id, vec![bob.clone()], vec![])
            .unwrap()
            .save(&store)
            .await
            .unwrap();

        assert_eq!(agreement.active_users(&store).await.unwrap(), vec![bob]);
    }

    #[tokio::test]
    async fn test_signed_by_matches_signer() {
        let store = MemoryStore::new();
        Agreement::create(AgreementType::Individual, "a", alice(), None)
            .unwrap()
            .save(&store)
            .await
            .unwrap();
        Agreement::create(AgreementType::Individual, "b", Identity::email("bob@x.com"), None)
            .unwrap()
            .save(&store)
            .await
            .unwrap();

        let found = Agreement::signed_by(&store, &alice()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].body(), "a");
    }

    #[tokio::test]
    async fn test_subscribe_follows_new_agreements() {
        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::new());
        let mut feed = Agreement::subscribe(Arc::clone(&store), "alice@x.com");

        assert!(feed.next().await.unwrap().unwrap().is_empty());

        Agreement::create(AgreementType::Individual, "text", alice(), None)
            .unwrap()
            .save(store.as_ref())
            .await
            .unwrap();

        let agreements = feed.next().await.unwrap().unwrap();
        assert_eq!(agreements.len(), 1);
        assert_eq!(agreements[0].signer(), &alice());

        feed.cancel();
    }
}
