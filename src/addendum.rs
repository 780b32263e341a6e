// 📎 Addendum - append-only roster change for one agreement
// Each addendum adds and/or removes identities. Addenda are written once and
// never updated or deleted; creation time (then store insertion order) defines
// the event sequence.

use crate::error::{StoreError, ValidationError};
use crate::identity::Identity;
use crate::store::{Direction, DocumentStore, Filter, Query, StoredDocument};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const ADDENDUM_COLLECTION: &str = "addenda";

/// Persisted shape: `{agreementId, added, removed, createdAt}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddendumDocument {
    pub agreement_id: String,
    #[serde(default)]
    pub added: Vec<Identity>,
    #[serde(default)]
    pub removed: Vec<Identity>,
    /// Microseconds since the epoch, so ordering is numeric in every backend
    #[serde(with = "chrono::serde::ts_microseconds")]
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Addendum {
    id: Option<String>,
    agreement_id: String,
    added: Vec<Identity>,
    removed: Vec<Identity>,
    created_at: DateTime<Utc>,
}

impl Addendum {
    pub fn create(
        agreement_id: impl Into<String>,
        added: Vec<Identity>,
        removed: Vec<Identity>,
    ) -> Result<Self, ValidationError> {
        let agreement_id = agreement_id.into();
        if agreement_id.is_empty() {
            return Err(ValidationError::new(
                "agreementId",
                "addendum must reference a saved agreement",
            ));
        }

        Ok(Addendum {
            id: None,
            agreement_id,
            added,
            removed,
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn agreement_id(&self) -> &str {
        &self.agreement_id
    }

    pub fn added(&self) -> &[Identity] {
        &self.added
    }

    pub fn removed(&self) -> &[Identity] {
        &self.removed
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn to_document(&self) -> AddendumDocument {
        AddendumDocument {
            agreement_id: self.agreement_id.clone(),
            added: self.added.clone(),
            removed: self.removed.clone(),
            created_at: self.created_at,
        }
    }

    pub fn to_json(&self) -> Result<serde_json::Value, StoreError> {
        Ok(serde_json::to_value(self.to_document())?)
    }

    pub fn from_persisted(doc: &StoredDocument) -> Result<Self, StoreError> {
        let data: AddendumDocument = doc.decode(ADDENDUM_COLLECTION)?;
        Ok(Addendum {
            id: Some(doc.id.clone()),
            agreement_id: data.agreement_id,
            added: data.added,
            removed: data.removed,
            created_at: data.created_at,
        })
    }

    /// Append to the store. An addendum is written at most once.
    pub async fn save(&mut self, store: &dyn DocumentStore) -> Result<String, StoreError> {
        if let Some(id) = &self.id {
            return Ok(id.clone());
        }

        let id = store.create(ADDENDUM_COLLECTION, self.to_json()?).await?;
        info!(
            addendum = %id,
            agreement = %self.agreement_id,
            added = self.added.len(),
            removed = self.removed.len(),
            "addendum saved"
        );
        self.id = Some(id.clone());
        Ok(id)
    }

    /// All addenda of one agreement, oldest first.
    pub async fn list_for(
        store: &dyn DocumentStore,
        agreement_id: &str,
    ) -> Result<Vec<Addendum>, StoreError> {
        let query = Query::new()
            .filter(Filter::equals("agreementId", agreement_id))
            .order_by("createdAt", Direction::Ascending);

        let addenda = store
            .query(ADDENDUM_COLLECTION, &query)
            .await?
            .iter()
            .map(Addendum::from_persisted)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(agreement = agreement_id, count = addenda.len(), "addenda listed");
        Ok(addenda)
    }

    /// Addenda that ever added `identity` (matched on kind + value).
    pub async fn adding(
        store: &dyn DocumentStore,
        identity: &Identity,
    ) -> Result<Vec<Addendum>, StoreError> {
        let pattern = serde_json::json!({
            "kind": identity.kind().as_str(),
            "value": identity.value(),
        });
        let query = Query::new().filter(Filter::array_contains("added", pattern));

        store
            .query(ADDENDUM_COLLECTION, &query)
            .await?
            .iter()
            .map(Addendum::from_persisted)
            .collect()
    }
}
