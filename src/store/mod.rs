// 🗄️ Document Store - the only authoritative state
// Collections of JSON documents with create/get/query primitives and change
// notifications. Components receive a store value explicitly; there is no
// shared global connection.

pub mod memory;
pub mod sqlite;
pub mod subscription;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use subscription::{subscribe, Snapshot, Subscription};

use crate::error::StoreError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::cmp::Ordering;
use tokio::sync::broadcast;

// ============================================================================
// STORED DOCUMENT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    /// Store-assigned id (UUID v4)
    pub id: String,

    /// Insertion sequence, strictly increasing across the whole store
    pub seq: i64,

    pub data: Value,
}

impl StoredDocument {
    /// Validate the raw JSON against a record type.
    pub fn decode<T: DeserializeOwned>(&self, collection: &str) -> Result<T, StoreError> {
        serde_json::from_value(self.data.clone()).map_err(|e| StoreError::MalformedDocument {
            collection: collection.to_string(),
            id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

// ============================================================================
// QUERY MODEL
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Field at dotted `path` equals `value`
    Equals { path: String, value: Value },

    /// Array at `path` holds an object carrying every key/value of `value`
    ArrayContains { path: String, value: Value },
}

impl Filter {
    pub fn equals(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Equals {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn array_contains(path: impl Into<String>, value: Value) -> Self {
        Filter::ArrayContains {
            path: path.into(),
            value,
        }
    }

    pub fn matches(&self, doc: &Value) -> bool {
        match self {
            Filter::Equals { path, value } => lookup(doc, path) == Some(value),
            Filter::ArrayContains { path, value } => match lookup(doc, path) {
                Some(Value::Array(items)) => items.iter().any(|item| contains_all(item, value)),
                _ => false,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub path: String,
    pub direction: Direction,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, path: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            path: path.into(),
            direction,
        });
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(doc))
    }

    /// Sort by the requested field, falling back to insertion order.
    pub fn sort(&self, docs: &mut [StoredDocument]) {
        docs.sort_by(|a, b| {
            let primary = match &self.order_by {
                Some(order) => {
                    let cmp = compare_json(lookup(&a.data, &order.path), lookup(&b.data, &order.path));
                    match order.direction {
                        Direction::Ascending => cmp,
                        Direction::Descending => cmp.reverse(),
                    }
                }
                None => Ordering::Equal,
            };
            primary.then(a.seq.cmp(&b.seq))
        });
    }
}

// ============================================================================
// STORE COLLABORATOR
// ============================================================================

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Append a document; returns the generated id.
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError>;

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError>;

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>, StoreError>;

    /// Names of collections that received a document, published after each create.
    fn changes(&self) -> broadcast::Receiver<String>;
}

// ============================================================================
// JSON HELPERS
// ============================================================================

/// Resolve a dotted path (`signer.value`) inside a JSON document.
pub fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.').try_fold(doc, |current, key| current.get(key))
}

fn contains_all(item: &Value, pattern: &Value) -> bool {
    match (item, pattern) {
        (Value::Object(item), Value::Object(pattern)) => pattern
            .iter()
            .all(|(key, expected)| item.get(key) == Some(expected)),
        (item, pattern) => item == pattern,
    }
}

/// Missing values sort first, then numbers, then strings (SQLite-like).
fn compare_json(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(v: Option<&Value>) -> u8 {
        match v {
            None | Some(Value::Null) => 0,
            Some(Value::Bool(_)) | Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(_) => 3,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => x
                    .as_f64()
                    .unwrap_or_default()
                    .partial_cmp(&y.as_f64().unwrap_or_default())
                    .unwrap_or(Ordering::Equal),
            }
        }
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}
