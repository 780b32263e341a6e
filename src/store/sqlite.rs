// 💾 SQLite Document Store - durable backend
// One `documents` table; the JSON body is queried with SQLite's JSON1
// functions. Every call runs on the blocking pool so async workers never wait
// on disk I/O.

use super::{Direction, DocumentStore, Filter, Query, StoredDocument};
use crate::error::StoreError;
use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use tracing::debug;

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    // ==========================================================================
    // Documents Table (append-only; seq gives the stable creation order)
    // ==========================================================================
    conn.execute(
        "CREATE TABLE IF NOT EXISTS documents (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT UNIQUE NOT NULL,
            collection TEXT NOT NULL,
            data TEXT NOT NULL,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection, seq)",
        [],
    )?;

    Ok(())
}

pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    changes: broadcast::Sender<String>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_database(&conn).context("Failed to initialize document schema")?;
        let (changes, _) = broadcast::channel(64);
        Ok(SqliteStore {
            conn: Arc::new(Mutex::new(conn)),
            changes,
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| StoreError::Unavailable("connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| StoreError::Unavailable(e.to_string()))?
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn create(&self, collection: &str, data: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        let body = serde_json::to_string(&data)?;
        let (row_id, row_collection) = (id.clone(), collection.to_string());

        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO documents (id, collection, data) VALUES (?1, ?2, ?3)",
                params![row_id, row_collection, body],
            )?;
            Ok(())
        })
        .await?;

        debug!(collection, %id, "sqlite store: document created");
        let _ = self.changes.send(collection.to_string());
        Ok(id)
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredDocument>, StoreError> {
        let (collection, id) = (collection.to_string(), id.to_string());

        let row = self
            .with_conn(move |conn| {
                let row = conn
                    .query_row(
                        "SELECT seq, id, data FROM documents WHERE collection = ?1 AND id = ?2",
                        params![collection, id],
                        |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?)),
                    )
                    .optional()?;
                Ok(row)
            })
            .await?;

        row.map(into_document).transpose()
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<StoredDocument>, StoreError> {
        let (sql, bound) = build_select(collection, query)?;

        let rows = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let rows = stmt
                    .query_map(params_from_iter(bound.iter()), |row| {
                        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?, row.get::<_, String>(2)?))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter().map(into_document).collect()
    }

    fn changes(&self) -> broadcast::Receiver<String> {
        self.changes.subscribe()
    }
}

fn into_document((seq, id, data): (i64, String, String)) -> Result<StoredDocument, StoreError> {
    Ok(StoredDocument {
        id,
        seq,
        data: serde_json::from_str(&data)?,
    })
}

// ============================================================================
// QUERY TRANSLATION
// ============================================================================

fn json_path(path: &str) -> String {
    format!("$.{}", path)
}

fn scalar(value: &Value) -> Result<SqlValue, StoreError> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => Ok(SqlValue::Real(n.as_f64().unwrap_or_default())),
        },
        other => Err(StoreError::Backend(format!("unsupported filter value {}", other))),
    }
}

/// `expr` compared against one JSON leaf; bools and null go through `json_type`.
fn leaf_condition(
    expr: &str,
    type_expr: &str,
    value: &Value,
    bound: &mut Vec<SqlValue>,
) -> Result<String, StoreError> {
    match value {
        Value::Null => Ok(format!("{} = 'null'", type_expr)),
        Value::Bool(true) => Ok(format!("{} = 'true'", type_expr)),
        Value::Bool(false) => Ok(format!("{} = 'false'", type_expr)),
        other => {
            bound.push(scalar(other)?);
            Ok(format!("{} = ?", expr))
        }
    }
}

fn build_select(collection: &str, query: &Query) -> Result<(String, Vec<SqlValue>), StoreError> {
    let mut sql = String::from("SELECT seq, id, data FROM documents WHERE collection = ?");
    let mut bound = vec![SqlValue::Text(collection.to_string())];

    for filter in &query.filters {
        match filter {
            Filter::Equals { path, value } => {
                let path = json_path(path);
                let condition = match value {
                    Value::Null | Value::Bool(_) => {
                        bound.push(SqlValue::Text(path));
                        leaf_condition("", "json_type(data, ?)", value, &mut bound)?
                    }
                    _ => {
                        bound.push(SqlValue::Text(path));
                        leaf_condition("json_extract(data, ?)", "", value, &mut bound)?
                    }
                };
                sql.push_str(" AND ");
                sql.push_str(&condition);
            }
            Filter::ArrayContains { path, value } => {
                bound.push(SqlValue::Text(json_path(path)));
                let mut conditions = Vec::new();
                match value {
                    Value::Object(pattern) => {
                        for (key, expected) in pattern {
                            bound.push(SqlValue::Text(json_path(key)));
                            let condition = match expected {
                                Value::Null | Value::Bool(_) => {
                                    leaf_condition("", "json_type(e.value, ?)", expected, &mut bound)?
                                }
                                _ => leaf_condition("json_extract(e.value, ?)", "", expected, &mut bound)?,
                            };
                            conditions.push(condition);
                        }
                    }
                    other => conditions.push(leaf_condition("e.value", "e.type", other, &mut bound)?),
                }
                if conditions.is_empty() {
                    conditions.push("1".to_string());
                }
                sql.push_str(&format!(
                    " AND EXISTS (SELECT 1 FROM json_each(documents.data, ?) AS e WHERE {})",
                    conditions.join(" AND ")
                ));
            }
        }
    }

    match &query.order_by {
        Some(order) => {
            bound.push(SqlValue::Text(json_path(&order.path)));
            let direction = match order.direction {
                Direction::Ascending => "ASC",
                Direction::Descending => "DESC",
            };
            sql.push_str(&format!(" ORDER BY json_extract(data, ?) {}, seq ASC", direction));
        }
        None => sql.push_str(" ORDER BY seq ASC"),
    }

    Ok((sql, bound))
}
