//! Record store adapter.
//!
//! Every table access goes through [`RecordStore`]. A store handle is built per
//! request from the caller's credential (see [`StoreProvider::scoped`]) so that
//! the hosted store applies its own row-level policies; nothing here caches a
//! signed-in client between requests.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::sync::Arc;
use thiserror::Error;

use crate::db::Table;

pub mod memory;
pub mod supabase;

pub type Row = Map<String, Value>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Request(String),

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),

    #[error("rejected by access policy: {0}")]
    Denied(String),

    #[error("credential rejected: {0}")]
    Unauthorized(String),

    #[error("unexpected store payload: {0}")]
    Decode(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Eq(Value),
    Neq(Value),
    Gte(Value),
    /// Case-insensitive substring match.
    Contains(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
    order: Option<Order>,
    limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `table` belonging to `owner_id`.
    pub fn owned_by(table: Table, owner_id: &str) -> Self {
        Self::new().eq(table.owner_column(), owner_id)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push((column.to_string(), Condition::Eq(value.into())));
        self
    }

    pub fn neq(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push((column.to_string(), Condition::Neq(value.into())));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Into<Value>) -> Self {
        self.conditions
            .push((column.to_string(), Condition::Gte(value.into())));
        self
    }

    pub fn contains(mut self, column: &str, term: &str) -> Self {
        self.conditions
            .push((column.to_string(), Condition::Contains(term.to_string())));
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    pub fn ordering(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    pub fn max_rows(&self) -> Option<usize> {
        self.limit
    }

    pub fn matches(&self, row: &Row) -> bool {
        self.conditions.iter().all(|(column, condition)| {
            let cell = row.get(column).unwrap_or(&Value::Null);
            match condition {
                Condition::Eq(v) => !cell.is_null() && value_text(cell) == value_text(v),
                Condition::Neq(v) => cell.is_null() || value_text(cell) != value_text(v),
                Condition::Gte(v) => {
                    !cell.is_null() && compare_values(cell, v) != Ordering::Less
                }
                Condition::Contains(term) => value_text(cell)
                    .to_lowercase()
                    .contains(&term.to_lowercase()),
            }
        })
    }

    /// Orders and truncates an already-filtered row set.
    pub fn arrange(&self, mut rows: Vec<Row>) -> Vec<Row> {
        if let Some(order) = &self.order {
            rows.sort_by(|a, b| {
                let left = a.get(&order.column).unwrap_or(&Value::Null);
                let right = b.get(&order.column).unwrap_or(&Value::Null);
                let ord = compare_values(left, right);
                if order.ascending {
                    ord
                } else {
                    ord.reverse()
                }
            });
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        rows
    }
}

/// Textual form used for equality: strings unquoted, everything else as JSON.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => value_text(a).cmp(&value_text(b)),
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>>;

    async fn insert(&self, table: Table, payload: Row) -> StoreResult<Row>;

    async fn update(&self, table: Table, filter: &Filter, payload: Row) -> StoreResult<Vec<Row>>;

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>>;

    /// First row owned by `owner_id`, if any.
    async fn get(&self, table: Table, owner_id: &str) -> StoreResult<Option<Row>> {
        let rows = self
            .select(table, &Filter::owned_by(table, owner_id).limit(1))
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn get_all(&self, table: Table, owner_id: &str) -> StoreResult<Vec<Row>> {
        self.select(table, &Filter::owned_by(table, owner_id)).await
    }

    async fn ping(&self) -> StoreResult<()> {
        self.select(Table::Usuarios, &Filter::new().limit(1))
            .await
            .map(|_| ())
    }
}

/// Hands out store handles bound to a request's credential.
pub trait StoreProvider: Send + Sync {
    /// `None` yields a handle that only carries the public API key.
    fn scoped(&self, access_token: Option<&str>) -> Arc<dyn RecordStore>;
}

pub fn decode_rows<T: DeserializeOwned>(rows: Vec<Row>) -> StoreResult<Vec<T>> {
    rows.into_iter().map(decode_row).collect()
}

pub fn decode_row<T: DeserializeOwned>(row: Row) -> StoreResult<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| StoreError::Decode(e.to_string()))
}

pub fn encode_row<T: Serialize>(value: &T) -> StoreResult<Row> {
    match serde_json::to_value(value).map_err(|e| StoreError::Decode(e.to_string()))? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Decode(format!("expected an object, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_filter_matches_loose_equality() {
        let r = row(json!({ "usuario_id": "a", "orden_miel": 3, "nombre_miel": "Ulmo" }));

        assert!(Filter::new().eq("orden_miel", 3).matches(&r));
        assert!(Filter::new().eq("orden_miel", "3").matches(&r));
        assert!(!Filter::new().eq("orden_miel", 4).matches(&r));
        assert!(Filter::new()
            .eq("usuario_id", "a")
            .neq("nombre_miel", "Quillay")
            .matches(&r));
        assert!(!Filter::new().eq("missing", "x").matches(&r));
        assert!(Filter::new().neq("missing", "x").matches(&r));
    }

    #[test]
    fn test_filter_contains_is_case_insensitive() {
        let r = row(json!({ "username": "ApiculturaSur" }));
        assert!(Filter::new().contains("username", "cultura").matches(&r));
        assert!(Filter::new().contains("username", "SUR").matches(&r));
        assert!(!Filter::new().contains("username", "norte").matches(&r));
    }

    #[test]
    fn test_filter_gte_on_timestamps() {
        let r = row(json!({ "created_at": "2024-05-01T10:00:00Z" }));
        assert!(Filter::new()
            .gte("created_at", "2024-05-01T09:00:00Z")
            .matches(&r));
        assert!(!Filter::new()
            .gte("created_at", "2024-05-01T11:00:00Z")
            .matches(&r));
    }

    #[test]
    fn test_arrange_orders_numerically_and_limits() {
        let rows = vec![
            row(json!({ "orden_miel": 10 })),
            row(json!({ "orden_miel": 2 })),
            row(json!({ "orden_miel": 7 })),
        ];
        let arranged = Filter::new().order_by("orden_miel", true).limit(2).arrange(rows);
        let orders: Vec<i64> = arranged
            .iter()
            .map(|r| r["orden_miel"].as_i64().unwrap())
            .collect();
        assert_eq!(orders, vec![2, 7]);
    }
}
