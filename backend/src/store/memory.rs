use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::{value_text, Filter, RecordStore, Row, StoreError, StoreProvider, StoreResult};
use crate::db::Table;

/// Process-local store used for development runs and tests.
///
/// Mirrors the unique constraints declared on the hosted tables so conflict
/// handling can be exercised without a network.
#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<HashMap<Table, Vec<Row>>>>,
}

fn unique_keys(table: Table) -> &'static [&'static [&'static str]] {
    match table {
        Table::OrigenesBotanicos => &[&["usuario_id", "orden_miel"]],
        Table::Usuarios => &[&["auth_user_id"], &["username"]],
        Table::InfoContacto => &[&["auth_user_id"]],
        _ => &[],
    }
}

fn collides(table: Table, candidate: &Row, other: &Row) -> Option<String> {
    for key in unique_keys(table) {
        let same = key.iter().all(|column| {
            match (candidate.get(*column), other.get(*column)) {
                (Some(a), Some(b)) if !a.is_null() && !b.is_null() => {
                    value_text(a) == value_text(b)
                }
                _ => false,
            }
        });
        if same {
            return Some(format!(
                "duplicate key value violates unique constraint on {} ({})",
                table.as_str(),
                key.join(", ")
            ));
        }
    }
    None
}

impl MemoryStore {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_err<T>(_: T) -> StoreError {
        StoreError::Request("memory store lock poisoned".to_string())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        let tables = self.tables.read().map_err(Self::lock_err)?;
        let rows = tables
            .get(&table)
            .map(|rows| rows.iter().filter(|r| filter.matches(r)).cloned().collect())
            .unwrap_or_default();
        Ok(filter.arrange(rows))
    }

    async fn insert(&self, table: Table, mut payload: Row) -> StoreResult<Row> {
        let mut tables = self.tables.write().map_err(Self::lock_err)?;
        let rows = tables.entry(table).or_default();

        if let Some(msg) = rows.iter().find_map(|existing| collides(table, &payload, existing)) {
            return Err(StoreError::UniqueViolation(msg));
        }

        payload
            .entry("id")
            .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
        payload
            .entry("created_at")
            .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));

        rows.push(payload.clone());
        Ok(payload)
    }

    async fn update(&self, table: Table, filter: &Filter, payload: Row) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write().map_err(Self::lock_err)?;
        let rows = tables.entry(table).or_default();

        let targets: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| filter.matches(r))
            .map(|(i, _)| i)
            .collect();

        // Check every resulting row first so a failed update changes nothing.
        let mut staged = Vec::with_capacity(targets.len());
        for &i in &targets {
            let mut next = rows[i].clone();
            for (k, v) in &payload {
                next.insert(k.clone(), v.clone());
            }
            for (j, other) in rows.iter().enumerate() {
                if targets.contains(&j) {
                    continue;
                }
                if let Some(msg) = collides(table, &next, other) {
                    return Err(StoreError::UniqueViolation(msg));
                }
            }
            for other in &staged {
                if let Some(msg) = collides(table, &next, other) {
                    return Err(StoreError::UniqueViolation(msg));
                }
            }
            staged.push(next);
        }

        for (&i, next) in targets.iter().zip(staged.iter()) {
            rows[i] = next.clone();
        }
        Ok(staged)
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        let mut tables = self.tables.write().map_err(Self::lock_err)?;
        let rows = tables.entry(table).or_default();
        let (removed, kept): (Vec<Row>, Vec<Row>) =
            rows.drain(..).partition(|r| filter.matches(r));
        *rows = kept;
        Ok(removed)
    }
}

/// Every scope shares the same tables; row-level policies are not emulated.
#[derive(Clone, Default)]
pub struct MemoryStoreProvider {
    store: MemoryStore,
}

impl MemoryStoreProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct handle on the shared tables, for seeding fixtures.
    #[cfg(test)]
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }
}

impl StoreProvider for MemoryStoreProvider {
    fn scoped(&self, _access_token: Option<&str>) -> Arc<dyn RecordStore> {
        Arc::new(self.store.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_insert_assigns_id_and_enforces_order_uniqueness() {
        let store = MemoryStore::new();
        let first = store
            .insert(
                Table::OrigenesBotanicos,
                row(json!({ "usuario_id": "a", "orden_miel": 1 })),
            )
            .await
            .unwrap();
        assert!(first.get("id").and_then(|v| v.as_str()).is_some());

        let dup = store
            .insert(
                Table::OrigenesBotanicos,
                row(json!({ "usuario_id": "a", "orden_miel": 1 })),
            )
            .await;
        assert!(matches!(dup, Err(StoreError::UniqueViolation(_))));

        store
            .insert(
                Table::OrigenesBotanicos,
                row(json!({ "usuario_id": "b", "orden_miel": 1 })),
            )
            .await
            .unwrap();

        let all = store
            .select(Table::OrigenesBotanicos, &Filter::new())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_is_all_or_nothing_on_collision() {
        let store = MemoryStore::new();
        for n in 1..=2 {
            store
                .insert(
                    Table::OrigenesBotanicos,
                    row(json!({ "id": format!("l{}", n), "usuario_id": "a", "orden_miel": n })),
                )
                .await
                .unwrap();
        }

        let res = store
            .update(
                Table::OrigenesBotanicos,
                &Filter::new().eq("id", "l2"),
                row(json!({ "orden_miel": 1 })),
            )
            .await;
        assert!(matches!(res, Err(StoreError::UniqueViolation(_))));

        let l2 = store
            .select(Table::OrigenesBotanicos, &Filter::new().eq("id", "l2"))
            .await
            .unwrap();
        assert_eq!(l2[0]["orden_miel"], json!(2));
    }

    #[tokio::test]
    async fn test_delete_returns_removed_rows() {
        let store = MemoryStore::new();
        store
            .insert(Table::Ubicaciones, row(json!({ "auth_user_id": "a" })))
            .await
            .unwrap();
        store
            .insert(Table::Ubicaciones, row(json!({ "auth_user_id": "b" })))
            .await
            .unwrap();

        let removed = store
            .delete(Table::Ubicaciones, &Filter::owned_by(Table::Ubicaciones, "a"))
            .await
            .unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(store.get_all(Table::Ubicaciones, "b").await.unwrap().len(), 1);
        assert!(store.get(Table::Ubicaciones, "a").await.unwrap().is_none());
    }
}
