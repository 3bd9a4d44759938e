use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::sync::Arc;

use super::{
    value_text, Condition, Filter, RecordStore, Row, StoreError, StoreProvider, StoreResult,
};
use crate::db::Table;

/// Builds PostgREST handles that act with the caller's credential.
#[derive(Clone)]
pub struct SupabaseStoreProvider {
    http: Client,
    base_url: String,
    api_key: String,
}

impl SupabaseStoreProvider {
    pub fn new(http: Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

impl StoreProvider for SupabaseStoreProvider {
    fn scoped(&self, access_token: Option<&str>) -> Arc<dyn RecordStore> {
        Arc::new(SupabaseStore {
            http: self.http.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            bearer: access_token.unwrap_or(&self.api_key).to_string(),
        })
    }
}

pub struct SupabaseStore {
    http: Client,
    base_url: String,
    api_key: String,
    bearer: String,
}

/// PostgREST query pairs for a filter.
pub fn query_pairs(filter: &Filter) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = filter
        .conditions()
        .iter()
        .map(|(column, condition)| {
            let expr = match condition {
                Condition::Eq(v) => format!("eq.{}", value_text(v)),
                Condition::Neq(v) => format!("neq.{}", value_text(v)),
                Condition::Gte(v) => format!("gte.{}", value_text(v)),
                Condition::Contains(term) => format!("ilike.*{}*", term),
            };
            (column.clone(), expr)
        })
        .collect();

    if let Some(order) = filter.ordering() {
        let dir = if order.ascending { "asc" } else { "desc" };
        pairs.push(("order".to_string(), format!("{}.{}", order.column, dir)));
    }
    if let Some(limit) = filter.max_rows() {
        pairs.push(("limit".to_string(), limit.to_string()));
    }
    pairs
}

/// Maps a failed PostgREST response onto the store error kinds.
pub fn classify_failure(status: StatusCode, body: &str) -> StoreError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();
    let code = parsed
        .as_ref()
        .and_then(|v| v.get("code"))
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("message"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.to_string());

    if status == StatusCode::CONFLICT || code == "23505" {
        StoreError::UniqueViolation(message)
    } else if status == StatusCode::UNAUTHORIZED || code == "PGRST301" {
        StoreError::Unauthorized(message)
    } else if status == StatusCode::FORBIDDEN || code == "42501" {
        StoreError::Denied(message)
    } else {
        StoreError::Request(format!("{} {}", status.as_u16(), message))
    }
}

impl SupabaseStore {
    fn request(&self, method: reqwest::Method, table: Table) -> RequestBuilder {
        self.http
            .request(method, format!("{}/rest/v1/{}", self.base_url, table.as_str()))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.bearer)
    }

    async fn rows(&self, req: RequestBuilder) -> StoreResult<Vec<Row>> {
        let res = req
            .send()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;
        let status = res.status();
        let body = res
            .text()
            .await
            .map_err(|e| StoreError::Request(e.to_string()))?;

        if !status.is_success() {
            tracing::warn!("PostgREST answered {}: {}", status, body);
            return Err(classify_failure(status, &body));
        }
        if body.trim().is_empty() {
            return Ok(Vec::new());
        }

        match serde_json::from_str::<Value>(&body).map_err(|e| StoreError::Decode(e.to_string()))? {
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(map),
                    other => Err(StoreError::Decode(format!("expected a row, got {}", other))),
                })
                .collect(),
            Value::Object(map) => Ok(vec![map]),
            other => Err(StoreError::Decode(format!("expected rows, got {}", other))),
        }
    }
}

#[async_trait]
impl RecordStore for SupabaseStore {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        let mut pairs = vec![("select".to_string(), "*".to_string())];
        pairs.extend(query_pairs(filter));
        self.rows(self.request(reqwest::Method::GET, table).query(&pairs))
            .await
    }

    async fn insert(&self, table: Table, payload: Row) -> StoreResult<Row> {
        let req = self
            .request(reqwest::Method::POST, table)
            .header("Prefer", "return=representation")
            .json(&payload);
        self.rows(req)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Decode("insert returned no row".to_string()))
    }

    async fn update(&self, table: Table, filter: &Filter, payload: Row) -> StoreResult<Vec<Row>> {
        let req = self
            .request(reqwest::Method::PATCH, table)
            .header("Prefer", "return=representation")
            .query(&query_pairs(filter))
            .json(&payload);
        self.rows(req).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        let req = self
            .request(reqwest::Method::DELETE, table)
            .header("Prefer", "return=representation")
            .query(&query_pairs(filter));
        self.rows(req).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_follow_postgrest_syntax() {
        let filter = Filter::new()
            .eq("usuario_id", "abc")
            .neq("id", 7)
            .contains("username", "sur")
            .order_by("orden_miel", true)
            .limit(5);

        assert_eq!(
            query_pairs(&filter),
            vec![
                ("usuario_id".to_string(), "eq.abc".to_string()),
                ("id".to_string(), "neq.7".to_string()),
                ("username".to_string(), "ilike.*sur*".to_string()),
                ("order".to_string(), "orden_miel.asc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_classify_failure() {
        let dup = classify_failure(
            StatusCode::CONFLICT,
            r#"{"code":"23505","message":"duplicate key value"}"#,
        );
        assert_eq!(dup, StoreError::UniqueViolation("duplicate key value".into()));

        let rls = classify_failure(
            StatusCode::BAD_REQUEST,
            r#"{"code":"42501","message":"new row violates row-level security policy"}"#,
        );
        assert!(matches!(rls, StoreError::Denied(_)));

        let expired = classify_failure(StatusCode::UNAUTHORIZED, "JWT expired");
        assert_eq!(expired, StoreError::Unauthorized("JWT expired".into()));

        let other = classify_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        assert_eq!(other, StoreError::Request("500 boom".into()));
    }
}
