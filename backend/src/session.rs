use axum::http::{header, HeaderMap};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{MeliError, MeliResult};

pub const SESSION_COOKIE: &str = "meliapp_session";
pub const PKCE_COOKIE: &str = "meliapp_pkce";

const PENDING_OAUTH_TTL_SECS: i64 = 600;
// Refresh a little before the provider's deadline.
const EXPIRY_MARGIN_SECS: i64 = 30;

/// Server-side session of a signed-in owner.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionState {
    pub owner_id: String,
    pub user_name: String,
    pub email: String,
    pub company: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    /// Unix seconds; `None` when the provider gave no lifetime.
    pub token_expires_at: Option<i64>,
}

impl SessionState {
    pub fn access_expired(&self, now: i64) -> bool {
        self.token_expires_at
            .map_or(false, |exp| exp - EXPIRY_MARGIN_SECS <= now)
    }
}

/// Cookie payload: the session id, signed with SECRET_KEY.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub sid: String,
    pub exp: usize,
}

#[derive(Clone, Debug)]
struct StoredSession {
    state: SessionState,
    /// Same deadline as the cookie's `exp`.
    expires_at: i64,
}

#[derive(Clone, Debug)]
struct PendingOAuth {
    verifier: String,
    created_at: i64,
}

#[derive(Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, StoredSession>>>,
    pending: Arc<RwLock<HashMap<String, PendingOAuth>>>,
    secret: Arc<Vec<u8>>,
    ttl_secs: i64,
}

fn poisoned<T>(_: T) -> MeliError {
    MeliError::Internal("session table lock poisoned".to_string())
}

impl SessionStore {
    pub fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            pending: Arc::new(RwLock::new(HashMap::new())),
            secret: Arc::new(secret.as_bytes().to_vec()),
            ttl_secs,
        }
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl_secs
    }

    /// Stores the session and returns the signed token for the cookie.
    /// Sessions whose cookie has expired are pruned on the way.
    pub fn create(&self, state: SessionState) -> MeliResult<String> {
        let sid = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let expires_at = now + self.ttl_secs;
        let claims = Claims {
            sub: state.owner_id.clone(),
            sid: sid.clone(),
            exp: expires_at.max(0) as usize,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| MeliError::Internal(format!("Failed to sign session: {}", e)))?;

        let mut sessions = self.sessions.write().map_err(poisoned)?;
        let before = sessions.len();
        sessions.retain(|_, s| s.expires_at > now);
        if sessions.len() < before {
            tracing::debug!("Pruned {} expired sessions", before - sessions.len());
        }
        sessions.insert(sid, StoredSession { state, expires_at });
        Ok(token)
    }

    fn claims(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
    }

    /// Session id and state behind a signed token.
    pub fn resolve(&self, token: &str) -> Option<(String, SessionState)> {
        let claims = self.claims(token)?;
        let sessions = self.sessions.read().ok()?;
        let stored = sessions.get(&claims.sid)?;
        (stored.state.owner_id == claims.sub).then(|| (claims.sid.clone(), stored.state.clone()))
    }

    /// Swaps the state of a live session; its cookie deadline is kept.
    pub fn replace(&self, sid: &str, state: SessionState) -> MeliResult<()> {
        if let Some(stored) = self.sessions.write().map_err(poisoned)?.get_mut(sid) {
            stored.state = state;
        }
        Ok(())
    }

    pub fn remove(&self, sid: &str) -> MeliResult<Option<SessionState>> {
        Ok(self
            .sessions
            .write()
            .map_err(poisoned)?
            .remove(sid)
            .map(|stored| stored.state))
    }

    /// Drops the session a token points at, if any.
    pub fn revoke(&self, token: &str) -> MeliResult<Option<SessionState>> {
        match self.claims(token) {
            Some(claims) => self.remove(&claims.sid),
            None => Ok(None),
        }
    }

    /// Remembers a PKCE verifier; returns the key handed to the browser.
    pub fn stash_verifier(&self, verifier: String) -> MeliResult<String> {
        let key = uuid::Uuid::new_v4().to_string();
        let now = Utc::now().timestamp();
        let mut pending = self.pending.write().map_err(poisoned)?;
        pending.retain(|_, p| now - p.created_at < PENDING_OAUTH_TTL_SECS);
        pending.insert(
            key.clone(),
            PendingOAuth {
                verifier,
                created_at: now,
            },
        );
        Ok(key)
    }

    /// One-shot: the verifier is gone after this call.
    pub fn take_verifier(&self, key: &str) -> MeliResult<Option<String>> {
        let now = Utc::now().timestamp();
        let entry = self.pending.write().map_err(poisoned)?.remove(key);
        Ok(entry
            .filter(|p| now - p.created_at < PENDING_OAUTH_TTL_SECS)
            .map(|p| p.verifier))
    }
}

pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(k, _)| *k == name)
        .map(|(_, v)| v.to_string())
        .filter(|v| !v.is_empty())
}

/// Session token from the cookie, else from `Authorization: Bearer`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, SESSION_COOKIE).or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
    })
}

pub fn set_cookie(name: &str, value: &str, max_age: i64) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age
    )
}

pub fn clear_cookie(name: &str) -> String {
    set_cookie(name, "", 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn sample() -> SessionState {
        SessionState {
            owner_id: "2f1c9a7e-0000-4000-8000-000000000001".into(),
            user_name: "Apicultora".into(),
            email: "a@miel.cl".into(),
            company: None,
            access_token: "at".into(),
            refresh_token: Some("rt".into()),
            token_expires_at: Some(1_000),
        }
    }

    #[test]
    fn test_create_resolve_revoke() {
        let store = SessionStore::new("secret", 3600);
        let token = store.create(sample()).unwrap();

        let (sid, state) = store.resolve(&token).unwrap();
        assert_eq!(state, sample());

        assert!(store.revoke(&token).unwrap().is_some());
        assert!(store.resolve(&token).is_none());
        assert!(store.remove(&sid).unwrap().is_none());
    }

    #[test]
    fn test_token_signed_with_other_secret_is_rejected() {
        let a = SessionStore::new("secret-a", 3600);
        let b = SessionStore::new("secret-b", 3600);
        let token = a.create(sample()).unwrap();
        assert!(b.resolve(&token).is_none());
        assert!(a.resolve("not-a-jwt").is_none());
    }

    #[test]
    fn test_access_expired_uses_margin() {
        let state = sample();
        assert!(!state.access_expired(900));
        assert!(state.access_expired(980));
        let no_expiry = SessionState {
            token_expires_at: None,
            ..sample()
        };
        assert!(!no_expiry.access_expired(i64::MAX));
    }

    #[test]
    fn test_expired_sessions_are_pruned_on_create() {
        let expired = SessionStore::new("secret", -120);
        for _ in 0..3 {
            let token = expired.create(sample()).unwrap();
            assert!(expired.resolve(&token).is_none());
        }
        assert_eq!(expired.sessions.read().unwrap().len(), 1);

        let live = SessionStore::new("secret", 3600);
        let first = live.create(sample()).unwrap();
        let second = live.create(sample()).unwrap();
        assert_eq!(live.sessions.read().unwrap().len(), 2);
        assert!(live.resolve(&first).is_some());
        assert!(live.resolve(&second).is_some());
    }

    #[test]
    fn test_replace_keeps_session_alive() {
        let store = SessionStore::new("secret", 3600);
        let token = store.create(sample()).unwrap();
        let (sid, _) = store.resolve(&token).unwrap();
        let refreshed = SessionState {
            access_token: "at-2".into(),
            ..sample()
        };
        store.replace(&sid, refreshed).unwrap();
        assert_eq!(store.resolve(&token).unwrap().1.access_token, "at-2");
    }

    #[test]
    fn test_verifier_is_one_shot() {
        let store = SessionStore::new("secret", 3600);
        let key = store.stash_verifier("v".into()).unwrap();
        assert_eq!(store.take_verifier(&key).unwrap().as_deref(), Some("v"));
        assert!(store.take_verifier(&key).unwrap().is_none());
    }

    #[test]
    fn test_extract_token_prefers_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer from-header"));
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));

        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; meliapp_session=from-cookie"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("from-cookie"));
    }
}
