//! Fixtures shared by the crate-level test modules.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::auth_client::{AuthProvider, AuthSession, AuthUser, SignUpOutcome};
use crate::botanical::BotanicalChart;
use crate::config::Config;
use crate::db::Table;
use crate::error::{MeliError, MeliResult};
use crate::session::SessionState;
use crate::state::AppState;
use crate::store::memory::{MemoryStore, MemoryStoreProvider};
use crate::store::{Filter, RecordStore, Row, StoreError, StoreResult};

/// Identity provider double. Access tokens are `access:<user id>`, refresh
/// tokens `refresh:<user id>` and confirmation links `confirm:<email>`.
pub struct FakeAuth {
    accounts: Mutex<HashMap<String, (String, AuthUser)>>,
    token_lifetime: i64,
    pub refresh_fails: AtomicBool,
    /// Sign-ups stay unconfirmed and get no session.
    pub require_confirmation: AtomicBool,
    pub confirmations_sent: AtomicUsize,
}

impl FakeAuth {
    pub fn new() -> Self {
        Self::with_lifetime(3600)
    }

    /// Tokens already past their deadline, so every request refreshes.
    pub fn expiring() -> Self {
        Self::with_lifetime(-60)
    }

    fn with_lifetime(token_lifetime: i64) -> Self {
        Self {
            accounts: Mutex::new(HashMap::new()),
            token_lifetime,
            refresh_fails: AtomicBool::new(false),
            require_confirmation: AtomicBool::new(false),
            confirmations_sent: AtomicUsize::new(0),
        }
    }

    pub fn add_account(&self, email: &str, password: &str, confirmed: bool) -> AuthUser {
        let user = AuthUser {
            id: uuid::Uuid::new_v4().to_string(),
            email: Some(email.to_string()),
            email_confirmed_at: confirmed.then(|| Utc::now().to_rfc3339()),
            user_metadata: Value::Null,
        };
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        user
    }

    pub fn session_for(&self, user: &AuthUser) -> AuthSession {
        AuthSession {
            access_token: format!("access:{}", user.id),
            refresh_token: Some(format!("refresh:{}", user.id)),
            expires_in: Some(self.token_lifetime),
            expires_at: None,
            user: user.clone(),
        }
    }

    fn user_by_id(&self, id: &str) -> Option<AuthUser> {
        self.accounts
            .lock()
            .unwrap()
            .values()
            .find(|(_, u)| u.id == id)
            .map(|(_, u)| u.clone())
    }
}

#[async_trait]
impl AuthProvider for FakeAuth {
    async fn sign_up(
        &self,
        email: &str,
        password: &str,
        metadata: Value,
    ) -> MeliResult<SignUpOutcome> {
        if self.accounts.lock().unwrap().contains_key(email) {
            return Err(MeliError::Conflict("El email ya está registrado".to_string()));
        }
        let pending = self.require_confirmation.load(Ordering::SeqCst);
        let mut user = self.add_account(email, password, !pending);
        user.user_metadata = metadata;
        self.accounts
            .lock()
            .unwrap()
            .insert(email.to_string(), (password.to_string(), user.clone()));
        if pending {
            self.confirmations_sent.fetch_add(1, Ordering::SeqCst);
        }
        Ok(SignUpOutcome {
            session: (!pending).then(|| self.session_for(&user)),
            user,
        })
    }

    async fn sign_in_password(&self, email: &str, password: &str) -> MeliResult<AuthSession> {
        let found = self.accounts.lock().unwrap().get(email).cloned();
        match found {
            Some((stored, user)) if stored == password && user.email_confirmed_at.is_none() => {
                Err(MeliError::Forbidden(
                    "Debes confirmar tu email antes de iniciar sesión".to_string(),
                ))
            }
            Some((stored, user)) if stored == password => Ok(self.session_for(&user)),
            _ => Err(MeliError::Auth("Credenciales inválidas".to_string())),
        }
    }

    async fn refresh(&self, refresh_token: &str) -> MeliResult<AuthSession> {
        if self.refresh_fails.load(Ordering::SeqCst) {
            return Err(MeliError::Auth("Refresh token expirado".to_string()));
        }
        refresh_token
            .strip_prefix("refresh:")
            .and_then(|id| self.user_by_id(id))
            .map(|user| self.session_for(&user))
            .ok_or_else(|| MeliError::Auth("Refresh token inválido".to_string()))
    }

    async fn exchange_code(&self, code: &str, verifier: &str) -> MeliResult<AuthSession> {
        if verifier.is_empty() {
            return Err(MeliError::Auth("Verificador ausente".to_string()));
        }
        // Codes are the account email.
        let found = self.accounts.lock().unwrap().get(code).cloned();
        found
            .map(|(_, user)| self.session_for(&user))
            .ok_or_else(|| MeliError::Auth("Código inválido".to_string()))
    }

    async fn get_user(&self, access_token: &str) -> MeliResult<AuthUser> {
        access_token
            .strip_prefix("access:")
            .and_then(|id| self.user_by_id(id))
            .ok_or_else(|| MeliError::Auth("Token inválido".to_string()))
    }

    async fn update_password(&self, access_token: &str, password: &str) -> MeliResult<()> {
        let user = self.get_user(access_token).await?;
        let email = user.email.clone().unwrap_or_default();
        self.accounts
            .lock()
            .unwrap()
            .insert(email, (password.to_string(), user));
        Ok(())
    }

    async fn send_recovery(&self, _email: &str, _redirect_to: &str) -> MeliResult<()> {
        Ok(())
    }

    async fn verify_email(&self, token_hash: &str, _kind: &str) -> MeliResult<AuthSession> {
        let email = token_hash
            .strip_prefix("confirm:")
            .ok_or_else(|| MeliError::Auth("Token has expired or is invalid".to_string()))?;
        let mut accounts = self.accounts.lock().unwrap();
        let (_, user) = accounts
            .get_mut(email)
            .ok_or_else(|| MeliError::Auth("Token has expired or is invalid".to_string()))?;
        user.email_confirmed_at = Some(Utc::now().to_rfc3339());
        let user = user.clone();
        drop(accounts);
        Ok(self.session_for(&user))
    }

    async fn resend_confirmation(&self, email: &str) -> MeliResult<()> {
        let pending = self
            .accounts
            .lock()
            .unwrap()
            .get(email)
            .map_or(false, |(_, u)| u.email_confirmed_at.is_none());
        if !pending {
            return Err(MeliError::Validation("Email already confirmed".to_string()));
        }
        self.confirmations_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_out(&self, _access_token: &str) -> MeliResult<()> {
        Ok(())
    }

    fn authorize_url(&self, provider: &str, redirect_to: &str, challenge: &str) -> String {
        format!(
            "https://auth.test/authorize?provider={}&redirect_to={}&code_challenge={}",
            provider, redirect_to, challenge
        )
    }
}

/// Store that counts calls and fails every one of them.
#[derive(Default)]
pub struct CountingStore {
    pub calls: AtomicUsize,
}

impl CountingStore {
    fn hit(&self) -> StoreError {
        self.calls.fetch_add(1, Ordering::SeqCst);
        StoreError::Request("store offline".to_string())
    }
}

#[async_trait]
impl RecordStore for CountingStore {
    async fn select(&self, _table: Table, _filter: &Filter) -> StoreResult<Vec<Row>> {
        Err(self.hit())
    }

    async fn insert(&self, _table: Table, _payload: Row) -> StoreResult<Row> {
        Err(self.hit())
    }

    async fn update(&self, _table: Table, _filter: &Filter, _payload: Row) -> StoreResult<Vec<Row>> {
        Err(self.hit())
    }

    async fn delete(&self, _table: Table, _filter: &Filter) -> StoreResult<Vec<Row>> {
        Err(self.hit())
    }
}

/// Memory store whose `fail_on`-th update (1-based) fails with a network
/// error. Every other call goes through.
pub struct FlakyUpdateStore {
    pub inner: MemoryStore,
    fail_on: usize,
    updates: AtomicUsize,
}

impl FlakyUpdateStore {
    pub fn new(inner: MemoryStore, fail_on: usize) -> Self {
        Self {
            inner,
            fail_on,
            updates: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RecordStore for FlakyUpdateStore {
    async fn select(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.inner.select(table, filter).await
    }

    async fn insert(&self, table: Table, payload: Row) -> StoreResult<Row> {
        self.inner.insert(table, payload).await
    }

    async fn update(&self, table: Table, filter: &Filter, payload: Row) -> StoreResult<Vec<Row>> {
        if self.updates.fetch_add(1, Ordering::SeqCst) + 1 == self.fail_on {
            return Err(StoreError::Request("network".to_string()));
        }
        self.inner.update(table, filter, payload).await
    }

    async fn delete(&self, table: Table, filter: &Filter) -> StoreResult<Vec<Row>> {
        self.inner.delete(table, filter).await
    }
}

pub fn valdivia_chart() -> BotanicalChart {
    BotanicalChart::from_entries([
        ("Valdivia", "Arbol", "Ulmo"),
        ("Valdivia", "Arbol", "Quillay"),
        ("Valdivia", "Hierba", "Manzanilla"),
        ("Valdivia", "Hierba", "Ulmo"),
        ("Osorno", "Arbusto", "Maqui"),
    ])
}

pub struct TestApp {
    pub state: AppState,
    pub store: MemoryStore,
    pub auth: Arc<FakeAuth>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_auth(FakeAuth::new())
    }

    pub fn with_auth(auth: FakeAuth) -> Self {
        let memory = MemoryStoreProvider::new();
        let store = memory.store();
        let auth = Arc::new(auth);
        let state = AppState::new(
            Config::for_tests(),
            Arc::new(memory),
            auth.clone(),
            valdivia_chart(),
        );
        Self { state, store, auth }
    }

    pub fn store_handle(&self) -> Arc<dyn RecordStore> {
        Arc::new(self.store.clone())
    }

    /// Opens a server-side session directly; returns the signed token.
    pub fn sign_in(&self, user: &AuthUser) -> String {
        let tokens = self.auth.session_for(user);
        self.state
            .sessions
            .create(SessionState {
                owner_id: user.id.clone(),
                user_name: user.email.clone().unwrap_or_default(),
                email: user.email.clone().unwrap_or_default(),
                company: None,
                token_expires_at: tokens.expiry(Utc::now().timestamp()),
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            })
            .unwrap()
    }
}
