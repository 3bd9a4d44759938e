use std::sync::Arc;

use crate::auth_client::AuthProvider;
use crate::botanical::BotanicalChart;
use crate::config::Config;
use crate::limiter::RegistrationLimiter;
use crate::middleware::auth::CurrentUser;
use crate::session::SessionStore;
use crate::store::{RecordStore, StoreProvider};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub stores: Arc<dyn StoreProvider>,
    pub auth: Arc<dyn AuthProvider>,
    pub sessions: SessionStore,
    pub botanical: Arc<BotanicalChart>,
    pub limiter: RegistrationLimiter,
}

impl AppState {
    pub fn new(
        config: Config,
        stores: Arc<dyn StoreProvider>,
        auth: Arc<dyn AuthProvider>,
        botanical: BotanicalChart,
    ) -> Self {
        let sessions = SessionStore::new(&config.secret_key, config.session_ttl_secs);
        let limiter = RegistrationLimiter::new(
            config.registration_max_attempts,
            config.registration_window_secs,
        );
        Self {
            config: Arc::new(config),
            stores,
            auth,
            sessions,
            botanical: Arc::new(botanical),
            limiter,
        }
    }

    /// Handle carrying only the public API key.
    pub fn public_store(&self) -> Arc<dyn RecordStore> {
        self.stores.scoped(None)
    }

    /// The signed-in user's handle when there is one, else the public one.
    pub fn store_for(&self, user: Option<&CurrentUser>) -> Arc<dyn RecordStore> {
        match user {
            Some(user) => user.store.clone(),
            None => self.public_store(),
        }
    }
}

impl axum::extract::FromRef<AppState> for Arc<BotanicalChart> {
    fn from_ref(state: &AppState) -> Self {
        state.botanical.clone()
    }
}
