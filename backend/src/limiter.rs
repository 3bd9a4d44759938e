use chrono::{Duration, SecondsFormat, Utc};
use serde_json::{json, Value};

use crate::db::Table;
use crate::error::{MeliError, MeliResult};
use crate::store::{Filter, RecordStore};

/// Caps sign-up attempts per email within a sliding window.
///
/// Attempts are rows of `intentos_registro`, so every instance sharing the
/// store sees the same counts.
#[derive(Debug, Clone, Copy)]
pub struct RegistrationLimiter {
    pub max_attempts: usize,
    pub window_secs: i64,
}

impl RegistrationLimiter {
    pub fn new(max_attempts: usize, window_secs: i64) -> Self {
        Self {
            max_attempts,
            window_secs,
        }
    }

    /// Records the attempt, failing when the window is already full.
    pub async fn check_and_record(&self, store: &dyn RecordStore, email: &str) -> MeliResult<()> {
        let email = email.trim().to_lowercase();
        let now = Utc::now();
        let since = (now - Duration::seconds(self.window_secs))
            .to_rfc3339_opts(SecondsFormat::Secs, true);

        let recent = store
            .select(
                Table::IntentosRegistro,
                &Filter::owned_by(Table::IntentosRegistro, &email).gte("created_at", since),
            )
            .await?;

        if recent.len() >= self.max_attempts {
            tracing::warn!("Registration attempts exceeded for {}", email);
            return Err(MeliError::RateLimited(
                "Demasiados intentos de registro. Intenta nuevamente más tarde.".to_string(),
            ));
        }

        let attempt = json!({
            "email": email,
            "created_at": now.to_rfc3339_opts(SecondsFormat::Secs, true),
        });
        if let Value::Object(row) = attempt {
            store.insert(Table::IntentosRegistro, row).await?;
        }
        Ok(())
    }
}
