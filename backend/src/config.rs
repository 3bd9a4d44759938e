use std::{env, fmt::Display, path::PathBuf, str::FromStr};

use tracing::{info, warn};

use crate::error::{MeliError, MeliResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Supabase,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "supabase" => Ok(StoreBackend::Supabase),
            "memory" => Ok(StoreBackend::Memory),
            other => Err(format!("unknown store backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub store_backend: StoreBackend,
    pub supabase_url: String,
    pub supabase_key: String,
    pub secret_key: String,
    pub public_base_url: String,
    pub botanical_csv_path: PathBuf,
    pub session_ttl_secs: i64,
    pub registration_max_attempts: usize,
    pub registration_window_secs: i64,
}

impl Config {
    pub fn load() -> MeliResult<Self> {
        let port: u16 = try_load("PORT", "3000")?;
        let config = Self {
            port,
            store_backend: try_load("STORE_BACKEND", "supabase")?,
            supabase_url: var("SUPABASE_URL").unwrap_or_default(),
            supabase_key: var("SUPABASE_KEY").unwrap_or_default(),
            secret_key: var("SECRET_KEY").unwrap_or_else(|_| {
                warn!("SECRET_KEY not set, sessions are signed with a development key");
                "meliapp_dev_secret_change_me".to_string()
            }),
            public_base_url: try_load("PUBLIC_BASE_URL", &format!("http://localhost:{}", port))?,
            botanical_csv_path: try_load("BOTANICAL_CSV_PATH", "docs/clases.csv")?,
            session_ttl_secs: try_load("SESSION_TTL_SECS", "604800")?,
            registration_max_attempts: try_load("REGISTRATION_MAX_ATTEMPTS", "5")?,
            registration_window_secs: try_load("REGISTRATION_WINDOW_SECS", "3600")?,
        };

        if config.store_backend == StoreBackend::Supabase
            && (config.supabase_url.is_empty() || config.supabase_key.is_empty())
        {
            return Err(MeliError::Internal(
                "SUPABASE_URL and SUPABASE_KEY are required with STORE_BACKEND=supabase".into(),
            ));
        }
        Ok(config)
    }

    /// Settings for an isolated in-memory instance.
    pub fn for_tests() -> Self {
        Self {
            port: 0,
            store_backend: StoreBackend::Memory,
            supabase_url: String::new(),
            supabase_key: String::new(),
            secret_key: "test_secret".to_string(),
            public_base_url: "http://localhost:3000".to_string(),
            botanical_csv_path: PathBuf::from("docs/clases.csv"),
            session_ttl_secs: 3600,
            registration_max_attempts: 3,
            registration_window_secs: 3600,
        }
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        warn!("Environment variable {key} not found, using default");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> MeliResult<T>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e| MeliError::Internal(format!("Invalid {key} value: {e}")))
}
