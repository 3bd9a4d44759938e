use dotenvy::dotenv;
use std::env;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod auth_client;
mod botanical;
mod commands;
mod config;
mod db;
mod error;
mod limiter;
mod middleware;
mod routes;
mod session;
mod state;
mod store;
mod validation;

#[cfg(test)]
mod test_support;

use auth_client::SupabaseAuth;
use botanical::BotanicalChart;
use config::{Config, StoreBackend};
use state::AppState;
use store::{memory::MemoryStoreProvider, supabase::SupabaseStoreProvider, StoreProvider};

#[tokio::main]
async fn main() {
    dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting MeliApp backend...");

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return;
        }
    };

    let http = reqwest::Client::new();

    let stores: Arc<dyn StoreProvider> = match config.store_backend {
        StoreBackend::Supabase => {
            tracing::info!("Using hosted record store at {}", config.supabase_url);
            Arc::new(SupabaseStoreProvider::new(
                http.clone(),
                &config.supabase_url,
                &config.supabase_key,
            ))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory record store, data is lost on restart");
            Arc::new(MemoryStoreProvider::new())
        }
    };

    if config.supabase_url.is_empty() {
        tracing::warn!("SUPABASE_URL not set, sign-in and registration will fail");
    }
    let auth = Arc::new(SupabaseAuth::new(
        http,
        &config.supabase_url,
        &config.supabase_key,
    ));

    let chart = match BotanicalChart::load(&config.botanical_csv_path) {
        Ok(chart) => chart,
        Err(e) => {
            tracing::error!("Failed to read botanical chart: {}", e);
            BotanicalChart::default()
        }
    };
    if chart.is_empty() {
        tracing::warn!("No communes loaded, botanical lookups will all miss");
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let app = routes::create_app(AppState::new(config, stores, auth, chart));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    tracing::info!("listening on {}", addr);

    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
    }
}
