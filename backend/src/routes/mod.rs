use crate::middleware::{auth::session_middleware, response::wrap_response_middleware};
use crate::state::AppState;
use axum::{middleware, routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod auth;
pub mod botanical;
pub mod lots;
pub mod profile;
pub mod system;

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .merge(system::router())
        .merge(auth::router())
        .merge(lots::router())
        .merge(botanical::router())
        .merge(profile::router())
}

/// Full application: routes, session resolution, response envelope.
pub fn create_app(state: AppState) -> Router {
    create_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            session_middleware,
        ))
        .layer(middleware::from_fn(wrap_response_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

async fn root() -> &'static str {
    "MeliApp backend is running"
}
