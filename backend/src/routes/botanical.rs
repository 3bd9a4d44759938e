use crate::commands;
use crate::state::AppState;
use axum::{routing::get, Router};

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/botanical-classes",
            get(commands::botanical::list_communes_axum),
        )
        .route(
            "/api/botanical-classes/:comuna",
            get(commands::botanical::commune_classes_axum),
        )
}
