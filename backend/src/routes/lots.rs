use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post, put},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/gestionar-lote", post(commands::lots::create_lot_axum))
        .route(
            "/api/lote/:lote_id",
            put(commands::lots::update_lot_axum).delete(commands::lots::delete_lot_axum),
        )
        .route("/api/lotes/reordenar", post(commands::lots::reorder_lots_axum))
        .route("/api/lotes/:owner_id", get(commands::lots::list_lots_axum))
        .route(
            "/api/usuario-info/:owner_id",
            get(commands::lots::species_for_owner_axum),
        )
}
