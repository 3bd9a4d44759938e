use crate::commands;
use crate::state::AppState;
use axum::{
    routing::{get, post},
    Router,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/edit/usuarios", post(commands::profile::edit_usuarios))
        .route(
            "/api/edit/info_contacto",
            post(commands::profile::edit_info_contacto),
        )
        .route(
            "/api/edit/ubicaciones",
            post(commands::profile::edit_ubicaciones),
        )
        .route("/api/edit/:table", get(commands::profile::get_owner_table))
        .route("/api/profile/me", get(commands::profile::get_my_profile))
        .route(
            "/api/profile/:user_id",
            get(commands::profile::get_public_profile),
        )
        .route("/api/user/current", get(commands::profile::get_current_user))
        .route("/api/buscar", get(commands::profile::search_axum))
        .route(
            "/api/usuario/:segment",
            get(commands::profile::get_usuario_by_segment),
        )
        .route("/api/usuario/:segment/qr", get(commands::qr::owner_qr_axum))
}
