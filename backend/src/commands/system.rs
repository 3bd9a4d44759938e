use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::error::MeliResult;
use crate::state::AppState;

const CURRENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Store reachability check.
pub async fn connection_test(State(state): State<AppState>) -> MeliResult<Json<Value>> {
    state.public_store().ping().await?;
    tracing::debug!("Store ping succeeded");
    Ok(Json(json!({
        "success": true,
        "message": "Conexión con la base de datos exitosa",
        "version": CURRENT_VERSION,
        "communes_loaded": state.botanical.communes().len(),
    })))
}
