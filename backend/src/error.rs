use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Serialize, Serializer};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Error, Debug)]
pub enum MeliError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Comuna no registrada: {comuna}")]
    CommuneNotRegistered {
        comuna: String,
        available: Vec<String>,
    },

    #[error("{0}")]
    Auth(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    RateLimited(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MeliError {
    pub fn status(&self) -> StatusCode {
        match self {
            MeliError::Validation(_) | MeliError::Conflict(_) => StatusCode::BAD_REQUEST,
            MeliError::NotFound(_) | MeliError::CommuneNotRegistered { .. } => {
                StatusCode::NOT_FOUND
            }
            MeliError::Auth(_) => StatusCode::UNAUTHORIZED,
            MeliError::Forbidden(_) => StatusCode::FORBIDDEN,
            MeliError::RateLimited(_) => StatusCode::TOO_MANY_REQUESTS,
            MeliError::Store(StoreError::UniqueViolation(_)) => StatusCode::BAD_REQUEST,
            MeliError::Store(StoreError::Unauthorized(_)) => StatusCode::UNAUTHORIZED,
            MeliError::Store(StoreError::Denied(_)) => StatusCode::FORBIDDEN,
            MeliError::Network(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Malformed request bodies are reported like any other invalid input.
impl From<JsonRejection> for MeliError {
    fn from(rejection: JsonRejection) -> Self {
        MeliError::Validation(format!("Solicitud inválida: {}", rejection.body_text()))
    }
}

// Serialized as its message so it can be embedded in JSON payloads directly.
impl Serialize for MeliError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_ref())
    }
}

pub type MeliResult<T> = Result<T, MeliError>;

impl IntoResponse for MeliError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match self {
            MeliError::CommuneNotRegistered { comuna, available } => json!({
                "success": false,
                "error": format!("Comuna no registrada: {}", comuna),
                "message": format!("Comuna no registrada: {}", comuna),
                "requested_comuna": comuna,
                "available_communes": available,
            }),
            MeliError::Store(ref e) => {
                tracing::error!("Store Error: {:?}", e);
                let message = match e {
                    StoreError::UniqueViolation(_) => {
                        "El registro entra en conflicto con uno existente".to_string()
                    }
                    _ => format!("Error de base de datos: {}", e),
                };
                json!({ "success": false, "error": message })
            }
            MeliError::Network(ref e) => {
                tracing::error!("Network Error: {:?}", e);
                json!({
                    "success": false,
                    "error": "No se pudo conectar con el servicio externo.",
                })
            }
            MeliError::Internal(ref msg) => {
                tracing::error!("Internal Error: {}", msg);
                json!({ "success": false, "error": "Error interno del servidor" })
            }
            MeliError::Io(ref e) => {
                tracing::error!("IO Error: {:?}", e);
                json!({ "success": false, "error": "Error interno del servidor" })
            }
            MeliError::Json(_) | MeliError::Csv(_) => {
                tracing::error!("Unhandled Error: {:?}", self);
                json!({ "success": false, "error": "Error interno del servidor" })
            }
            other => json!({ "success": false, "error": other.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}
