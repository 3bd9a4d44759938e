use axum::{
    extract::{Path, Query, State},
    http::header,
    response::{IntoResponse, Response},
    Extension, Json,
};
use base64::{engine::general_purpose, Engine as _};
use qrcode_generator::QrCodeEcc;
use serde::Deserialize;
use serde_json::json;

use crate::commands::profile::uuid_segment;
use crate::error::{MeliError, MeliResult};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;

const DEFAULT_SCALE: usize = 10;
const MIN_SCALE: usize = 4;
const MAX_SCALE: usize = 40;
// Pixels per unit of scale.
const MODULE_PX: usize = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QrFormat {
    Png,
    Json,
}

impl QrFormat {
    pub fn parse(raw: Option<&str>) -> MeliResult<Self> {
        match raw.map(|f| f.trim().to_lowercase()).as_deref() {
            None | Some("") | Some("png") => Ok(QrFormat::Png),
            Some("json") => Ok(QrFormat::Json),
            Some(other) => Err(MeliError::Validation(format!(
                "Formato '{}' no soportado. Formatos válidos: png, json",
                other
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct QrQuery {
    pub format: Option<String>,
    pub scale: Option<usize>,
}

pub fn profile_link(base_url: &str, segment: &str) -> String {
    format!("{}/api/usuario/{}", base_url.trim_end_matches('/'), segment)
}

pub fn render_png(text: &str, scale: usize) -> MeliResult<Vec<u8>> {
    let size = scale.clamp(MIN_SCALE, MAX_SCALE) * MODULE_PX;
    qrcode_generator::to_png_to_vec(text, QrCodeEcc::Medium, size)
        .map_err(|e| MeliError::Internal(format!("QR generation failed: {}", e)))
}

pub fn png_data_url(png: &[u8]) -> String {
    format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(png))
}

/// QR code pointing at the owner's public profile. Only the owner may
/// generate it.
pub async fn owner_qr_axum(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
    Path(segment): Path<String>,
    Query(query): Query<QrQuery>,
) -> MeliResult<Response> {
    if segment.chars().count() != 8 {
        return Err(MeliError::Validation(
            "El segmento UUID debe tener 8 caracteres".to_string(),
        ));
    }
    let segment = segment.to_lowercase();
    if !user.owner_id().to_lowercase().starts_with(&segment) {
        tracing::warn!(
            "Owner {} asked for the QR of segment {}",
            user.owner_id(),
            segment
        );
        return Err(MeliError::Forbidden(
            "No tienes permisos para generar este QR".to_string(),
        ));
    }

    let format = QrFormat::parse(query.format.as_deref())?;
    let png = render_png(
        &profile_link(&state.config.public_base_url, &segment),
        query.scale.unwrap_or(DEFAULT_SCALE),
    )?;

    Ok(match format {
        QrFormat::Png => ([(header::CONTENT_TYPE, "image/png")], png).into_response(),
        QrFormat::Json => Json(json!({
            "success": true,
            "qr_code": png_data_url(&png),
            "user_id": user.owner_id(),
            "uuid_segment": uuid_segment(user.owner_id()),
        }))
        .into_response(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_parsing() {
        assert_eq!(QrFormat::parse(None).unwrap(), QrFormat::Png);
        assert_eq!(QrFormat::parse(Some("JSON")).unwrap(), QrFormat::Json);
        let err = QrFormat::parse(Some("svg")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Formato 'svg' no soportado. Formatos válidos: png, json"
        );
    }

    #[test]
    fn test_png_output() {
        let png = render_png("https://meliapp.cl/api/usuario/2f1c9a7e", 2).unwrap();
        assert_eq!(&png[..4], &[0x89, b'P', b'N', b'G']);
        assert!(png_data_url(&png).starts_with("data:image/png;base64,iVBOR"));
    }
}
