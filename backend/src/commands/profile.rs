use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::db::{BeekeeperRequest, ContactInfo, Location, Lot, Owner, Table, OWNER_ROLES};
use crate::error::{MeliError, MeliResult};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;
use crate::store::{decode_row, decode_rows, encode_row, Filter, RecordStore, Row};
use crate::validation::{
    validate_email, validate_enum, validate_length, validate_numeric_range, validate_username,
    Check,
};

const MAX_ROLE_CHARS: usize = 30;
const SEGMENT_LEN: usize = 8;
const DEFAULT_SEARCH_LIMIT: usize = 10;
const MAX_SEARCH_LIMIT: usize = 50;

/// First dash-separated group of an owner id, lowercased, at most 8 chars.
pub fn uuid_segment(owner_id: &str) -> String {
    owner_id
        .split('-')
        .next()
        .unwrap_or_default()
        .to_lowercase()
        .chars()
        .take(SEGMENT_LEN)
        .collect()
}

// ---------------------------------------------------------------------------
// Editing
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
pub struct OwnerPatch {
    pub username: Option<String>,
    pub role: Option<String>,
}

/// Fields of `info_contacto` an owner may edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContactField {
    NombreCompleto,
    NombreEmpresa,
    CorreoPrincipal,
    CorreoSecundario,
    TelefonoPrincipal,
    TelefonoSecundario,
    Direccion,
    Comuna,
    Region,
}

impl ContactField {
    pub const ALL: [ContactField; 9] = [
        ContactField::NombreCompleto,
        ContactField::NombreEmpresa,
        ContactField::CorreoPrincipal,
        ContactField::CorreoSecundario,
        ContactField::TelefonoPrincipal,
        ContactField::TelefonoSecundario,
        ContactField::Direccion,
        ContactField::Comuna,
        ContactField::Region,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            ContactField::NombreCompleto => "nombre_completo",
            ContactField::NombreEmpresa => "nombre_empresa",
            ContactField::CorreoPrincipal => "correo_principal",
            ContactField::CorreoSecundario => "correo_secundario",
            ContactField::TelefonoPrincipal => "telefono_principal",
            ContactField::TelefonoSecundario => "telefono_secundario",
            ContactField::Direccion => "direccion",
            ContactField::Comuna => "comuna",
            ContactField::Region => "region",
        }
    }

    pub fn validate(&self, value: &str) -> Check<String> {
        match self {
            ContactField::NombreCompleto => validate_length("nombre_completo", value, 2, 150),
            ContactField::CorreoPrincipal | ContactField::CorreoSecundario => validate_email(value),
            ContactField::TelefonoPrincipal | ContactField::TelefonoSecundario => {
                validate_length(self.column(), value, 1, 50)
            }
            ContactField::NombreEmpresa => validate_length("nombre_empresa", value, 1, 150),
            ContactField::Direccion => validate_length("direccion", value, 1, 255),
            ContactField::Comuna | ContactField::Region => {
                validate_length(self.column(), value, 1, 100)
            }
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactPatch {
    pub nombre_completo: Option<String>,
    pub nombre_empresa: Option<String>,
    pub correo_principal: Option<String>,
    pub correo_secundario: Option<String>,
    pub telefono_principal: Option<String>,
    pub telefono_secundario: Option<String>,
    pub direccion: Option<String>,
    pub comuna: Option<String>,
    pub region: Option<String>,
}

impl ContactPatch {
    pub fn get(&self, field: ContactField) -> Option<&str> {
        let value = match field {
            ContactField::NombreCompleto => &self.nombre_completo,
            ContactField::NombreEmpresa => &self.nombre_empresa,
            ContactField::CorreoPrincipal => &self.correo_principal,
            ContactField::CorreoSecundario => &self.correo_secundario,
            ContactField::TelefonoPrincipal => &self.telefono_principal,
            ContactField::TelefonoSecundario => &self.telefono_secundario,
            ContactField::Direccion => &self.direccion,
            ContactField::Comuna => &self.comuna,
            ContactField::Region => &self.region,
        };
        value.as_deref().map(str::trim).filter(|v| !v.is_empty())
    }

    /// Validated columns to write. Blank values are skipped, never cleared.
    pub fn to_row(&self) -> MeliResult<Row> {
        let mut row = Map::new();
        for field in ContactField::ALL {
            if let Some(raw) = self.get(field) {
                let value = field.validate(raw).map_err(MeliError::Validation)?;
                row.insert(field.column().to_string(), Value::String(value));
            }
        }
        if row.is_empty() {
            return Err(MeliError::Validation(
                "No hay campos válidos para actualizar".to_string(),
            ));
        }
        Ok(row)
    }
}

#[derive(Debug, Deserialize)]
pub struct LocationInput {
    #[serde(default)]
    pub ubicacion: String,
    pub descripcion: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedLocation {
    pub nombre: String,
    pub latitud: Option<f64>,
    pub longitud: Option<f64>,
    pub norma_geo: &'static str,
}

/// Accepts `lat,long` or a Google Plus Code such as `CVV6+HJ7 Pichipehuenco`.
pub fn parse_location(input: &str) -> Check<ParsedLocation> {
    let input = input.trim();
    if input.is_empty() {
        return Err("Ubicación requerida".to_string());
    }

    if let Some((lat, long)) = input.split_once(',') {
        let (lat, long) = (Value::from(lat.trim()), Value::from(long.trim()));
        if let (Ok(latitud), Ok(longitud)) = (
            validate_numeric_range("latitud", &lat, -90.0, 90.0),
            validate_numeric_range("longitud", &long, -180.0, 180.0),
        ) {
            return Ok(ParsedLocation {
                nombre: format!("{}, {}", latitud, longitud),
                latitud: Some(latitud),
                longitud: Some(longitud),
                norma_geo: "WGS84",
            });
        }
    }

    let parts: Vec<&str> = input.split('+').collect();
    if parts.len() != 2 {
        return Err(
            "Formato inválido. Use un PLUS CODE de Google Maps (ej: CVV6+HJ7 Pichipehuenco) o latitud,longitud"
                .to_string(),
        );
    }
    let suffix = parts[1].split_whitespace().next().unwrap_or_default();
    if parts[0].trim().chars().count() < 4 || suffix.chars().count() < 2 {
        return Err(
            "PLUS CODE inválido. Use el formato de Google Maps (ej: CVV6+HJ7 Pichipehuenco)"
                .to_string(),
        );
    }
    Ok(ParsedLocation {
        nombre: input.to_string(),
        latitud: None,
        longitud: None,
        norma_geo: "PLUS_CODE",
    })
}

pub async fn edit_usuarios(
    Extension(user): Extension<CurrentUser>,
    Json(patch): Json<OwnerPatch>,
) -> MeliResult<Json<Value>> {
    let mut update = Map::new();

    if let Some(raw) = patch.username.as_deref() {
        let username = validate_username(raw).map_err(MeliError::Validation)?;
        let taken = user
            .store
            .select(
                Table::Usuarios,
                &Filter::new()
                    .eq("username", username.as_str())
                    .neq("auth_user_id", user.owner_id())
                    .limit(1),
            )
            .await?;
        if !taken.is_empty() {
            return Err(MeliError::Conflict("Username ya está en uso".to_string()));
        }
        update.insert("username".into(), json!(username));
    }

    if let Some(raw) = patch.role.as_deref() {
        let truncated: String = raw.chars().take(MAX_ROLE_CHARS).collect();
        let role = validate_enum("Rol", &truncated, &OWNER_ROLES).map_err(MeliError::Validation)?;
        update.insert("role".into(), json!(role));
    }

    if update.is_empty() {
        return Err(MeliError::Validation(
            "No hay campos válidos para actualizar".to_string(),
        ));
    }
    update.insert("tipo_usuario".into(), json!("Regular"));

    let rows = user
        .store
        .update(
            Table::Usuarios,
            &Filter::owned_by(Table::Usuarios, user.owner_id()),
            update,
        )
        .await?;
    let row = rows
        .into_iter()
        .next()
        .ok_or_else(|| MeliError::NotFound("Usuario no encontrado".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "message": "Datos de usuario actualizados correctamente",
        "data": row,
    })))
}

pub async fn edit_info_contacto(
    Extension(user): Extension<CurrentUser>,
    Json(patch): Json<ContactPatch>,
) -> MeliResult<Json<Value>> {
    let mut row = patch.to_row()?;
    let owned = Filter::owned_by(Table::InfoContacto, user.owner_id());

    let saved = if user.store.get(Table::InfoContacto, user.owner_id()).await?.is_some() {
        user.store
            .update(Table::InfoContacto, &owned, row)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MeliError::NotFound("Información de contacto no encontrada".to_string()))?
    } else {
        row.insert("auth_user_id".into(), json!(user.owner_id()));
        user.store.insert(Table::InfoContacto, row).await?
    };

    Ok(Json(json!({
        "success": true,
        "message": "Información de contacto actualizada correctamente",
        "data": decode_row::<ContactInfo>(saved)?,
    })))
}

pub async fn edit_ubicaciones(
    Extension(user): Extension<CurrentUser>,
    Json(input): Json<LocationInput>,
) -> MeliResult<Json<Value>> {
    let parsed = parse_location(&input.ubicacion).map_err(MeliError::Validation)?;
    let descripcion = input
        .descripcion
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Ubicación {}: {}", parsed.norma_geo, parsed.nombre));

    let location = Location {
        id: None,
        auth_user_id: user.owner_id().to_string(),
        nombre: Some(parsed.nombre),
        latitud: parsed.latitud,
        longitud: parsed.longitud,
        norma_geo: Some(parsed.norma_geo.to_string()),
        descripcion: Some(descripcion),
    };

    user.store
        .delete(
            Table::Ubicaciones,
            &Filter::owned_by(Table::Ubicaciones, user.owner_id()),
        )
        .await?;
    let saved = user
        .store
        .insert(Table::Ubicaciones, encode_row(&location)?)
        .await?;

    Ok(Json(json!({
        "success": true,
        "message": "Ubicación actualizada exitosamente",
        "data": decode_row::<Location>(saved)?,
    })))
}

pub async fn get_owner_table(
    Extension(user): Extension<CurrentUser>,
    Path(table): Path<String>,
) -> MeliResult<Json<Value>> {
    let table = Table::owner_readable(&table)
        .ok_or_else(|| MeliError::Validation("Tabla no permitida".to_string()))?;
    let rows = user.store.get_all(table, user.owner_id()).await?;
    Ok(Json(json!({
        "success": true,
        "table": table.as_str(),
        "data": rows,
    })))
}

// ---------------------------------------------------------------------------
// Profiles and search
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ProfileView {
    pub auth_user_id: String,
    pub uuid_segment: String,
    pub profile_url: String,
    pub usuario: Option<Owner>,
    pub info_contacto: Option<ContactInfo>,
    pub ubicaciones: Vec<Location>,
    pub lotes: Vec<Lot>,
    pub solicitudes: Vec<BeekeeperRequest>,
}

/// Owner id whose first characters are `segment`.
pub async fn resolve_segment(store: &dyn RecordStore, segment: &str) -> MeliResult<String> {
    if segment.chars().count() != SEGMENT_LEN {
        return Err(MeliError::Validation(
            "El segmento UUID debe tener 8 caracteres".to_string(),
        ));
    }
    let segment = segment.to_lowercase();
    let owners = store.select(Table::Usuarios, &Filter::new()).await?;
    owners
        .iter()
        .filter_map(|row| row.get("auth_user_id").and_then(|v| v.as_str()))
        .find(|id| id.to_lowercase().starts_with(&segment))
        .map(str::to_string)
        .ok_or_else(|| MeliError::NotFound("Usuario no encontrado".to_string()))
}

async fn load_profile(
    store: &dyn RecordStore,
    owner_id: &str,
    base_url: &str,
    public: bool,
) -> MeliResult<ProfileView> {
    let usuario: Option<Owner> = store
        .get(Table::Usuarios, owner_id)
        .await?
        .map(decode_row)
        .transpose()?;
    let mut info_contacto: Option<ContactInfo> = store
        .get(Table::InfoContacto, owner_id)
        .await?
        .map(decode_row)
        .transpose()?;

    if usuario.is_none() && info_contacto.is_none() {
        return Err(MeliError::NotFound("Usuario no encontrado".to_string()));
    }
    if public {
        info_contacto = info_contacto.map(|c| c.public_view());
    }

    let lotes: Vec<Lot> = decode_rows(
        store
            .select(
                Table::OrigenesBotanicos,
                &Filter::owned_by(Table::OrigenesBotanicos, owner_id).order_by("orden_miel", true),
            )
            .await?,
    )?;

    let segment = uuid_segment(owner_id);
    Ok(ProfileView {
        auth_user_id: owner_id.to_string(),
        profile_url: format!("{}/api/usuario/{}", base_url.trim_end_matches('/'), segment),
        uuid_segment: segment,
        usuario,
        info_contacto,
        ubicaciones: decode_rows(store.get_all(Table::Ubicaciones, owner_id).await?)?,
        lotes,
        solicitudes: decode_rows(store.get_all(Table::SolicitudesApicultor, owner_id).await?)?,
    })
}

pub async fn get_usuario_by_segment(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(segment): Path<String>,
) -> MeliResult<Json<Value>> {
    let store = state.store_for(user.as_ref().map(|Extension(u)| u));
    let owner_id = resolve_segment(store.as_ref(), &segment).await?;
    let profile = load_profile(store.as_ref(), &owner_id, &state.config.public_base_url, true).await?;
    Ok(Json(json!({
        "success": true,
        "user_id": owner_id,
        "profile": profile,
    })))
}

pub async fn get_public_profile(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(user_id): Path<String>,
) -> MeliResult<Json<Value>> {
    let store = state.store_for(user.as_ref().map(|Extension(u)| u));
    let owner_id = if user_id.chars().count() == SEGMENT_LEN {
        resolve_segment(store.as_ref(), &user_id).await?
    } else {
        user_id
    };
    let profile = load_profile(store.as_ref(), &owner_id, &state.config.public_base_url, true).await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn get_my_profile(
    State(state): State<AppState>,
    Extension(user): Extension<CurrentUser>,
) -> MeliResult<Json<Value>> {
    let profile = load_profile(
        user.store.as_ref(),
        user.owner_id(),
        &state.config.public_base_url,
        false,
    )
    .await?;
    Ok(Json(json!({ "success": true, "profile": profile })))
}

pub async fn get_current_user(Extension(user): Extension<CurrentUser>) -> MeliResult<Json<Value>> {
    let owner: Option<Owner> = user
        .store
        .get(Table::Usuarios, user.owner_id())
        .await?
        .map(decode_row)
        .transpose()?;
    Ok(Json(json!({
        "success": true,
        "user_id": user.owner_id(),
        "uuid_segment": uuid_segment(user.owner_id()),
        "usuario": owner,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub uuid_segment: String,
    pub username: Option<String>,
    pub nombre_completo: Option<String>,
    pub nombre_empresa: Option<String>,
    pub role: Option<String>,
}

/// Case-insensitive match on username, full name and company; one hit per owner.
pub async fn search_owners(
    store: &dyn RecordStore,
    term: &str,
    limit: usize,
) -> MeliResult<Vec<SearchHit>> {
    let term = term.trim();
    if term.is_empty() {
        return Ok(Vec::new());
    }
    let limit = limit.clamp(1, MAX_SEARCH_LIMIT);

    let mut ids: Vec<String> = Vec::new();
    let lookups = [
        (Table::Usuarios, "username"),
        (Table::InfoContacto, "nombre_completo"),
        (Table::InfoContacto, "nombre_empresa"),
    ];
    for (table, column) in lookups {
        if ids.len() >= limit {
            break;
        }
        let rows = store
            .select(table, &Filter::new().contains(column, term).limit(limit))
            .await?;
        for row in rows {
            if let Some(id) = row.get("auth_user_id").and_then(|v| v.as_str()) {
                if ids.len() < limit && !ids.iter().any(|seen| seen == id) {
                    ids.push(id.to_string());
                }
            }
        }
    }

    let mut hits = Vec::with_capacity(ids.len());
    for id in ids {
        let owner: Option<Owner> = store.get(Table::Usuarios, &id).await?.map(decode_row).transpose()?;
        let contact: Option<ContactInfo> =
            store.get(Table::InfoContacto, &id).await?.map(decode_row).transpose()?;
        hits.push(SearchHit {
            uuid_segment: uuid_segment(&id),
            username: owner.as_ref().and_then(|o| o.username.clone()),
            role: owner.and_then(|o| o.role),
            nombre_completo: contact.as_ref().and_then(|c| c.nombre_completo.clone()),
            nombre_empresa: contact.and_then(|c| c.nombre_empresa),
            id,
        });
    }
    Ok(hits)
}

pub async fn search_axum(
    State(state): State<AppState>,
    user: Option<Extension<CurrentUser>>,
    Query(query): Query<SearchQuery>,
) -> MeliResult<Json<Value>> {
    let store = state.store_for(user.as_ref().map(|Extension(u)| u));
    let limit = query.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let hits = search_owners(store.as_ref(), &query.q, limit).await?;
    Ok(Json(json!({
        "success": true,
        "query": query.q.trim(),
        "total": hits.len(),
        "results": hits,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_segment() {
        assert_eq!(uuid_segment("2F1C9A7E-1111-4000-8000-000000000001"), "2f1c9a7e");
        assert_eq!(uuid_segment("abc"), "abc");
        assert_eq!(uuid_segment("0123456789-x"), "01234567");
    }

    #[test]
    fn test_parse_location_forms() {
        let plus = parse_location("CVV6+HJ7 Pichipehuenco, Lonquimay").unwrap();
        assert_eq!(plus.norma_geo, "PLUS_CODE");
        assert_eq!(plus.latitud, None);

        let coords = parse_location(" -39.8142, -73.2459 ").unwrap();
        assert_eq!(coords.norma_geo, "WGS84");
        assert_eq!(coords.latitud, Some(-39.8142));
        assert_eq!(coords.longitud, Some(-73.2459));

        assert!(parse_location("").is_err());
        assert!(parse_location("Valdivia centro").is_err());
        assert!(parse_location("CV+HJ7").is_err());
        assert!(parse_location("CVV6+H").is_err());
        assert!(parse_location("95.0,10.0").is_err());
    }

    #[test]
    fn test_contact_patch_skips_blank_and_validates() {
        let patch = ContactPatch {
            nombre_completo: Some("  María Pérez ".into()),
            nombre_empresa: Some("   ".into()),
            correo_principal: Some("maria@miel.cl".into()),
            ..Default::default()
        };
        let row = patch.to_row().unwrap();
        assert_eq!(row["nombre_completo"], json!("María Pérez"));
        assert!(!row.contains_key("nombre_empresa"));

        let bad = ContactPatch {
            correo_secundario: Some("no-es-correo".into()),
            ..Default::default()
        };
        assert!(matches!(bad.to_row(), Err(MeliError::Validation(_))));

        assert!(ContactPatch::default().to_row().is_err());
    }
}
