use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Tables of the hosted store this service reads or writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Usuarios,
    InfoContacto,
    Ubicaciones,
    OrigenesBotanicos,
    SolicitudesApicultor,
    IntentosRegistro,
}

impl Table {
    pub fn as_str(&self) -> &'static str {
        match self {
            Table::Usuarios => "usuarios",
            Table::InfoContacto => "info_contacto",
            Table::Ubicaciones => "ubicaciones",
            Table::OrigenesBotanicos => "origenes_botanicos",
            Table::SolicitudesApicultor => "solicitudes_apicultor",
            Table::IntentosRegistro => "intentos_registro",
        }
    }

    /// Column holding the owning identity.
    pub fn owner_column(&self) -> &'static str {
        match self {
            Table::OrigenesBotanicos => "usuario_id",
            Table::IntentosRegistro => "email",
            _ => "auth_user_id",
        }
    }

    /// Tables an owner may read back through the profile data endpoint.
    pub fn owner_readable(name: &str) -> Option<Table> {
        match name {
            "usuarios" => Some(Table::Usuarios),
            "info_contacto" => Some(Table::InfoContacto),
            "ubicaciones" => Some(Table::Ubicaciones),
            "origenes_botanicos" => Some(Table::OrigenesBotanicos),
            "solicitudes_apicultor" => Some(Table::SolicitudesApicultor),
            _ => None,
        }
    }
}

pub const OWNER_ROLES: [&str; 3] = ["apicultor", "proveedor", "prestador de servicios"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Owner {
    pub auth_user_id: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub tipo_usuario: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ContactInfo {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub auth_user_id: String,
    #[serde(default)]
    pub nombre_completo: Option<String>,
    #[serde(default)]
    pub nombre_empresa: Option<String>,
    #[serde(default)]
    pub correo_principal: Option<String>,
    #[serde(default)]
    pub correo_secundario: Option<String>,
    #[serde(default)]
    pub telefono_principal: Option<String>,
    #[serde(default)]
    pub telefono_secundario: Option<String>,
    #[serde(default)]
    pub direccion: Option<String>,
    #[serde(default)]
    pub comuna: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
}

impl ContactInfo {
    /// Copy without the secondary contact channels.
    pub fn public_view(&self) -> ContactInfo {
        ContactInfo {
            correo_secundario: None,
            telefono_secundario: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default, deserialize_with = "de_opt_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub auth_user_id: String,
    #[serde(default)]
    pub nombre: Option<String>,
    #[serde(default)]
    pub latitud: Option<f64>,
    #[serde(default)]
    pub longitud: Option<f64>,
    #[serde(default)]
    pub norma_geo: Option<String>,
    #[serde(default)]
    pub descripcion: Option<String>,
}

/// Honey batch row of `origenes_botanicos`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Lot {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub usuario_id: String,
    pub nombre_miel: String,
    pub temporada: String,
    pub kg_producidos: f64,
    pub orden_miel: i64,
    #[serde(default, deserialize_with = "de_composition")]
    pub composicion_polen: BTreeMap<String, f64>,
    #[serde(deserialize_with = "de_date")]
    pub fecha_registro: NaiveDate,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BeekeeperRequest {
    #[serde(deserialize_with = "de_id")]
    pub id: String,
    pub auth_user_id: String,
    #[serde(default)]
    pub estado: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(flatten)]
    pub detalle: Map<String, Value>,
}

/// Ids may come back as uuid strings or integer keys depending on the table.
fn de_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

fn de_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::String(s) => Ok(Some(s)),
        Value::Number(n) => Ok(Some(n.to_string())),
        other => Err(serde::de::Error::custom(format!("invalid id: {}", other))),
    }
}

fn de_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let day = raw.get(..10).unwrap_or(&raw);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(serde::de::Error::custom)
}

// Older rows carry the composition as a JSON-encoded string.
fn de_composition<'de, D>(deserializer: D) -> Result<BTreeMap<String, f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = match Value::deserialize(deserializer)? {
        Value::String(s) if s.trim().is_empty() => Value::Null,
        Value::String(s) => serde_json::from_str(&s).map_err(serde::de::Error::custom)?,
        other => other,
    };
    let mut out = BTreeMap::new();
    if let Value::Object(map) = value {
        for (species, pct) in map {
            let pct = match &pct {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            };
            if let Some(pct) = pct {
                out.insert(species, pct);
            }
        }
    }
    Ok(out)
}
