use axum::{
    extract::{rejection::JsonRejection, Path, State as AxumState},
    Extension, Json,
};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::botanical::BotanicalChart;
use crate::db::{Lot, Table};
use crate::error::{MeliError, MeliResult};
use crate::middleware::auth::CurrentUser;
use crate::state::AppState;
use crate::store::{decode_row, decode_rows, Filter, RecordStore, Row, StoreError};
use crate::validation::{
    parse_number, validate_composition, validate_length, validate_positive_integer,
};

pub const MAX_ORDER: i64 = 9999;
pub const MAX_KG: f64 = 1_000_000.0;
const SEASON_NAMES: [&str; 5] = ["VERANO", "OTONO", "OTOÑO", "INVIERNO", "PRIMAVERA"];
const SEASON_CODES: [&str; 4] = ["1", "2", "3", "4"];
// Temporary order numbers used while reordering stay above MAX_ORDER.
const REORDER_OFFSET: i64 = 10_000;
// Restoring after a failed reorder uses its own range, clear of both.
const RESTORE_OFFSET: i64 = 2 * REORDER_OFFSET;

/// Lot fields as sent by the client. Everything is optional so the same
/// shape serves creation (where the required fields are checked) and
/// partial updates (where missing fields keep their stored value).
/// Values stay untyped until validation so a wrong type is reported like
/// any other invalid field.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LotFields {
    pub nombre_miel: Option<Value>,
    pub temporada: Option<Value>,
    pub anio: Option<Value>,
    pub kg_producidos: Option<Value>,
    pub orden_miel: Option<Value>,
    pub composicion_polen: Option<Value>,
    pub fecha_registro: Option<Value>,
}

/// Fully validated lot values ready to be written.
#[derive(Debug, Clone, PartialEq)]
struct ValidLot {
    nombre_miel: String,
    temporada: String,
    kg_producidos: f64,
    orden_miel: i64,
    composicion_polen: BTreeMap<String, f64>,
    /// Only read on creation.
    fecha_registro: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeletedLot {
    pub id: String,
    pub orden_eliminado: i64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct RegionSpecies {
    pub usuario_id: String,
    pub comuna: String,
    pub especies: Vec<String>,
    pub total_especies: usize,
}

fn present(value: &Option<Value>) -> Option<&Value> {
    value.as_ref().filter(|v| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    })
}

fn season_token(raw: &Value) -> Option<String> {
    let token = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_uppercase(),
        _ => return None,
    };
    (SEASON_CODES.contains(&token.as_str()) || SEASON_NAMES.contains(&token.as_str()))
        .then_some(token)
}

fn parse_year(raw: &Value) -> Result<i64, String> {
    let invalid = || "Debe seleccionar un año válido".to_string();
    let text = match raw {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return Err(invalid()),
    };
    if text.len() != 4 || !text.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid());
    }
    let year: i64 = text.parse().map_err(|_| invalid())?;
    if !(1900..=2100).contains(&year) {
        return Err(invalid());
    }
    Ok(year)
}

/// Stored season label: `<season>-<year>` when a year is given, else the
/// bare season. A previously stored label is accepted unchanged.
pub fn season_label(temporada: &Value, anio: Option<&Value>) -> Result<String, String> {
    let invalid = || "Debe seleccionar una temporada válida".to_string();
    if let Some(anio) = anio {
        let token = season_token(temporada).ok_or_else(invalid)?;
        let year = parse_year(anio)?;
        return Ok(format!("{}-{}", token, year));
    }
    if let Some(token) = season_token(temporada) {
        return Ok(token);
    }
    let label = temporada.as_str().map(|s| s.trim().to_uppercase()).ok_or_else(invalid)?;
    let (token, year) = label.rsplit_once('-').ok_or_else(invalid)?;
    season_token(&Value::String(token.to_string())).ok_or_else(invalid)?;
    parse_year(&Value::String(year.to_string()))?;
    Ok(label)
}

/// Accepts `YYYY-MM-DD` or a timestamp starting with one.
fn parse_registration_date(raw: &Value) -> Result<NaiveDate, String> {
    let invalid = || "La fecha de registro debe tener formato AAAA-MM-DD".to_string();
    let text = raw.as_str().map(str::trim).ok_or_else(invalid)?;
    let day = text.get(..10).ok_or_else(invalid)?;
    if text.len() > 10 && !text[10..].starts_with(['T', ' ']) {
        return Err(invalid());
    }
    NaiveDate::parse_from_str(day, "%Y-%m-%d").map_err(|_| invalid())
}

fn conflict_order(orden: i64) -> MeliError {
    MeliError::Conflict(format!("Ya existe un lote con el orden #{}", orden))
}

/// Maps a unique violation raised by the store to the constraint it hit.
fn unique_conflict(err: StoreError, lot: &ValidLot) -> MeliError {
    match err {
        StoreError::UniqueViolation(msg) if msg.contains("orden_miel") => {
            conflict_order(lot.orden_miel)
        }
        StoreError::UniqueViolation(msg) => {
            tracing::warn!("Lot write rejected by unique constraint: {}", msg);
            MeliError::Conflict(
                "Ya existe un lote con los mismos datos para este apicultor".to_string(),
            )
        }
        other => other.into(),
    }
}

fn lot_payload(lot: &ValidLot) -> Row {
    let mut row = Map::new();
    row.insert("nombre_miel".into(), json!(lot.nombre_miel));
    row.insert("temporada".into(), json!(lot.temporada));
    row.insert("kg_producidos".into(), json!(lot.kg_producidos));
    row.insert("orden_miel".into(), json!(lot.orden_miel));
    row.insert("composicion_polen".into(), json!(lot.composicion_polen));
    row
}

pub struct LotManager {
    store: Arc<dyn RecordStore>,
}

impl LotManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Validates every field up front and reports all failures at once.
    fn validate(fields: &LotFields, existing: Option<&Lot>) -> MeliResult<ValidLot> {
        let nombre_miel = match (fields.nombre_miel.as_ref().filter(|v| !v.is_null()), existing) {
            (Some(Value::String(name)), _) => validate_length("El nombre de la miel", name, 2, 120),
            (Some(_), _) => Err("El nombre de la miel debe ser texto".to_string()),
            (None, Some(lot)) => Ok(lot.nombre_miel.clone()),
            (None, None) => Err("El nombre de la miel debe tener al menos 2 caracteres".into()),
        };

        let temporada = match (present(&fields.temporada), existing) {
            (Some(raw), _) => season_label(raw, present(&fields.anio)),
            (None, Some(lot)) => Ok(lot.temporada.clone()),
            (None, None) => Err("Debe seleccionar una temporada válida".into()),
        };

        let kg_producidos = match (present(&fields.kg_producidos), existing) {
            (Some(raw), _) => match parse_number(raw) {
                None => Err("Los kilos producidos deben ser un número válido".to_string()),
                Some(kg) if kg < 0.0 => {
                    Err("Los kilos producidos deben ser mayores o iguales a 0".to_string())
                }
                Some(kg) if kg > MAX_KG => Err(format!(
                    "Los kilos producidos no pueden exceder {}",
                    MAX_KG
                )),
                Some(kg) => Ok(kg),
            },
            (None, Some(lot)) => Ok(lot.kg_producidos),
            (None, None) => Err("Los kilos producidos deben ser un número válido".into()),
        };

        let orden_miel = match (present(&fields.orden_miel), existing) {
            (Some(raw), _) => validate_positive_integer("El orden del lote", raw, MAX_ORDER),
            (None, Some(lot)) => Ok(lot.orden_miel),
            (None, None) => Err("Debe indicar el orden del lote".into()),
        };

        let composicion_polen = match (&fields.composicion_polen, existing) {
            (Some(raw), _) => validate_composition(raw),
            (None, Some(lot)) => Ok(lot.composicion_polen.clone()),
            (None, None) => Ok(BTreeMap::new()),
        };

        // Updates never touch the registration date.
        let fecha_registro = match (present(&fields.fecha_registro), existing) {
            (Some(raw), None) => parse_registration_date(raw).map(Some),
            _ => Ok(None),
        };

        let errors: Vec<String> = [
            nombre_miel.as_ref().err(),
            temporada.as_ref().err(),
            kg_producidos.as_ref().err(),
            orden_miel.as_ref().err(),
            composicion_polen.as_ref().err(),
            fecha_registro.as_ref().err(),
        ]
        .into_iter()
        .flatten()
        .cloned()
        .collect();

        match (nombre_miel, temporada, kg_producidos, orden_miel, composicion_polen, fecha_registro) {
            (
                Ok(nombre_miel),
                Ok(temporada),
                Ok(kg_producidos),
                Ok(orden_miel),
                Ok(composicion_polen),
                Ok(fecha_registro),
            ) => Ok(ValidLot {
                nombre_miel,
                temporada,
                kg_producidos,
                orden_miel,
                composicion_polen,
                fecha_registro,
            }),
            _ => Err(MeliError::Validation(errors.join("; "))),
        }
    }

    pub async fn list_lots(&self, owner_id: &str) -> MeliResult<Vec<Lot>> {
        let rows = self
            .store
            .select(
                Table::OrigenesBotanicos,
                &Filter::owned_by(Table::OrigenesBotanicos, owner_id).order_by("orden_miel", true),
            )
            .await?;
        Ok(decode_rows(rows)?)
    }

    async fn find_owned(&self, lot_id: &str, owner_id: &str) -> MeliResult<Lot> {
        let rows = self
            .store
            .select(
                Table::OrigenesBotanicos,
                &Filter::owned_by(Table::OrigenesBotanicos, owner_id)
                    .eq("id", lot_id)
                    .limit(1),
            )
            .await?;
        match rows.into_iter().next() {
            Some(row) => Ok(decode_row(row)?),
            None => Err(MeliError::NotFound("Lote no encontrado".to_string())),
        }
    }

    pub async fn create_lot(&self, owner_id: &str, fields: LotFields) -> MeliResult<Lot> {
        let lot = Self::validate(&fields, None)?;
        let owned = Filter::owned_by(Table::OrigenesBotanicos, owner_id);

        let same_order = self
            .store
            .select(
                Table::OrigenesBotanicos,
                &owned.clone().eq("orden_miel", lot.orden_miel).limit(1),
            )
            .await?;
        if !same_order.is_empty() {
            return Err(conflict_order(lot.orden_miel));
        }

        let same_name = self
            .store
            .select(
                Table::OrigenesBotanicos,
                &owned
                    .eq("nombre_miel", lot.nombre_miel.as_str())
                    .eq("temporada", lot.temporada.as_str())
                    .limit(1),
            )
            .await?;
        if !same_name.is_empty() {
            return Err(MeliError::Conflict(format!(
                "Ya existe un lote \"{}\" para la temporada {}",
                lot.nombre_miel, lot.temporada
            )));
        }

        let fecha_registro = lot
            .fecha_registro
            .unwrap_or_else(|| Utc::now().date_naive());
        let mut payload = lot_payload(&lot);
        payload.insert("usuario_id".into(), json!(owner_id));
        payload.insert("fecha_registro".into(), json!(fecha_registro.to_string()));

        let row = self
            .store
            .insert(Table::OrigenesBotanicos, payload)
            .await
            .map_err(|e| unique_conflict(e, &lot))?;

        tracing::info!(
            "Lot '{}' created for {} with order #{}",
            lot.nombre_miel,
            owner_id,
            lot.orden_miel
        );
        Ok(decode_row(row)?)
    }

    /// Rewrites every field except `fecha_registro`.
    pub async fn update_lot(
        &self,
        lot_id: &str,
        owner_id: &str,
        fields: LotFields,
    ) -> MeliResult<Lot> {
        let current = self.find_owned(lot_id, owner_id).await?;
        let lot = Self::validate(&fields, Some(&current))?;

        if lot.orden_miel != current.orden_miel {
            let taken = self
                .store
                .select(
                    Table::OrigenesBotanicos,
                    &Filter::owned_by(Table::OrigenesBotanicos, owner_id)
                        .eq("orden_miel", lot.orden_miel)
                        .neq("id", current.id.as_str())
                        .limit(1),
                )
                .await?;
            if !taken.is_empty() {
                return Err(conflict_order(lot.orden_miel));
            }
        }

        let mut payload = lot_payload(&lot);
        payload.insert("updated_at".into(), json!(Utc::now()));

        let rows = self
            .store
            .update(
                Table::OrigenesBotanicos,
                &Filter::owned_by(Table::OrigenesBotanicos, owner_id).eq("id", current.id.as_str()),
                payload,
            )
            .await
            .map_err(|e| unique_conflict(e, &lot))?;

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| MeliError::NotFound("Lote no encontrado".to_string()))?;
        Ok(decode_row(row)?)
    }

    /// Order numbers of the remaining lots are left untouched.
    pub async fn delete_lot(&self, lot_id: &str, owner_id: &str) -> MeliResult<DeletedLot> {
        let current = self.find_owned(lot_id, owner_id).await?;
        let removed = self
            .store
            .delete(
                Table::OrigenesBotanicos,
                &Filter::owned_by(Table::OrigenesBotanicos, owner_id).eq("id", current.id.as_str()),
            )
            .await?;
        if removed.is_empty() {
            return Err(MeliError::NotFound("Lote no encontrado".to_string()));
        }
        tracing::info!("Lot {} of {} deleted (order #{})", current.id, owner_id, current.orden_miel);
        Ok(DeletedLot {
            id: current.id,
            orden_eliminado: current.orden_miel,
        })
    }

    /// Assigns orders 1..n following `lot_ids`, which must name exactly the
    /// owner's lots.
    pub async fn reorder_lots(&self, owner_id: &str, lot_ids: &[String]) -> MeliResult<Vec<Lot>> {
        let lots = self.list_lots(owner_id).await?;
        let owned: HashSet<&str> = lots.iter().map(|l| l.id.as_str()).collect();
        let requested: HashSet<&str> = lot_ids.iter().map(String::as_str).collect();
        if lot_ids.len() != lots.len() || requested.len() != lot_ids.len() || owned != requested {
            return Err(MeliError::Validation(
                "La lista de lotes no coincide con los lotes del usuario".to_string(),
            ));
        }

        let target: Vec<(&str, i64)> = lot_ids
            .iter()
            .enumerate()
            .map(|(idx, id)| (id.as_str(), idx as i64 + 1))
            .collect();
        if let Err(e) = self.write_orders(owner_id, &target, REORDER_OFFSET).await {
            tracing::error!("Reorder for {} failed, restoring previous orders: {}", owner_id, e);
            let original: Vec<(&str, i64)> =
                lots.iter().map(|l| (l.id.as_str(), l.orden_miel)).collect();
            if let Err(restore) = self.write_orders(owner_id, &original, RESTORE_OFFSET).await {
                tracing::error!("Failed to restore lot orders for {}: {}", owner_id, restore);
            }
            return Err(e);
        }

        self.list_lots(owner_id).await
    }

    /// Moves every lot to a temporary order above MAX_ORDER, then to its
    /// final order, so no step collides with the per-owner unique key.
    async fn write_orders(
        &self,
        owner_id: &str,
        orders: &[(&str, i64)],
        offset: i64,
    ) -> MeliResult<()> {
        for phase_offset in [offset, 0] {
            for (lot_id, orden) in orders {
                let mut payload = Map::new();
                payload.insert("orden_miel".into(), json!(phase_offset + orden));
                self.store
                    .update(
                        Table::OrigenesBotanicos,
                        &Filter::owned_by(Table::OrigenesBotanicos, owner_id).eq("id", *lot_id),
                        payload,
                    )
                    .await?;
            }
        }
        Ok(())
    }

    pub async fn species_for_owner_region(
        &self,
        owner_id: &str,
        chart: &BotanicalChart,
    ) -> MeliResult<RegionSpecies> {
        let contact = self.store.get(Table::InfoContacto, owner_id).await?;
        let comuna = contact
            .as_ref()
            .and_then(|row| row.get("comuna"))
            .and_then(|v| v.as_str())
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| MeliError::NotFound("Usuario no tiene comuna registrada".to_string()))?
            .to_string();

        let especies = chart.species_for(&comuna)?;
        Ok(RegionSpecies {
            usuario_id: owner_id.to_string(),
            total_especies: especies.len(),
            comuna,
            especies,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ReorderInput {
    pub orden: Vec<String>,
}

pub async fn create_lot_axum(
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<LotFields>, JsonRejection>,
) -> MeliResult<Json<Value>> {
    let Json(fields) = body?;
    let lot = LotManager::new(user.store.clone())
        .create_lot(user.owner_id(), fields)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": format!("Lote creado exitosamente con orden #{}", lot.orden_miel),
        "lote": lot,
    })))
}

pub async fn update_lot_axum(
    Extension(user): Extension<CurrentUser>,
    Path(lote_id): Path<String>,
    body: Result<Json<LotFields>, JsonRejection>,
) -> MeliResult<Json<Value>> {
    let Json(fields) = body?;
    let lot = LotManager::new(user.store.clone())
        .update_lot(&lote_id, user.owner_id(), fields)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Lote actualizado exitosamente",
        "lote": lot,
    })))
}

pub async fn delete_lot_axum(
    Extension(user): Extension<CurrentUser>,
    Path(lote_id): Path<String>,
) -> MeliResult<Json<Value>> {
    let deleted = LotManager::new(user.store.clone())
        .delete_lot(&lote_id, user.owner_id())
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Lote eliminado exitosamente",
        "id": deleted.id,
        "orden_eliminado": deleted.orden_eliminado,
    })))
}

pub async fn reorder_lots_axum(
    Extension(user): Extension<CurrentUser>,
    body: Result<Json<ReorderInput>, JsonRejection>,
) -> MeliResult<Json<Value>> {
    let Json(input) = body?;
    let lots = LotManager::new(user.store.clone())
        .reorder_lots(user.owner_id(), &input.orden)
        .await?;
    Ok(Json(json!({
        "success": true,
        "message": "Lotes reordenados exitosamente",
        "lotes": lots,
    })))
}

pub async fn list_lots_axum(
    AxumState(state): AxumState<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(owner_id): Path<String>,
) -> MeliResult<Json<Value>> {
    let store = state.store_for(user.as_ref().map(|Extension(u)| u));
    let lots = LotManager::new(store).list_lots(&owner_id).await?;
    Ok(Json(json!({
        "success": true,
        "total": lots.len(),
        "lotes": lots,
    })))
}

pub async fn species_for_owner_axum(
    AxumState(state): AxumState<AppState>,
    user: Option<Extension<CurrentUser>>,
    Path(owner_id): Path<String>,
) -> MeliResult<Json<Value>> {
    let store = state.store_for(user.as_ref().map(|Extension(u)| u));
    let species = LotManager::new(store)
        .species_for_owner_region(&owner_id, &state.botanical)
        .await?;
    let message = format!("Especies disponibles para {}", species.comuna);
    let mut body = serde_json::to_value(&species)?;
    if let Value::Object(map) = &mut body {
        map.insert("success".into(), json!(true));
        map.insert("message".into(), json!(message));
    }
    Ok(Json(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_season_label_forms() {
        assert_eq!(season_label(&json!("verano"), None).unwrap(), "VERANO");
        assert_eq!(season_label(&json!(2), Some(&json!("2024"))).unwrap(), "2-2024");
        assert_eq!(season_label(&json!("Otoño"), Some(&json!(2023))).unwrap(), "OTOÑO-2023");
        assert_eq!(season_label(&json!("PRIMAVERA-2022"), None).unwrap(), "PRIMAVERA-2022");
        assert!(season_label(&json!("5"), None).is_err());
        assert!(season_label(&json!("VERANO"), Some(&json!("24"))).is_err());
        assert!(season_label(&json!("VERANO"), Some(&json!(1850))).is_err());
        assert!(season_label(&json!("LLUVIA-2022"), None).is_err());
    }

    #[test]
    fn test_validate_reports_every_failure() {
        let fields = LotFields {
            nombre_miel: Some(" U ".into()),
            temporada: Some(json!("9")),
            kg_producidos: Some(json!(-3)),
            orden_miel: Some(json!(0)),
            composicion_polen: Some(json!({ "Ulmo": 80, "Tiaca": 30 })),
            ..Default::default()
        };
        let err = LotManager::validate(&fields, None).unwrap_err().to_string();
        assert!(err.contains("nombre de la miel"));
        assert!(err.contains("temporada"));
        assert!(err.contains("mayores o iguales a 0"));
        assert!(err.contains("orden"));
        assert!(err.contains("100%"));
    }

    #[test]
    fn test_validate_merges_onto_existing() {
        let existing = Lot {
            id: "l1".into(),
            usuario_id: "a".into(),
            nombre_miel: "Miel de Ulmo".into(),
            temporada: "VERANO".into(),
            kg_producidos: 120.0,
            orden_miel: 1,
            composicion_polen: BTreeMap::new(),
            fecha_registro: NaiveDate::from_ymd_opt(2024, 1, 10).unwrap(),
            updated_at: None,
        };
        let fields = LotFields {
            kg_producidos: Some(json!(150)),
            ..Default::default()
        };
        let merged = LotManager::validate(&fields, Some(&existing)).unwrap();
        assert_eq!(merged.kg_producidos, 150.0);
        assert_eq!(merged.orden_miel, 1);
        assert_eq!(merged.temporada, "VERANO");
        assert_eq!(merged.fecha_registro, None);
    }

    #[test]
    fn test_wrong_field_types_are_validation_errors() {
        let fields = LotFields {
            nombre_miel: Some(json!(123)),
            temporada: Some(json!("VERANO")),
            kg_producidos: Some(json!(10)),
            orden_miel: Some(json!(1)),
            fecha_registro: Some(json!("ayer")),
            ..Default::default()
        };
        let err = LotManager::validate(&fields, None).unwrap_err();
        assert!(matches!(err, MeliError::Validation(_)));
        let msg = err.to_string();
        assert!(msg.contains("El nombre de la miel debe ser texto"), "{}", msg);
        assert!(msg.contains("AAAA-MM-DD"), "{}", msg);
    }

    #[test]
    fn test_registration_date_forms() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_registration_date(&json!("2024-01-15")), Ok(day));
        assert_eq!(parse_registration_date(&json!("2024-01-15T10:30:00Z")), Ok(day));
        assert!(parse_registration_date(&json!("2024-13-01")).is_err());
        assert!(parse_registration_date(&json!("2024-01-15abc")).is_err());
        assert!(parse_registration_date(&json!(20240115)).is_err());
    }

    #[test]
    fn test_unique_violation_names_the_constraint() {
        let lot = LotManager::validate(
            &LotFields {
                nombre_miel: Some(json!("Miel de Ulmo")),
                temporada: Some(json!("VERANO")),
                kg_producidos: Some(json!(10)),
                orden_miel: Some(json!(4)),
                ..Default::default()
            },
            None,
        )
        .unwrap();

        let order = unique_conflict(
            StoreError::UniqueViolation(
                "duplicate key value violates unique constraint \"origenes_botanicos_usuario_id_orden_miel_key\"".into(),
            ),
            &lot,
        );
        assert_eq!(order.to_string(), "Ya existe un lote con el orden #4");

        let other = unique_conflict(
            StoreError::UniqueViolation(
                "duplicate key value violates unique constraint \"origenes_nombre_temporada_key\"".into(),
            ),
            &lot,
        );
        assert!(matches!(other, MeliError::Conflict(_)));
        assert!(!other.to_string().contains("orden"));
    }
}
