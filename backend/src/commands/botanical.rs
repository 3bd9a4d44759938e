use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::botanical::{describe_class, BotanicalChart, ClassDescriptor};
use crate::error::{MeliError, MeliResult};

#[derive(Debug, Serialize)]
pub struct ClassView {
    pub clase: String,
    #[serde(flatten)]
    pub descriptor: ClassDescriptor,
    pub especies: Vec<String>,
    pub cantidad: usize,
}

pub fn classes_for(chart: &BotanicalChart, comuna: &str) -> MeliResult<Vec<ClassView>> {
    let comuna = comuna.trim();
    let classes = chart
        .classes(comuna)
        .ok_or_else(|| MeliError::CommuneNotRegistered {
            comuna: comuna.to_string(),
            available: chart.communes(),
        })?;

    Ok(classes
        .iter()
        .map(|class| ClassView {
            clase: class.name.clone(),
            descriptor: describe_class(&class.name),
            cantidad: class.species.len(),
            especies: class.species.clone(),
        })
        .collect())
}

pub async fn list_communes_axum(State(chart): State<Arc<BotanicalChart>>) -> Json<Value> {
    let communes = chart.communes();
    Json(json!({
        "success": true,
        "total": communes.len(),
        "communes": communes,
    }))
}

pub async fn commune_classes_axum(
    State(chart): State<Arc<BotanicalChart>>,
    Path(comuna): Path<String>,
) -> MeliResult<Json<Value>> {
    let classes = classes_for(&chart, &comuna)?;
    Ok(Json(json!({
        "success": true,
        "comuna": comuna.trim(),
        "total_classes": classes.len(),
        "classes": classes,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classes_carry_descriptor_and_counts() {
        let chart = BotanicalChart::from_entries([
            ("Lonquimay", "Arbol", "Ñirre"),
            ("Lonquimay", "Arbol", "Lenga"),
            ("Lonquimay", "Trepadora", "Voqui"),
        ]);

        let classes = classes_for(&chart, " Lonquimay ").unwrap();
        assert_eq!(classes.len(), 2);
        assert_eq!(classes[0].clase, "Arbol");
        assert_eq!(classes[0].descriptor.titulo, "Árboles");
        assert_eq!(classes[0].cantidad, 2);
        assert_eq!(classes[1].descriptor.categoria, "Otra");

        let view = serde_json::to_value(&classes[0]).unwrap();
        assert_eq!(view["icono"], json!("🌳"));
        assert_eq!(view["especies"], json!(["Ñirre", "Lenga"]));
    }

    #[test]
    fn test_missing_commune() {
        let chart = BotanicalChart::from_entries([("Lonquimay", "Arbol", "Ñirre")]);
        match classes_for(&chart, "Temuco") {
            Err(MeliError::CommuneNotRegistered { comuna, available }) => {
                assert_eq!(comuna, "Temuco");
                assert_eq!(available, vec!["Lonquimay"]);
            }
            other => panic!("unexpected {:?}", other.map(|c| c.len())),
        }
    }
}
