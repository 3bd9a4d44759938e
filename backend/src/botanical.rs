use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;

use crate::error::{MeliError, MeliResult};

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BotanicalClass {
    pub name: String,
    pub species: Vec<String>,
}

/// Commune -> plant classes, read once from the botanical CSV.
#[derive(Debug, Clone, Default)]
pub struct BotanicalChart {
    communes: BTreeMap<String, Vec<BotanicalClass>>,
}

impl BotanicalChart {
    /// Parses the `;`-separated Latin-1 table with `Comuna`, `Clase` and
    /// `Nombre Comun` columns. Rows missing any of the three are skipped.
    pub fn from_reader<R: Read>(mut reader: R) -> MeliResult<Self> {
        let mut raw = Vec::new();
        reader.read_to_end(&mut raw)?;
        let text: String = raw.iter().map(|&b| b as char).collect();

        let mut csv_reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let headers = csv_reader.headers()?.clone();
        let column = |name: &str| {
            headers
                .iter()
                .position(|h| h == name)
                .ok_or_else(|| MeliError::Internal(format!("Columna {} ausente en el CSV", name)))
        };
        let (comuna_idx, clase_idx, especie_idx) =
            (column("Comuna")?, column("Clase")?, column("Nombre Comun")?);

        let mut chart = Self::default();
        for record in csv_reader.records() {
            let record = record?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or_default();
            chart.add(field(comuna_idx), field(clase_idx), field(especie_idx));
        }
        Ok(chart)
    }

    /// A missing file yields an empty chart so the service still starts.
    pub fn load(path: &Path) -> MeliResult<Self> {
        match std::fs::File::open(path) {
            Ok(file) => {
                let chart = Self::from_reader(file)?;
                tracing::info!(
                    "Botanical chart loaded from {}: {} communes",
                    path.display(),
                    chart.communes.len()
                );
                Ok(chart)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("Botanical chart not found at {}; lookups will miss", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn from_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str, &'a str)>) -> Self {
        let mut chart = Self::default();
        for (comuna, clase, especie) in entries {
            chart.add(comuna, clase, especie);
        }
        chart
    }

    fn add(&mut self, comuna: &str, clase: &str, especie: &str) {
        if comuna.is_empty() || clase.is_empty() || especie.is_empty() {
            return;
        }
        let classes = self.communes.entry(comuna.to_string()).or_default();
        let idx = match classes.iter().position(|c| c.name == clase) {
            Some(idx) => idx,
            None => {
                classes.push(BotanicalClass {
                    name: clase.to_string(),
                    species: Vec::new(),
                });
                classes.len() - 1
            }
        };
        let species = &mut classes[idx].species;
        if !species.iter().any(|s| s == especie) {
            species.push(especie.to_string());
        }
    }

    pub fn is_empty(&self) -> bool {
        self.communes.is_empty()
    }

    /// Sorted commune names.
    pub fn communes(&self) -> Vec<String> {
        self.communes.keys().cloned().collect()
    }

    pub fn classes(&self, comuna: &str) -> Option<&[BotanicalClass]> {
        self.communes.get(comuna.trim()).map(Vec::as_slice)
    }

    /// Every species of the commune across classes, first-seen order, no repeats.
    pub fn species_for(&self, comuna: &str) -> MeliResult<Vec<String>> {
        let comuna = comuna.trim();
        let classes = self
            .classes(comuna)
            .ok_or_else(|| MeliError::CommuneNotRegistered {
                comuna: comuna.to_string(),
                available: self.communes(),
            })?;

        let mut out: Vec<String> = Vec::new();
        for species in classes.iter().flat_map(|c| c.species.iter()) {
            if !out.contains(species) {
                out.push(species.clone());
            }
        }
        Ok(out)
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ClassDescriptor {
    pub titulo: String,
    pub icono: &'static str,
    pub color: &'static str,
    pub descripcion: &'static str,
    pub categoria: &'static str,
    pub altura: &'static str,
}

/// Presentation metadata for a plant class.
pub fn describe_class(clase: &str) -> ClassDescriptor {
    let (titulo, icono, color, descripcion, categoria, altura) = match clase {
        "Arbol" => ("Árboles", "🌳", "#22c55e", "Plantas leñosas perennes de gran tamaño", "Leñosa", "Mayor a 5 metros"),
        "Arbol/Arbusto" => ("Árboles/Arbustos", "🌲", "#16a34a", "Plantas leñosas de tamaño variable", "Leñosa Mixta", "2-5 metros"),
        "Arbusto" => ("Arbustos", "🌿", "#84cc16", "Plantas leñosas de tamaño mediano", "Leñosa", "1-2 metros"),
        "Hierba" => ("Hierbas", "🌱", "#65a30d", "Plantas herbáceas sin estructura leñosa", "Herbácea", "Menor a 1 metro"),
        "Arbusto/Hierba" => ("Arbustos/Hierbas", "🌾", "#a3a3a3", "Plantas con características mixtas", "Mixta", "Variable"),
        "Arbol/Hierba" => ("Árboles/Hierbas", "🌴", "#10b981", "Combinación de características arbóreas y herbáceas", "Mixta", "Variable"),
        other => {
            return ClassDescriptor {
                titulo: other.to_string(),
                icono: "🌿",
                color: "#6b7280",
                descripcion: "Clase botánica",
                categoria: "Otra",
                altura: "Variable",
            }
        }
    };
    ClassDescriptor {
        titulo: titulo.to_string(),
        icono,
        color,
        descripcion,
        categoria,
        altura,
    }
}
