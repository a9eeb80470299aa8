//! Budget category taxonomy
//!
//! Twelve fixed main categories, each with an ordered list of subcategory
//! names. The built-in default is the starting plan every user gets; callers
//! with customized categories build their own copy with [`Taxonomy::with_subcategory`].
//!
//! Order matters: [`Taxonomy::flatten`] yields subcategories in category order
//! then subcategory order, and deterministic matching takes the first hit.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Category used when the model proposes a main category we don't know
pub const FALLBACK_CATEGORY: MainCategory = MainCategory::GastosPersonales;

/// Subcategory paired with [`FALLBACK_CATEGORY`]
pub const FALLBACK_SUBCATEGORY: &str = "Otros gastos personales";

/// Top-level budget grouping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MainCategory {
    #[serde(rename = "VIVIENDA")]
    Vivienda,
    #[serde(rename = "ALIMENTACIÓN")]
    Alimentacion,
    #[serde(rename = "IMPUESTOS Y DONACIONES")]
    ImpuestosYDonaciones,
    #[serde(rename = "TRANSPORTE")]
    Transporte,
    #[serde(rename = "SEGUROS")]
    Seguros,
    #[serde(rename = "AHORROS")]
    Ahorros,
    #[serde(rename = "SALUD")]
    Salud,
    #[serde(rename = "SERVICIOS")]
    Servicios,
    #[serde(rename = "RECREACIÓN")]
    Recreacion,
    #[serde(rename = "VESTIMENTA")]
    Vestimenta,
    #[serde(rename = "DEUDAS")]
    Deudas,
    #[serde(rename = "GASTOS PERSONALES")]
    GastosPersonales,
}

impl MainCategory {
    /// Label as it appears in prompts, model output and stored expenses
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vivienda => "VIVIENDA",
            Self::Alimentacion => "ALIMENTACIÓN",
            Self::ImpuestosYDonaciones => "IMPUESTOS Y DONACIONES",
            Self::Transporte => "TRANSPORTE",
            Self::Seguros => "SEGUROS",
            Self::Ahorros => "AHORROS",
            Self::Salud => "SALUD",
            Self::Servicios => "SERVICIOS",
            Self::Recreacion => "RECREACIÓN",
            Self::Vestimenta => "VESTIMENTA",
            Self::Deudas => "DEUDAS",
            Self::GastosPersonales => "GASTOS PERSONALES",
        }
    }

    /// All main categories in taxonomy order
    pub fn all() -> &'static [MainCategory] {
        &[
            Self::Vivienda,
            Self::Alimentacion,
            Self::ImpuestosYDonaciones,
            Self::Transporte,
            Self::Seguros,
            Self::Ahorros,
            Self::Salud,
            Self::Servicios,
            Self::Recreacion,
            Self::Vestimenta,
            Self::Deudas,
            Self::GastosPersonales,
        ]
    }

    /// Exact label lookup. Model output is not case-folded here: a label
    /// that doesn't match exactly is treated as unknown.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::all().iter().copied().find(|c| c.as_str() == label)
    }

    fn default_subcategories(&self) -> &'static [&'static str] {
        match self {
            Self::Vivienda => &[
                "Renta",
                "Hipoteca",
                "Impuestos a la vivienda",
                "Reparaciones / mantenimiento",
                "Otros costos de vivienda",
            ],
            Self::Alimentacion => &["Despensa", "Restaurantes"],
            Self::ImpuestosYDonaciones => {
                &["Impuesto sobre la renta", "Otros impuestos", "Donaciones"]
            }
            Self::Transporte => &[
                "Gasolina y fluidos",
                "Reparaciones y llantas",
                "Licencia e impuestos",
                "Estacionamiento y casetas",
                "Vuelos",
                "Renta de vehículos",
                "Transporte público",
            ],
            Self::Seguros => &[
                "Vida",
                "Gastos médicos",
                "Hogar",
                "Discapacidad",
                "Robo",
                "Cuidado en la vejez",
                "Otros seguros",
            ],
            Self::Ahorros => &[
                "Fondo de emergencias",
                "Fondo para el retiro",
                "Fondo para la educación",
                "Otro ahorro 1",
                "Otro ahorro 2",
                "Otro ahorro 3",
            ],
            Self::Salud => &[
                "Medicamentos",
                "Doctores",
                "Dentistas",
                "Oculistas",
                "Suministros médicos",
                "Vitaminas",
                "Otros gastos de salud",
            ],
            Self::Servicios => &[
                "Electricidad",
                "Gas",
                "Agua",
                "Recolección de residuos",
                "Celular",
                "Internet",
                "Televisión por cable",
                "Seguridad",
            ],
            Self::Recreacion => &[
                "Suscripciones de video",
                "Suscripciones de audio",
                "Entradas a eventos",
                "Entradas a atracciones",
                "Paquetes de viajes",
                "Hospedaje",
            ],
            Self::Vestimenta => &[
                "Ropa adultos",
                "Ropa niños",
                "Zapatos adultos",
                "Zapatos niños",
                "Cuidado y limpieza",
            ],
            Self::Deudas => &[
                "Créditos automotrices",
                "Créditos personales",
                "Tarjetas de crédito",
                "Anualidades de tarjetas de crédito",
                "Comisiones",
                "Otras deudas",
            ],
            Self::GastosPersonales => &[
                "Cuidado de niños",
                "Artículos de aseo personal",
                "Cosméticos y aseo de cabello",
                "Colegiaturas / educación",
                "Libros y útiles",
                "Pensión alimenticia",
                "Manutención de hijos",
                "Costos de organización",
                "Regalos",
                "Reemplazo de muebles",
                "Suministros para mascotas",
                "Artículos de tecnología",
                "Otros gastos personales",
            ],
        }
    }
}

impl fmt::Display for MainCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MainCategory {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_label(s).ok_or_else(|| format!("Unknown main category: {}", s))
    }
}

/// A main category with its subcategory names
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryGroup {
    pub category: MainCategory,
    pub subcategories: Vec<String>,
}

/// Ordered category -> subcategories mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Taxonomy {
    groups: Vec<CategoryGroup>,
}

impl Taxonomy {
    /// The default budget plan categories
    pub fn builtin() -> Self {
        let groups = MainCategory::all()
            .iter()
            .map(|&category| CategoryGroup {
                category,
                subcategories: category
                    .default_subcategories()
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            })
            .collect();
        Self { groups }
    }

    /// Add a user-defined subcategory under `category`
    ///
    /// Names are unique across the whole taxonomy, compared case-insensitively.
    pub fn with_subcategory(mut self, category: MainCategory, name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidData("Subcategory name is empty".into()));
        }
        let lowered = name.to_lowercase();
        if self.flatten().iter().any(|s| s.to_lowercase() == lowered) {
            return Err(Error::InvalidData(format!(
                "Subcategory already exists: {}",
                name
            )));
        }

        if let Some(group) = self.groups.iter_mut().find(|g| g.category == category) {
            group.subcategories.push(name.to_string());
        }
        Ok(self)
    }

    pub fn groups(&self) -> &[CategoryGroup] {
        &self.groups
    }

    /// Subcategories of one main category, in order
    pub fn subcategories(&self, category: MainCategory) -> &[String] {
        self.groups
            .iter()
            .find(|g| g.category == category)
            .map(|g| g.subcategories.as_slice())
            .unwrap_or(&[])
    }

    pub fn contains(&self, category: MainCategory, subcategory: &str) -> bool {
        self.subcategories(category).iter().any(|s| s == subcategory)
    }

    /// Every subcategory name, in category order then subcategory order
    pub fn flatten(&self) -> Vec<String> {
        self.groups
            .iter()
            .flat_map(|g| g.subcategories.iter().cloned())
            .collect()
    }

    /// Main category owning `subcategory` (first owner if names repeat)
    pub fn category_of(&self, subcategory: &str) -> Option<MainCategory> {
        self.groups
            .iter()
            .find(|g| g.subcategories.iter().any(|s| s == subcategory))
            .map(|g| g.category)
    }

    /// `{"VIVIENDA": ["Renta", ...], ...}` as embedded in the receipt prompt
    ///
    /// Built by hand so keys keep taxonomy order (serde_json maps are sorted).
    pub fn to_prompt_json(&self) -> String {
        let entries: Vec<String> = self
            .groups
            .iter()
            .map(|g| {
                format!(
                    "{}:{}",
                    serde_json::Value::from(g.category.as_str()),
                    serde_json::Value::from(g.subcategories.clone())
                )
            })
            .collect();
        format!("{{{}}}", entries.join(","))
    }
}

impl Default for Taxonomy {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_has_twelve_categories_in_order() {
        let taxonomy = Taxonomy::builtin();
        assert_eq!(taxonomy.groups().len(), 12);
        assert_eq!(taxonomy.groups()[0].category, MainCategory::Vivienda);
        assert_eq!(
            taxonomy.groups()[11].category,
            MainCategory::GastosPersonales
        );
    }

    #[test]
    fn test_flatten_keeps_taxonomy_order() {
        let flat = Taxonomy::builtin().flatten();
        assert_eq!(flat.first().map(String::as_str), Some("Renta"));
        assert_eq!(flat.last().map(String::as_str), Some(FALLBACK_SUBCATEGORY));

        let despensa = flat.iter().position(|s| s == "Despensa").unwrap();
        let gas = flat.iter().position(|s| s == "Gas").unwrap();
        assert!(despensa < gas);
    }

    #[test]
    fn test_label_round_trip_through_serde() {
        for category in MainCategory::all() {
            let json = serde_json::to_string(category).unwrap();
            assert_eq!(json, format!("\"{}\"", category.as_str()));
            let back: MainCategory = serde_json::from_str(&json).unwrap();
            assert_eq!(back, *category);
        }
    }

    #[test]
    fn test_from_label_is_exact() {
        assert_eq!(
            MainCategory::from_label("ALIMENTACIÓN"),
            Some(MainCategory::Alimentacion)
        );
        assert_eq!(MainCategory::from_label("alimentación"), None);
        assert_eq!(MainCategory::from_label("DEPORTES"), None);
        assert!("DEPORTES".parse::<MainCategory>().is_err());
    }

    #[test]
    fn test_fallback_pair_is_consistent() {
        let taxonomy = Taxonomy::builtin();
        assert!(taxonomy.contains(FALLBACK_CATEGORY, FALLBACK_SUBCATEGORY));
    }

    #[test]
    fn test_with_subcategory_appends() {
        let taxonomy = Taxonomy::builtin()
            .with_subcategory(MainCategory::Recreacion, "Gimnasio")
            .unwrap();
        assert_eq!(
            taxonomy
                .subcategories(MainCategory::Recreacion)
                .last()
                .map(String::as_str),
            Some("Gimnasio")
        );
        assert_eq!(
            taxonomy.category_of("Gimnasio"),
            Some(MainCategory::Recreacion)
        );
    }

    #[test]
    fn test_with_subcategory_rejects_case_insensitive_duplicate() {
        let result = Taxonomy::builtin().with_subcategory(MainCategory::Salud, "despensa");
        assert!(matches!(result, Err(Error::InvalidData(_))));

        let result = Taxonomy::builtin().with_subcategory(MainCategory::Salud, "   ");
        assert!(result.is_err());
    }

    #[test]
    fn test_prompt_json_shape() {
        let json: serde_json::Value =
            serde_json::from_str(&Taxonomy::builtin().to_prompt_json()).unwrap();
        assert_eq!(json["ALIMENTACIÓN"][0], "Despensa");
        assert_eq!(json.as_object().unwrap().len(), 12);

        let raw = Taxonomy::builtin().to_prompt_json();
        assert!(raw.starts_with(r#"{"VIVIENDA":["Renta""#));
    }
}
