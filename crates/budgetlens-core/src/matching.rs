//! Deterministic subcategory matching and classification validation
//!
//! Statement lines whose description names a valid subcategory (or is named by
//! one) are classified without an inference call. Everything else goes to the
//! model, whose answers are then checked against the same valid list.

use std::collections::HashSet;

use crate::models::{ClassifiedLineItem, ExtractedLineItem};
use crate::taxonomy::FALLBACK_SUBCATEGORY;

/// A naming rule shown to the model in the classification prompt
#[derive(Debug, Clone, Copy)]
pub struct HeuristicRule {
    /// Human description of the merchants the rule covers
    pub label: &'static str,
    /// Lowercase fragments that identify those merchants in a description
    pub keywords: &'static [&'static str],
    pub subcategory: &'static str,
}

const fn rule(
    label: &'static str,
    keywords: &'static [&'static str],
    subcategory: &'static str,
) -> HeuristicRule {
    HeuristicRule {
        label,
        keywords,
        subcategory,
    }
}

/// Merchant keyword → subcategory naming rules, in priority order
pub const HEURISTIC_RULES: &[HeuristicRule] = &[
    rule("Restaurantes/comida fuera", &["restaurant", "comida", "cafe", "starbucks"], "Restaurantes"),
    rule("Supermercados/tiendas de comida", &["super", "walmart", "soriana", "chedraui", "oxxo"], "Despensa"),
    rule("Gasolina", &["gasolin", "pemex", "shell"], "Gasolina y fluidos"),
    rule("Transporte público/Uber/taxis", &["uber trip", "taxi", "metro", "didi"], "Transporte público"),
    rule("Vuelos/avión", &["vuelo", "aeromexico", "volaris", "vivaaerobus"], "Vuelos"),
    rule("Estacionamiento/casetas", &["estacionamiento", "caseta", "parking"], "Estacionamiento y casetas"),
    rule("Amazon/compras online", &["amazon", "mercadolibre", "mercado libre"], "Otros gastos personales"),
    rule("Netflix/Disney/streaming video", &["netflix", "disney", "hbo", "prime video"], "Suscripciones de video"),
    rule("Spotify/Apple Music/audio", &["spotify", "apple music", "deezer"], "Suscripciones de audio"),
    rule("Rappi/Uber Eats/apps comida", &["rappi", "uber eats", "didi food"], "Restaurantes"),
    rule("Apps/software/tecnología", &["apple.com", "google play", "software", "microsoft"], "Artículos de tecnología"),
    rule("Hoteles/hospedaje", &["hotel", "airbnb", "hospedaje"], "Hospedaje"),
    rule("Viajes/paquetes turísticos", &["viaje", "tour", "despegar"], "Paquetes de viajes"),
    rule("Ropa", &["ropa", "zara", "liverpool"], "Ropa adultos"),
    rule("Zapatos", &["zapat", "shoes"], "Zapatos adultos"),
    rule("Electricidad/luz", &["cfe", "electricidad", "luz"], "Electricidad"),
    rule("Gas", &["gas natural", "gas lp"], "Gas"),
    rule("Agua", &["agua", "sacmex"], "Agua"),
    rule("Celular/teléfono", &["telcel", "at&t", "celular"], "Celular"),
    rule("Internet", &["internet", "telmex", "izzi", "totalplay"], "Internet"),
    rule("Cable/TV", &["cable", "sky", "dish"], "Televisión por cable"),
    rule("Medicinas", &["farmacia", "medicina"], "Medicamentos"),
    rule("Doctor/consultas", &["doctor", "consulta", "médico", "medico"], "Doctores"),
    rule("Dentista", &["dentista", "dental"], "Dentistas"),
    rule("Tarjetas de crédito", &["pago tarjeta", "tarjeta de crédito"], "Tarjetas de crédito"),
    rule("Regalos", &["regalo"], "Regalos"),
    rule("Mascotas", &["mascota", "petco", "veterinari"], "Suministros para mascotas"),
];

/// Render the rules as the bullet list embedded in the classification prompt
pub fn render_rules() -> String {
    let mut lines: Vec<String> = HEURISTIC_RULES
        .iter()
        .map(|r| format!("- {} → \"{}\"", r.label, r.subcategory))
        .collect();
    lines.push(format!("- Si no estás seguro → \"{}\"", FALLBACK_SUBCATEGORY));
    lines.join("\n")
}

/// First rule whose keywords appear in `description` (case-insensitive)
pub fn suggest_subcategory(description: &str) -> Option<&'static str> {
    let lowered = description.to_lowercase();
    HEURISTIC_RULES
        .iter()
        .find(|r| r.keywords.iter().any(|k| lowered.contains(k)))
        .map(|r| r.subcategory)
}

/// Stage-2 result: lines resolved locally and lines left for the model
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatchPartition {
    pub matched: Vec<ClassifiedLineItem>,
    pub unmatched: Vec<ExtractedLineItem>,
}

/// Match statement lines against the valid subcategory list
///
/// A line matches the first subcategory (in list order) where the description
/// contains the subcategory or the subcategory contains the description.
/// Both sides are compared trimmed and lowercased, so a padded list entry
/// like `" Vuelos "` still matches; the matched item keeps the exact spelling
/// from `valid`. Blank descriptions and blank list entries never match.
/// Input order is preserved within each partition.
pub fn match_line_items(items: &[ExtractedLineItem], valid: &[String]) -> MatchPartition {
    let lowered: Vec<String> = valid.iter().map(|s| s.trim().to_lowercase()).collect();
    let mut partition = MatchPartition::default();

    for item in items {
        let description = item.description.trim().to_lowercase();
        let hit = if description.is_empty() {
            None
        } else {
            lowered
                .iter()
                .position(|sub| {
                    !sub.is_empty() && (description.contains(sub) || sub.contains(&description))
                })
        };

        match hit {
            Some(idx) => partition.matched.push(ClassifiedLineItem {
                subcategory: valid[idx].clone(),
                amount: item.amount,
            }),
            None => partition.unmatched.push(item.clone()),
        }
    }

    partition
}

/// Stage-4 outcome
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub kept: Vec<ClassifiedLineItem>,
    pub dropped: Vec<ClassifiedLineItem>,
}

/// Keep model-classified lines whose subcategory is exactly in `valid` and
/// whose amount is a positive finite number
pub fn validate_classified(items: Vec<ClassifiedLineItem>, valid: &[String]) -> Validation {
    let valid: HashSet<&str> = valid.iter().map(String::as_str).collect();
    let (kept, dropped) = items.into_iter().partition(|item| {
        valid.contains(item.subcategory.as_str()) && item.amount.is_finite() && item.amount > 0.0
    });
    Validation { kept, dropped }
}
