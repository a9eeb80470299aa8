//! JSON parsing helpers for model responses
//!
//! Models wrap their JSON in markdown code fences often enough that every
//! response goes through [`strip_code_fences`] first. When the stripped text
//! still isn't valid JSON, the payload is cut out between the first opening
//! and last closing bracket, which handles chatter before/after the JSON.

use std::sync::OnceLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::error::{AnalysisStage, Error, Result};

/// Max characters of raw model output echoed in errors and logs
const RAW_PREVIEW_LEN: usize = 200;

fn fence_regex() -> &'static Regex {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    FENCE.get_or_init(|| Regex::new(r"```(?:json)?\n?").expect("valid regex"))
}

/// Remove ```` ```json ```` / ```` ``` ```` markers and trim
///
/// Idempotent: text without fences is only trimmed.
pub fn strip_code_fences(text: &str) -> String {
    fence_regex().replace_all(text, "").trim().to_string()
}

/// Truncate model output for error messages, on a char boundary
pub fn preview(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        text.to_string()
    } else {
        let cut: String = text.chars().take(max).collect();
        format!("{}...", cut)
    }
}

/// Decode the JSON payload of a model response
///
/// Empty (or whitespace-only) text is an [`Error::EmptyResponse`]; anything
/// that can't be decoded into `T` is an [`Error::Parse`].
pub fn parse_json_payload<T: DeserializeOwned>(response: &str, stage: AnalysisStage) -> Result<T> {
    let trimmed = response.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyResponse(stage));
    }

    let cleaned = strip_code_fences(trimmed);
    if cleaned.is_empty() {
        return Err(Error::EmptyResponse(stage));
    }

    let first_error = match serde_json::from_str::<T>(&cleaned) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    // Fall back to the outermost {...} or [...] span
    if let Some(slice) = outermost_json_span(&cleaned) {
        if slice.len() != cleaned.len() {
            if let Ok(value) = serde_json::from_str::<T>(slice) {
                return Ok(value);
            }
        }
    }

    Err(Error::Parse {
        stage,
        message: format!(
            "{} | Raw: {}",
            first_error,
            preview(&cleaned, RAW_PREVIEW_LEN)
        ),
    })
}

/// Array elements decoded one at a time
#[derive(Debug)]
pub struct ItemBatch<T> {
    pub items: Vec<T>,
    pub rejected: Vec<RejectedItem>,
}

/// An array element that did not decode
#[derive(Debug, Clone)]
pub struct RejectedItem {
    pub raw: Value,
    pub reason: String,
}

/// Decode a JSON array payload element by element
///
/// The payload itself must still be an array ([`parse_json_payload`] rules
/// apply). Elements that don't decode into `T` land in `rejected` instead of
/// failing the whole batch.
pub fn parse_json_items<T: DeserializeOwned>(
    response: &str,
    stage: AnalysisStage,
) -> Result<ItemBatch<T>> {
    let values: Vec<Value> = parse_json_payload(response, stage)?;

    let mut batch = ItemBatch {
        items: Vec::with_capacity(values.len()),
        rejected: Vec::new(),
    };
    for value in values {
        match T::deserialize(&value) {
            Ok(item) => batch.items.push(item),
            Err(e) => batch.rejected.push(RejectedItem {
                raw: value,
                reason: e.to_string(),
            }),
        }
    }
    Ok(batch)
}

/// Span from the first `{`/`[` to the matching last `}`/`]`
fn outermost_json_span(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') {
        '}'
    } else {
        ']'
    };
    let end = text.rfind(close)?;
    (start < end).then(|| &text[start..=end])
}

fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

/// Accept amounts as JSON numbers or numeric strings (`"1,234.50"`, `"$87"`)
pub fn lenient_amount<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    amount_from_value(&value)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid amount: {}", value)))
}

/// Like [`lenient_amount`], but `null` and unreadable values become `None`
///
/// Pair with `#[serde(default)]` so a missing field is `None` too.
pub fn lenient_optional_amount<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(amount_from_value(&value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClassifiedLineItem, ExtractedLineItem};

    #[test]
    fn test_strip_code_fences_json_block() {
        let text = "```json\n[{\"subcategory\": \"Despensa\", \"amount\": 200.0}]\n```";
        assert_eq!(
            strip_code_fences(text),
            r#"[{"subcategory": "Despensa", "amount": 200.0}]"#
        );
    }

    #[test]
    fn test_strip_code_fences_is_idempotent() {
        let text = "```\n{\"a\": 1}\n```\n";
        let once = strip_code_fences(text);
        assert_eq!(strip_code_fences(&once), once);
        assert_eq!(strip_code_fences("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_fenced_and_plain_parse_identically() {
        let plain = r#"[{"description": "OXXO PLAZA CENTRO", "amount": 150.50}]"#;
        let fenced = format!("```json\n{}\n```", plain);
        let bare_fence = format!("```\n{}\n```", plain);

        let a: Vec<ExtractedLineItem> =
            parse_json_payload(plain, AnalysisStage::StatementExtraction).unwrap();
        let b: Vec<ExtractedLineItem> =
            parse_json_payload(&fenced, AnalysisStage::StatementExtraction).unwrap();
        let c: Vec<ExtractedLineItem> =
            parse_json_payload(&bare_fence, AnalysisStage::StatementExtraction).unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(a[0].amount, 150.50);
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let response = "Aquí está el resultado:\n[{\"subcategory\": \"Gas\", \"amount\": 300}]\nListo.";
        let items: Vec<ClassifiedLineItem> =
            parse_json_payload(response, AnalysisStage::LineItemClassification).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].subcategory, "Gas");
    }

    #[test]
    fn test_empty_response() {
        let result: Result<Vec<ExtractedLineItem>> =
            parse_json_payload("   \n", AnalysisStage::StatementExtraction);
        assert!(matches!(
            result,
            Err(Error::EmptyResponse(AnalysisStage::StatementExtraction))
        ));

        let result: Result<Vec<ExtractedLineItem>> =
            parse_json_payload("```json\n```", AnalysisStage::Receipt);
        assert!(matches!(result, Err(Error::EmptyResponse(_))));
    }

    #[test]
    fn test_malformed_response() {
        let result: Result<Vec<ExtractedLineItem>> =
            parse_json_payload("no encontré transacciones", AnalysisStage::StatementExtraction);
        match result {
            Err(Error::Parse { stage, message }) => {
                assert_eq!(stage, AnalysisStage::StatementExtraction);
                assert!(message.contains("no encontré"));
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_preview_respects_char_boundaries() {
        let text = "ñ".repeat(300);
        let short = preview(&text, 200);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 203);
    }

    #[derive(Debug, Deserialize)]
    struct WithAmount {
        #[serde(deserialize_with = "lenient_amount")]
        amount: f64,
    }

    #[test]
    fn test_lenient_amount() {
        let n: WithAmount = serde_json::from_str(r#"{"amount": 87}"#).unwrap();
        assert_eq!(n.amount, 87.0);

        let s: WithAmount = serde_json::from_str(r#"{"amount": "$1,234.50"}"#).unwrap();
        assert_eq!(s.amount, 1234.50);

        let bad = serde_json::from_str::<WithAmount>(r#"{"amount": "n/a"}"#);
        assert!(bad.is_err());
        let null = serde_json::from_str::<WithAmount>(r#"{"amount": null}"#);
        assert!(null.is_err());
    }

    #[derive(Debug, Deserialize)]
    struct WithOptionalAmount {
        #[serde(default, deserialize_with = "lenient_optional_amount")]
        amount: Option<f64>,
    }

    #[test]
    fn test_lenient_optional_amount() {
        let parse = |json: &str| serde_json::from_str::<WithOptionalAmount>(json).unwrap().amount;
        assert_eq!(parse(r#"{"amount": "$87"}"#), Some(87.0));
        assert_eq!(parse(r#"{"amount": null}"#), None);
        assert_eq!(parse(r#"{"amount": "n/a"}"#), None);
        assert_eq!(parse(r#"{}"#), None);
    }

    #[test]
    fn test_parse_json_items_keeps_good_elements() {
        let response = r#"```json
[{"subcategory": "Despensa", "amount": 150.50}, {"subcategory": null, "amount": 10}, {"subcategory": "Gas", "amount": null}]
```"#;
        let batch: ItemBatch<ClassifiedLineItem> =
            parse_json_items(response, AnalysisStage::LineItemClassification).unwrap();

        assert_eq!(batch.items.len(), 1);
        assert_eq!(batch.items[0].subcategory, "Despensa");
        assert_eq!(batch.rejected.len(), 2);
        assert_eq!(batch.rejected[0].raw["amount"], 10);
        assert!(!batch.rejected[1].reason.is_empty());
    }

    #[test]
    fn test_parse_json_items_requires_an_array() {
        let result: Result<ItemBatch<ExtractedLineItem>> =
            parse_json_items(r#"{"description": "OXXO"}"#, AnalysisStage::StatementExtraction);
        assert!(matches!(result, Err(Error::Parse { .. })));

        let result: Result<ItemBatch<ExtractedLineItem>> =
            parse_json_items("", AnalysisStage::StatementExtraction);
        assert!(matches!(result, Err(Error::EmptyResponse(_))));
    }
}
