//! Receipt and statement analyzers
//!
//! Receipts take one inference call. Statements take up to two:
//!
//! 1. Extraction: the PDF goes out with an extraction-only prompt and comes
//!    back as raw `{description, amount}` lines. Any failure here is fatal.
//! 2. Matching: lines whose description names a valid subcategory are
//!    classified locally (see [`crate::matching`]).
//! 3. Classification: the leftovers are batched into one more call, together
//!    with the valid list and the naming rules. Skipped when nothing is left;
//!    failures only cost the leftovers.
//! 4. Validation: model answers outside the valid list are dropped.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::ai::parsing::{parse_json_items, parse_json_payload, preview, ItemBatch};
use crate::ai::{InferenceBackend, InferenceClient, InferenceRequest, Media};
use crate::config::{AnalyzerConfig, TaskType};
use crate::error::{AnalysisStage, Error, Result};
use crate::matching::{match_line_items, render_rules, validate_classified};
use crate::models::{ClassifiedLineItem, ExtractedLineItem, RawReceipt, ReceiptData};
use crate::prompts::{PromptId, PromptLibrary};
use crate::taxonomy::{MainCategory, Taxonomy, FALLBACK_CATEGORY, FALLBACK_SUBCATEGORY};

/// Raw model output is logged up to this many characters
const LOG_PREVIEW_LEN: usize = 500;

/// How many dropped items to echo when a whole batch is rejected
const DROPPED_SAMPLE: usize = 5;

/// Extraction-classification pipeline over an inference client
#[derive(Clone)]
pub struct Analyzer {
    client: InferenceClient,
    taxonomy: Taxonomy,
    prompts: Arc<RwLock<PromptLibrary>>,
}

impl Analyzer {
    /// Analyzer with the built-in taxonomy and the default prompt library
    pub fn new(client: InferenceClient) -> Self {
        Self {
            client,
            taxonomy: Taxonomy::builtin(),
            prompts: Arc::new(RwLock::new(PromptLibrary::new())),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self::new(InferenceClient::from_config(config)?))
    }

    /// Validate receipts (and default statement lists) against a custom taxonomy
    pub fn with_taxonomy(mut self, taxonomy: Taxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLibrary) -> Self {
        self.prompts = Arc::new(RwLock::new(prompts));
        self
    }

    pub fn client(&self) -> &InferenceClient {
        &self.client
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    fn render(&self, id: PromptId, vars: &HashMap<&str, &str>) -> Result<String> {
        let mut prompts = self
            .prompts
            .write()
            .map_err(|_| Error::InvalidData("Failed to acquire prompt library lock".into()))?;
        prompts.render(id, vars)
    }

    async fn submit(&self, media: &Media, prompt: &str, task: TaskType) -> Result<String> {
        let response = self
            .client
            .submit(InferenceRequest {
                media,
                prompt,
                task,
            })
            .await?;
        debug!(
            task = task.as_str(),
            chars = response.len(),
            "Model response: {}",
            preview(&response, LOG_PREVIEW_LEN)
        );
        Ok(response)
    }

    /// Turn a receipt photo into a draft expense
    ///
    /// The category is always one of the taxonomy's labels and the
    /// subcategory always belongs to it: unknown categories become
    /// `GASTOS PERSONALES / Otros gastos personales`, unknown subcategories
    /// become the category's first subcategory.
    pub async fn analyze_receipt(&self, image: &[u8]) -> Result<ReceiptData> {
        let media = Media::image(image.to_vec())?;

        let taxonomy_json = self.taxonomy.to_prompt_json();
        let mut vars = HashMap::new();
        vars.insert("taxonomy_json", taxonomy_json.as_str());
        let prompt = self.render(PromptId::AnalyzeReceipt, &vars)?;

        let response = self
            .submit(&media, &prompt, TaskType::ReceiptAnalysis)
            .await?;
        let raw: RawReceipt = parse_json_payload(&response, AnalysisStage::Receipt)?;

        let receipt = self.repair_receipt(raw);
        info!(
            merchant = %receipt.merchant,
            amount = receipt.amount,
            category = %receipt.category,
            subcategory = %receipt.subcategory,
            "Receipt analyzed"
        );
        Ok(receipt)
    }

    fn repair_receipt(&self, raw: RawReceipt) -> ReceiptData {
        let merchant = raw.merchant.unwrap_or_default();
        let amount = raw.amount.unwrap_or_else(|| {
            warn!("Receipt amount missing or unreadable, using 0");
            0.0
        });
        let date = raw.date.unwrap_or_default();
        let label = raw.category.unwrap_or_default();

        let Some(category) = MainCategory::from_label(&label) else {
            warn!(category = %label, "Unknown receipt category, using fallback");
            return ReceiptData {
                merchant,
                amount,
                date,
                category: FALLBACK_CATEGORY,
                subcategory: FALLBACK_SUBCATEGORY.to_string(),
            };
        };

        let subcategory = raw.subcategory.unwrap_or_default();
        let subcategory = if self.taxonomy.contains(category, &subcategory) {
            subcategory
        } else {
            let replacement = self
                .taxonomy
                .subcategories(category)
                .first()
                .map(String::as_str)
                .unwrap_or(FALLBACK_SUBCATEGORY);
            warn!(
                subcategory = %subcategory,
                %category,
                replacement,
                "Subcategory not in category, replacing"
            );
            replacement.to_string()
        };

        ReceiptData {
            merchant,
            amount,
            date,
            category,
            subcategory,
        }
    }

    /// Turn a statement PDF into classified budget lines
    ///
    /// `valid_subcategories` limits what lines may be classified as; `None`
    /// or an empty list means every subcategory of the analyzer's taxonomy.
    /// Locally matched lines come first, then model-classified ones.
    pub async fn analyze_budget_document(
        &self,
        pdf: &[u8],
        valid_subcategories: Option<&[String]>,
    ) -> Result<Vec<ClassifiedLineItem>> {
        let media = Media::pdf(pdf.to_vec())?;
        let valid: Vec<String> = match valid_subcategories {
            Some(list) if !list.is_empty() => list.to_vec(),
            _ => self.taxonomy.flatten(),
        };

        let items = self.extract_line_items(&media).await?;
        info!(count = items.len(), "Extracted statement lines");

        let partition = match_line_items(&items, &valid);
        info!(
            matched = partition.matched.len(),
            unmatched = partition.unmatched.len(),
            "Matched statement lines against subcategories"
        );

        let mut result = partition.matched;
        if partition.unmatched.is_empty() {
            return Ok(result);
        }

        match self
            .classify_unmatched(&media, &partition.unmatched, &valid)
            .await
        {
            Ok(classified) => result.extend(classified),
            Err(e) => warn!(
                unmatched = partition.unmatched.len(),
                "Line item classification failed, keeping matched lines only: {}", e
            ),
        }

        Ok(result)
    }

    async fn extract_line_items(&self, media: &Media) -> Result<Vec<ExtractedLineItem>> {
        let prompt = self.render(PromptId::ExtractStatement, &HashMap::new())?;
        let response = self
            .submit(media, &prompt, TaskType::StatementExtraction)
            .await?;
        let batch: ItemBatch<ExtractedLineItem> =
            parse_json_items(&response, AnalysisStage::StatementExtraction)?;
        for rejected in &batch.rejected {
            warn!(
                reason = %rejected.reason,
                "Skipping statement line that could not be read: {}", rejected.raw
            );
        }

        Ok(batch
            .items
            .into_iter()
            .map(|mut item| {
                if item.amount < 0.0 {
                    item.amount = item.amount.abs();
                }
                item
            })
            .collect())
    }

    async fn classify_unmatched(
        &self,
        media: &Media,
        unmatched: &[ExtractedLineItem],
        valid: &[String],
    ) -> Result<Vec<ClassifiedLineItem>> {
        let items_json = serde_json::to_string(unmatched)?;
        let subcategories_json = serde_json::to_string(valid)?;
        let rules = render_rules();

        let mut vars = HashMap::new();
        vars.insert("items_json", items_json.as_str());
        vars.insert("subcategories_json", subcategories_json.as_str());
        vars.insert("rules", rules.as_str());
        let prompt = self.render(PromptId::ClassifyLineItems, &vars)?;

        let response = self
            .submit(media, &prompt, TaskType::LineItemClassification)
            .await?;
        let batch: ItemBatch<ClassifiedLineItem> =
            parse_json_items(&response, AnalysisStage::LineItemClassification)?;
        for rejected in &batch.rejected {
            warn!(
                reason = %rejected.reason,
                "Dropping classified line that could not be read: {}", rejected.raw
            );
        }

        let returned = batch.items.len() + batch.rejected.len();
        let validation = validate_classified(batch.items, valid);
        for item in &validation.dropped {
            warn!(
                subcategory = %item.subcategory,
                amount = item.amount,
                "Dropping classified line outside the valid subcategories"
            );
        }
        if validation.kept.is_empty() && returned > 0 {
            warn!(
                unreadable = batch.rejected.len(),
                "All {} classified lines were dropped, first ones: {:?}",
                returned,
                &validation.dropped[..validation.dropped.len().min(DROPPED_SAMPLE)]
            );
        }
        info!(
            returned,
            kept = validation.kept.len(),
            "Validated classified lines"
        );

        Ok(validation.kept)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PDF: &[u8] = b"%PDF-1.4 statement";

    fn analyzer(mock: &MockBackend) -> Analyzer {
        Analyzer::new(InferenceClient::from(mock.clone())).with_prompts(PromptLibrary::embedded_only())
    }

    fn valid(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn classified(subcategory: &str, amount: f64) -> ClassifiedLineItem {
        ClassifiedLineItem {
            subcategory: subcategory.to_string(),
            amount,
        }
    }

    #[tokio::test]
    async fn test_receipt_valid_response() {
        let mock = MockBackend::scripted([
            "```json\n{\"merchant\": \"Soriana\", \"amount\": 532.10, \"date\": \"2024-06-02\", \"category\": \"ALIMENTACIÓN\", \"subcategory\": \"Despensa\"}\n```",
        ]);
        let receipt = analyzer(&mock).analyze_receipt(JPEG).await.unwrap();

        assert_eq!(receipt.merchant, "Soriana");
        assert_eq!(receipt.amount, 532.10);
        assert_eq!(receipt.category, MainCategory::Alimentacion);
        assert_eq!(receipt.subcategory, "Despensa");
        assert!(receipt.parsed_date().is_some());

        let requests = mock.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].task, TaskType::ReceiptAnalysis);
        assert_eq!(requests[0].mime_type, "image/jpeg");
        assert!(requests[0].prompt.contains("\"VIVIENDA\""));
    }

    #[tokio::test]
    async fn test_receipt_unknown_category_uses_fallback() {
        let mock = MockBackend::scripted([
            r#"{"merchant": "Sport City", "amount": 899, "date": "2024-06-02", "category": "DEPORTES", "subcategory": "Gimnasio"}"#,
        ]);
        let receipt = analyzer(&mock).analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.category, MainCategory::GastosPersonales);
        assert_eq!(receipt.subcategory, "Otros gastos personales");
        assert_eq!(receipt.amount, 899.0);
    }

    #[tokio::test]
    async fn test_receipt_subcategory_from_wrong_category() {
        let mock = MockBackend::scripted([
            r#"{"merchant": "Italianni's", "amount": 640, "date": "2024-06-02", "category": "TRANSPORTE", "subcategory": "Restaurantes"}"#,
        ]);
        let receipt = analyzer(&mock).analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.category, MainCategory::Transporte);
        assert_eq!(receipt.subcategory, "Gasolina y fluidos");
    }

    #[tokio::test]
    async fn test_receipt_null_fields() {
        let mock = MockBackend::scripted([
            r#"{"merchant": null, "amount": "87.00", "date": null, "category": "SALUD", "subcategory": null}"#,
        ]);
        let receipt = analyzer(&mock).analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.merchant, "");
        assert_eq!(receipt.amount, 87.0);
        assert_eq!(receipt.subcategory, "Medicamentos");
    }

    #[tokio::test]
    async fn test_receipt_missing_amount_defaults_to_zero() {
        let mock = MockBackend::scripted([
            r#"{"merchant": "Oxxo", "amount": null, "date": "2024-01-02", "category": "ALIMENTACIÓN", "subcategory": "Despensa"}"#,
            r#"{"merchant": "Oxxo", "date": "2024-01-02", "category": "ALIMENTACIÓN", "subcategory": "Despensa"}"#,
        ]);
        let analyzer = analyzer(&mock);

        let receipt = analyzer.analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.amount, 0.0);
        assert_eq!(receipt.merchant, "Oxxo");
        assert_eq!(receipt.subcategory, "Despensa");

        let receipt = analyzer.analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.amount, 0.0);
    }

    #[tokio::test]
    async fn test_receipt_custom_taxonomy() {
        let taxonomy = Taxonomy::builtin()
            .with_subcategory(MainCategory::Recreacion, "Gimnasio")
            .unwrap();
        let mock = MockBackend::scripted([
            r#"{"merchant": "Smart Fit", "amount": 499, "date": "2024-06-02", "category": "RECREACIÓN", "subcategory": "Gimnasio"}"#,
        ]);
        let receipt = analyzer(&mock)
            .with_taxonomy(taxonomy)
            .analyze_receipt(JPEG)
            .await
            .unwrap();
        assert_eq!(receipt.subcategory, "Gimnasio");
        assert!(mock.requests()[0].prompt.contains("Gimnasio"));
    }

    #[tokio::test]
    async fn test_receipt_empty_and_malformed() {
        let mock = MockBackend::scripted(["  ", "lo siento, no puedo leer la imagen"]);
        let analyzer = analyzer(&mock);

        let empty = analyzer.analyze_receipt(JPEG).await;
        assert!(matches!(
            empty,
            Err(Error::EmptyResponse(AnalysisStage::Receipt))
        ));

        let malformed = analyzer.analyze_receipt(JPEG).await;
        assert!(matches!(
            malformed,
            Err(Error::Parse {
                stage: AnalysisStage::Receipt,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_receipt_rejects_empty_image() {
        let mock = MockBackend::new();
        let result = analyzer(&mock).analyze_receipt(&[]).await;
        assert!(matches!(result, Err(Error::InvalidData(_))));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_statement_all_matched_skips_classification() {
        let mock = MockBackend::scripted([
            r#"[{"description": "Restaurantes", "amount": 87.00}, {"description": "pago despensa", "amount": 1200}]"#,
        ]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(valid(&["Restaurantes", "Despensa"]).as_slice()))
            .await
            .unwrap();

        assert_eq!(
            items,
            vec![classified("Restaurantes", 87.0), classified("Despensa", 1200.0)]
        );
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.requests()[0].mime_type, "application/pdf");
    }

    #[tokio::test]
    async fn test_statement_unmatched_goes_to_classification() {
        let mock = MockBackend::scripted([
            r#"[{"description": "Restaurantes", "amount": 87.00}, {"description": "OXXO PLAZA CENTRO", "amount": 150.50}, {"description": "UBER TRIP", "amount": 96.30}]"#,
            r#"```json
[{"subcategory": "Despensa", "amount": 150.50}, {"subcategory": "Lujos", "amount": 96.30}]
```"#,
        ]);
        let list = valid(&["Restaurantes", "Despensa", "Transporte público"]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(list.as_slice()))
            .await
            .unwrap();

        assert_eq!(
            items,
            vec![classified("Restaurantes", 87.0), classified("Despensa", 150.5)]
        );

        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        let prompt = &requests[1].prompt;
        assert_eq!(requests[1].task, TaskType::LineItemClassification);
        assert!(prompt.contains("OXXO PLAZA CENTRO"));
        assert!(prompt.contains("UBER TRIP"));
        assert!(!prompt.contains(r#""description":"Restaurantes""#));
        assert!(prompt.contains(r#"["Restaurantes","Despensa","Transporte público"]"#));
        assert!(prompt.contains("→ \"Suscripciones de video\""));
    }

    #[tokio::test]
    async fn test_statement_unreadable_classified_item_drops_only_itself() {
        let mock = MockBackend::scripted([
            r#"[{"description": "OXXO PLAZA CENTRO", "amount": 150.50}, {"description": "XYZ", "amount": 10}]"#,
            r#"[{"subcategory": "Despensa", "amount": 150.50}, {"subcategory": null, "amount": 10}]"#,
        ]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(valid(&["Despensa"]).as_slice()))
            .await
            .unwrap();
        assert_eq!(items, vec![classified("Despensa", 150.5)]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_statement_unreadable_extracted_line_is_skipped() {
        let mock = MockBackend::scripted([
            r#"[{"description": "Restaurantes", "amount": 87.0}, {"description": "Saldo", "amount": null}, {"description": "Pago", "amount": "n/a"}]"#,
        ]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(valid(&["Restaurantes"]).as_slice()))
            .await
            .unwrap();
        assert_eq!(items, vec![classified("Restaurantes", 87.0)]);
        // Nothing readable was left over, so no classification call
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_statement_malformed_classification_keeps_matches() {
        let mock = MockBackend::scripted([
            r#"[{"description": "Restaurantes", "amount": 87.00}, {"description": "NETFLIX.COM", "amount": 219}]"#,
            "no pude clasificar",
        ]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(valid(&["Restaurantes"]).as_slice()))
            .await
            .unwrap();
        assert_eq!(items, vec![classified("Restaurantes", 87.0)]);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_statement_transport_failure_in_classification_degrades() {
        let mock = MockBackend::scripted([r#"[{"description": "NETFLIX.COM", "amount": 219}]"#]);
        mock.push_error(Error::Api {
            status: 500,
            body: "internal".into(),
        });
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, None)
            .await
            .unwrap();
        assert!(items.is_empty());
    }

    #[tokio::test]
    async fn test_statement_extraction_failures_are_fatal() {
        let mock = MockBackend::scripted(["", "```json\nnot json\n```"]);
        let analyzer = analyzer(&mock);

        let empty = analyzer.analyze_budget_document(PDF, None).await;
        assert!(matches!(
            empty,
            Err(Error::EmptyResponse(AnalysisStage::StatementExtraction))
        ));

        let malformed = analyzer.analyze_budget_document(PDF, None).await;
        match malformed {
            Err(e) => assert_eq!(e.stage(), Some(AnalysisStage::StatementExtraction)),
            Ok(items) => panic!("expected an error, got {:?}", items),
        }
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_statement_defaults_to_taxonomy() {
        let mock = MockBackend::scripted([
            r#"[{"description": "NETFLIX.COM", "amount": 219}]"#,
            r#"[{"subcategory": "Suscripciones de video", "amount": 219}]"#,
        ]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(Vec::new().as_slice()))
            .await
            .unwrap();
        assert_eq!(items, vec![classified("Suscripciones de video", 219.0)]);

        let prompt = &mock.requests()[1].prompt;
        assert!(prompt.contains("Otros gastos personales"));
        assert!(prompt.contains("Renta"));
    }

    #[tokio::test]
    async fn test_statement_negative_amounts_normalized() {
        let mock = MockBackend::scripted([r#"[{"description": "Gas natural", "amount": -300}]"#]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, Some(valid(&["Gas"]).as_slice()))
            .await
            .unwrap();
        assert_eq!(items, vec![classified("Gas", 300.0)]);
    }

    #[tokio::test]
    async fn test_statement_empty_extraction() {
        let mock = MockBackend::scripted(["[]"]);
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, None)
            .await
            .unwrap();
        assert!(items.is_empty());
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_statement_with_canned_mock() {
        let mock = MockBackend::new();
        let items = analyzer(&mock)
            .analyze_budget_document(PDF, None)
            .await
            .unwrap();

        // "Restaurantes El Fogón" matches locally, the rest go through the rules
        assert_eq!(items[0], classified("Restaurantes", 480.0));
        assert!(items.contains(&classified("Despensa", 150.5)));
        assert!(items.contains(&classified("Suscripciones de video", 219.0)));
        assert!(items.contains(&classified("Transporte público", 96.3)));
        assert_eq!(items.len(), 4);
    }

    #[tokio::test]
    async fn test_missing_credentials_no_call() {
        let mut config = AnalyzerConfig::default();
        config.api_key = None;
        config.host = "http://127.0.0.1:9".into();
        let analyzer = Analyzer::from_config(&config)
            .unwrap()
            .with_prompts(PromptLibrary::embedded_only());

        let receipt = analyzer.analyze_receipt(JPEG).await;
        assert!(matches!(receipt, Err(Error::Configuration(_))));

        let statement = analyzer.analyze_budget_document(PDF, None).await;
        assert!(matches!(statement, Err(Error::Configuration(_))));
    }
}
