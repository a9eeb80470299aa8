//! Test utilities for budgetlens-core
//!
//! This module provides a mock Gemini server speaking the `generateContent`
//! wire format, for development and integration tests of the HTTP backends.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{
    extract::{Json, Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::embedded_items;
use crate::matching::suggest_subcategory;
use crate::taxonomy::FALLBACK_SUBCATEGORY;

/// API key the mock server accepts
pub const MOCK_API_KEY: &str = "test-key";

/// A generateContent call as received by the mock server
#[derive(Debug, Clone)]
pub struct ReceivedCall {
    /// Path segment after `/v1beta/models/`, e.g. `gemini-2.0-flash-exp:generateContent`
    pub target: String,
    pub api_key: Option<String>,
    pub body: Value,
}

impl ReceivedCall {
    /// Text of the prompt part
    pub fn prompt(&self) -> &str {
        self.body["contents"][0]["parts"][1]["text"]
            .as_str()
            .unwrap_or_default()
    }

    /// MIME type of the inline document
    pub fn mime_type(&self) -> &str {
        self.body["contents"][0]["parts"][0]["inline_data"]["mime_type"]
            .as_str()
            .unwrap_or_default()
    }
}

#[derive(Clone)]
struct ServerState {
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
    /// When set, every generateContent call fails with this status
    fail_with: Option<StatusCode>,
}

/// Mock Gemini server for testing and development
pub struct MockGeminiServer {
    addr: SocketAddr,
    calls: Arc<Mutex<Vec<ReceivedCall>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockGeminiServer {
    /// Start the mock server on an available port
    pub async fn start() -> Self {
        Self::spawn(None).await
    }

    /// Start a server whose generateContent endpoint always fails with `status`
    pub async fn failing(status: StatusCode) -> Self {
        Self::spawn(Some(status)).await
    }

    async fn spawn(fail_with: Option<StatusCode>) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = ServerState {
            calls: calls.clone(),
            fail_with,
        };

        let app = Router::new()
            .route("/v1beta/models", get(handle_models))
            .route("/v1beta/models/:target", post(handle_generate))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            calls,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// generateContent calls received so far
    pub fn calls(&self) -> Vec<ReceivedCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockGeminiServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-goog-api-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error": {"code": status.as_u16(), "message": message}})),
    )
        .into_response()
}

/// Model list endpoint (health check)
async fn handle_models(headers: HeaderMap) -> Response {
    if api_key(&headers).as_deref() != Some(MOCK_API_KEY) {
        return error_response(StatusCode::FORBIDDEN, "API key not valid");
    }
    Json(ModelsResponse {
        models: vec![ModelInfo {
            name: "models/gemini-2.0-flash-exp".to_string(),
            display_name: "Gemini 2.0 Flash Experimental".to_string(),
        }],
    })
    .into_response()
}

/// generateContent endpoint
async fn handle_generate(
    State(state): State<ServerState>,
    Path(target): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let call = ReceivedCall {
        target: target.clone(),
        api_key: api_key(&headers),
        body,
    };
    state.calls.lock().unwrap().push(call.clone());

    if call.api_key.as_deref() != Some(MOCK_API_KEY) {
        return error_response(StatusCode::FORBIDDEN, "API key not valid");
    }
    if !target.ends_with(":generateContent") {
        return error_response(StatusCode::NOT_FOUND, "Unknown method");
    }
    if let Some(status) = state.fail_with {
        return error_response(status, "Mock failure");
    }

    let text = respond_to(call.mime_type(), call.prompt());
    Json(json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"text": text}]},
            "finishReason": "STOP"
        }]
    }))
    .into_response()
}

/// Pick a canned answer from the media type and the prompt
///
/// Images get a receipt; PDFs get either classifications for the items
/// embedded in the prompt, or a fenced statement extraction.
fn respond_to(mime_type: &str, prompt: &str) -> String {
    if mime_type.starts_with("image/") {
        return r#"{"merchant": "Farmacias Guadalajara", "amount": 245.9, "date": "2024-04-18", "category": "SALUD", "subcategory": "Medicamentos"}"#.to_string();
    }

    let items = embedded_items(prompt);
    if items.is_empty() {
        return "```json\n[{\"description\": \"CFE SUMINISTRADOR\", \"amount\": 812.0}, {\"description\": \"Despensa\", \"amount\": 1500.0}]\n```".to_string();
    }

    let classified: Vec<Value> = items
        .iter()
        .map(|item| {
            json!({
                "subcategory": suggest_subcategory(&item.description).unwrap_or(FALLBACK_SUBCATEGORY),
                "amount": item.amount,
            })
        })
        .collect();
    Value::Array(classified).to_string()
}

// Response types for the mock server

#[derive(Debug, Serialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ModelInfo {
    name: String,
    display_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::{GeminiBackend, InferenceBackend, InferenceClient};
    use crate::analyzer::Analyzer;
    use crate::config::{AnalyzerConfig, TaskType};
    use crate::error::Error;
    use crate::models::ClassifiedLineItem;
    use crate::prompts::PromptLibrary;
    use crate::taxonomy::MainCategory;

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0];
    const PDF: &[u8] = b"%PDF-1.5 estado de cuenta";

    fn config_for(server: &MockGeminiServer, key: Option<&str>) -> AnalyzerConfig {
        let mut config = AnalyzerConfig::default();
        config.host = server.url();
        config.api_key = key.map(str::to_string);
        config
            .task_models
            .insert(TaskType::LineItemClassification, "gemini-1.5-flash".into());
        config
    }

    fn analyzer_for(config: &AnalyzerConfig) -> Analyzer {
        Analyzer::from_config(config)
            .unwrap()
            .with_prompts(PromptLibrary::embedded_only())
    }

    #[tokio::test]
    async fn test_mock_server_health_check() {
        let server = MockGeminiServer::start().await;
        let good = GeminiBackend::new(&server.url(), "gemini-2.0-flash-exp", Some(MOCK_API_KEY));
        let bad = GeminiBackend::new(&server.url(), "gemini-2.0-flash-exp", Some("wrong"));

        assert!(good.health_check().await);
        assert!(!bad.health_check().await);
    }

    #[tokio::test]
    async fn test_receipt_over_http() {
        let server = MockGeminiServer::start().await;
        let analyzer = analyzer_for(&config_for(&server, Some(MOCK_API_KEY)));

        let receipt = analyzer.analyze_receipt(JPEG).await.unwrap();
        assert_eq!(receipt.merchant, "Farmacias Guadalajara");
        assert_eq!(receipt.category, MainCategory::Salud);
        assert_eq!(receipt.subcategory, "Medicamentos");

        let calls = server.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].target, "gemini-2.0-flash-exp:generateContent");
        assert_eq!(calls[0].api_key.as_deref(), Some(MOCK_API_KEY));
        assert_eq!(calls[0].mime_type(), "image/jpeg");
        assert_eq!(calls[0].body["contents"][0]["role"], "user");
        assert_eq!(
            calls[0].body["contents"][0]["parts"][0]["inline_data"]["data"],
            "/9j/4A=="
        );
        assert!(calls[0].prompt().contains("GASTOS PERSONALES"));
    }

    #[tokio::test]
    async fn test_statement_over_http_routes_models() {
        let server = MockGeminiServer::start().await;
        let analyzer = analyzer_for(&config_for(&server, Some(MOCK_API_KEY)));

        let items = analyzer.analyze_budget_document(PDF, None).await.unwrap();
        assert_eq!(
            items,
            vec![
                ClassifiedLineItem {
                    subcategory: "Despensa".into(),
                    amount: 1500.0
                },
                ClassifiedLineItem {
                    subcategory: "Electricidad".into(),
                    amount: 812.0
                },
            ]
        );

        let calls = server.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].target, "gemini-2.0-flash-exp:generateContent");
        assert_eq!(calls[1].target, "gemini-1.5-flash:generateContent");
        assert_eq!(calls[1].mime_type(), "application/pdf");
        assert!(calls[1].prompt().contains("CFE SUMINISTRADOR"));
    }

    #[tokio::test]
    async fn test_error_status_surfaces_as_api_error() {
        let server = MockGeminiServer::failing(StatusCode::TOO_MANY_REQUESTS).await;
        let analyzer = analyzer_for(&config_for(&server, Some(MOCK_API_KEY)));

        match analyzer.analyze_receipt(JPEG).await {
            Err(Error::Api { status, body }) => {
                assert_eq!(status, 429);
                assert!(body.contains("Mock failure"));
            }
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_missing_key_sends_nothing() {
        let server = MockGeminiServer::start().await;
        let client = InferenceClient::from_config(&config_for(&server, None)).unwrap();
        let analyzer = Analyzer::new(client).with_prompts(PromptLibrary::embedded_only());

        let result = analyzer.analyze_receipt(JPEG).await;
        assert!(matches!(result, Err(Error::Configuration(_))));
        assert!(server.calls().is_empty());
    }
}
