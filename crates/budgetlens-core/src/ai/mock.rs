//! Mock backend for testing
//!
//! Answers from a script when one is queued, otherwise with canned responses
//! per task. Every request is recorded so tests can assert on call counts and
//! prompt contents. Useful for unit tests and offline runs of the CLI.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{BackendKind, TaskType};
use crate::error::{Error, Result};
use crate::matching::suggest_subcategory;
use crate::models::{ClassifiedLineItem, ExtractedLineItem};
use crate::taxonomy::FALLBACK_SUBCATEGORY;

use super::types::{BackendInfo, InferenceRequest};
use super::InferenceBackend;

const CANNED_RECEIPT: &str = r#"{"merchant": "Mock Store", "amount": 123.45, "date": "2024-01-15", "category": "ALIMENTACIÓN", "subcategory": "Despensa"}"#;

const CANNED_STATEMENT: &str = r#"```json
[
  {"description": "OXXO PLAZA CENTRO", "amount": 150.50},
  {"description": "NETFLIX.COM", "amount": 219.00},
  {"description": "Restaurantes El Fogón", "amount": 480.00},
  {"description": "UBER TRIP", "amount": 96.30}
]
```"#;

/// A request as seen by the mock
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub task: TaskType,
    pub mime_type: String,
    pub media_len: usize,
    pub prompt: String,
}

/// Mock inference backend
///
/// Clones share the script and the request log.
#[derive(Clone)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    script: Arc<Mutex<VecDeque<Result<String>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self {
            healthy: false,
            ..Self::new()
        }
    }

    /// Mock that answers with `responses` in order, then falls back to canned text
    pub fn scripted<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let backend = Self::new();
        for response in responses {
            backend.push_response(response);
        }
        backend
    }

    /// Queue a raw response text
    pub fn push_response(&self, text: impl Into<String>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Ok(text.into()));
        }
    }

    /// Queue a failure for the next call
    pub fn push_error(&self, error: Error) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(Err(error));
        }
    }

    /// All requests received so far
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn canned(&self, request: &InferenceRequest<'_>) -> Result<String> {
        match request.task {
            TaskType::ReceiptAnalysis => Ok(CANNED_RECEIPT.to_string()),
            TaskType::StatementExtraction => Ok(CANNED_STATEMENT.to_string()),
            TaskType::LineItemClassification => {
                // Classify the items embedded in the prompt with the keyword rules
                let classified: Vec<ClassifiedLineItem> = embedded_items(request.prompt)
                    .into_iter()
                    .map(|item| ClassifiedLineItem {
                        subcategory: suggest_subcategory(&item.description)
                            .unwrap_or(FALLBACK_SUBCATEGORY)
                            .to_string(),
                        amount: item.amount,
                    })
                    .collect();
                Ok(serde_json::to_string(&classified)?)
            }
        }
    }
}

/// First JSON array in `prompt` that decodes as described line items
pub(crate) fn embedded_items(prompt: &str) -> Vec<ExtractedLineItem> {
    prompt
        .match_indices('[')
        .find_map(|(idx, _)| {
            serde_json::Deserializer::from_str(&prompt[idx..])
                .into_iter::<Vec<ExtractedLineItem>>()
                .next()
                .and_then(|r| r.ok())
                .filter(|items| {
                    !items.is_empty() && items.iter().all(|i| !i.description.is_empty())
                })
        })
        .unwrap_or_default()
}

#[async_trait]
impl InferenceBackend for MockBackend {
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String> {
        if let Ok(mut log) = self.requests.lock() {
            log.push(RecordedRequest {
                task: request.task,
                mime_type: request.media.mime_type().to_string(),
                media_len: request.media.bytes().len(),
                prompt: request.prompt.to_string(),
            });
        }

        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(response) => response,
            None => self.canned(&request),
        }
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn host(&self) -> &str {
        BackendKind::Mock.default_host()
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::Mock.as_str().to_string(),
            host: self.host().to_string(),
            default_model: "mock".to_string(),
            task_models: vec![],
        }
    }
}
