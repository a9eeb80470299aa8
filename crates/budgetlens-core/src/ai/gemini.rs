//! Gemini backend implementation
//!
//! Talks to the Generative Language API `generateContent` endpoint. The
//! document travels inline (base64) in the same user turn as the prompt,
//! so images and PDFs use the same request shape.
//!
//! # Configuration
//!
//! Environment variables:
//! - `GEMINI_API_KEY` (falls back to `API_KEY`): required to send requests
//! - `GEMINI_MODEL`: Model name (default: gemini-2.0-flash-exp)
//! - `GEMINI_HOST`: API base URL (default: https://generativelanguage.googleapis.com)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AnalyzerConfig, BackendKind};
use crate::error::{Error, Result};

use super::types::{BackendInfo, InferenceRequest, ModelRoutes};
use super::{check_status, http_client, InferenceBackend};

/// Gemini backend
#[derive(Clone)]
pub struct GeminiBackend {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    routes: ModelRoutes,
}

impl GeminiBackend {
    /// Create a backend with the default transport settings
    pub fn new(base_url: &str, model: &str, api_key: Option<&str>) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.map(str::to_string),
            routes: ModelRoutes::single(model),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        if config.api_key.is_none() {
            warn!("GEMINI_API_KEY is not set, Gemini requests will fail until it is configured");
        }
        Ok(Self {
            http_client: http_client(config)?,
            base_url: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            routes: ModelRoutes::from_config(config),
        })
    }

    fn api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::Configuration(
                "Gemini client is not initialized. Set GEMINI_API_KEY (or API_KEY)".into(),
            )
        })
    }

    fn endpoint(&self, model: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model)
    }
}

/// generateContent request body
#[derive(Debug, Serialize)]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<Part<'a>>,
}

/// Request part: inline document or text
#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part<'a> {
    InlineData { inline_data: InlineData<'a> },
    Text { text: &'a str },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: String,
}

/// generateContent response (only the fields we read)
#[derive(Debug, Default, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate (empty if there are none)
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InferenceBackend for GeminiBackend {
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String> {
        let api_key = self.api_key()?;
        let model = self.routes.model_for_task(request.task);

        let body = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    Part::InlineData {
                        inline_data: InlineData {
                            mime_type: request.media.mime_type(),
                            data: request.media.to_base64(),
                        },
                    },
                    Part::Text {
                        text: request.prompt,
                    },
                ],
            }],
        };

        debug!(
            model,
            task = request.task.as_str(),
            mime = request.media.mime_type(),
            bytes = request.media.bytes().len(),
            "Sending generateContent request"
        );

        let response = self
            .http_client
            .post(self.endpoint(model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let response: GenerateContentResponse = check_status(response).await?.json().await?;
        Ok(response.text())
    }

    async fn health_check(&self) -> bool {
        let Ok(api_key) = self.api_key() else {
            return false;
        };
        match self
            .http_client
            .get(format!("{}/v1beta/models", self.base_url))
            .header("x-goog-api-key", api_key)
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        self.routes.default_model()
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::Gemini.as_str().to_string(),
            host: self.base_url.clone(),
            default_model: self.routes.default_model().to_string(),
            task_models: self.routes.overrides(),
        }
    }
}
