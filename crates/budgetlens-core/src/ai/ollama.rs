//! Ollama backend implementation
//!
//! Uses `/api/generate` with the `images` field, so it needs a vision model
//! (llava, llama3.2-vision, qwen2.5vl, ...). Ollama has no document input,
//! so statement PDFs are rejected up front.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OLLAMA_HOST`: Ollama server URL (default: http://localhost:11434)
//! - `OLLAMA_MODEL`: Default model name (default: llava)
//!
//! Per-task models come from `analyzer.toml`:
//!
//! ```toml
//! [backend]
//! kind = "ollama"
//!
//! [defaults]
//! model = "llama3.2-vision"
//!
//! [tasks.receipt_analysis]
//! model = "qwen2.5vl"
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AnalyzerConfig, BackendKind};
use crate::error::{Error, Result};

use super::types::{BackendInfo, InferenceRequest, ModelRoutes};
use super::{check_status, http_client, InferenceBackend};

/// Ollama backend
#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    routes: ModelRoutes,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, default_model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            routes: ModelRoutes::single(default_model),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(config)?,
            base_url: config.host.trim_end_matches('/').to_string(),
            routes: ModelRoutes::from_config(config),
        })
    }
}

/// Request to Ollama API with images (for vision models)
#[derive(Debug, Serialize)]
struct OllamaVisionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    images: Vec<String>,
    stream: bool,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    response: String,
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String> {
        if request.media.is_pdf() {
            return Err(Error::UnsupportedMedia(format!(
                "Ollama cannot read {} documents; use the gemini or openai_compatible backend",
                request.media.mime_type()
            )));
        }

        let model = self.routes.model_for_task(request.task);
        let body = OllamaVisionRequest {
            model,
            prompt: request.prompt,
            images: vec![request.media.to_base64()],
            stream: false,
        };

        debug!(model, task = request.task.as_str(), "Sending Ollama generate request");

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&body)
            .send()
            .await?;

        let ollama_response: OllamaResponse = check_status(response).await?.json().await?;
        Ok(ollama_response.response)
    }

    async fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
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
            kind: BackendKind::Ollama.as_str().to_string(),
            host: self.base_url.clone(),
            default_model: self.routes.default_model().to_string(),
            task_models: self.routes.overrides(),
        }
    }
}
