//! OpenAI-compatible backend implementation
//!
//! Works with any server that implements the OpenAI chat completions API:
//! - vLLM (http://localhost:8000)
//! - LocalAI (http://localhost:8080)
//! - llama-server / llama.cpp (http://localhost:8080)
//! - OpenAI itself or gateways in front of hosted models
//!
//! Images are sent as `image_url` data URIs. PDFs are sent as `file` parts,
//! which only some servers understand; the others answer with an error status.
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL
//! - `OPENAI_COMPATIBLE_MODEL`: Model name (default: gpt-4o-mini)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{AnalyzerConfig, BackendKind};
use crate::error::Result;

use super::types::{BackendInfo, InferenceRequest, Media, ModelRoutes};
use super::{check_status, http_client, InferenceBackend};

/// OpenAI-compatible backend
///
/// # Example
///
/// ```rust,ignore
/// // vLLM
/// export AI_BACKEND=openai_compatible
/// export OPENAI_COMPATIBLE_HOST="http://192.168.1.100:8000"
/// export OPENAI_COMPATIBLE_MODEL="Qwen/Qwen2-VL-7B-Instruct"
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    api_key: Option<String>,
    routes: ModelRoutes,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str) -> Self {
        Self {
            http_client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: None,
            routes: ModelRoutes::single(model),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        Ok(Self {
            http_client: http_client(config)?,
            base_url: config.host.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            routes: ModelRoutes::from_config(config),
        })
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

/// Chat message
#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: Vec<ContentPart>,
}

/// Content part for multimodal messages
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
    #[serde(rename = "file")]
    File { file: FileData },
}

/// Image URL for vision requests
#[derive(Debug, Serialize)]
struct ImageUrl {
    url: String,
}

/// Inline file for document requests
#[derive(Debug, Serialize)]
struct FileData {
    filename: String,
    file_data: String,
}

impl ContentPart {
    fn from_media(media: &Media) -> Self {
        if media.is_pdf() {
            ContentPart::File {
                file: FileData {
                    filename: "statement.pdf".to_string(),
                    file_data: media.to_data_uri(),
                },
            }
        } else {
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: media.to_data_uri(),
                },
            }
        }
    }
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// Chat completion choice
#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

/// Chat response message
#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait]
impl InferenceBackend for OpenAICompatibleBackend {
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String> {
        let model = self.routes.model_for_task(request.task);
        let body = ChatCompletionRequest {
            model: model.to_string(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![
                    ContentPart::Text {
                        text: request.prompt.to_string(),
                    },
                    ContentPart::from_media(request.media),
                ],
            }],
            temperature: Some(0.1),
            max_tokens: Some(4096),
            stream: false,
        };

        debug!(
            model,
            task = request.task.as_str(),
            mime = request.media.mime_type(),
            "Sending chat completion request"
        );

        let mut req_builder = self
            .http_client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .json(&body);

        if let Some(ref api_key) = self.api_key {
            req_builder = req_builder.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = check_status(req_builder.send().await?).await?;
        let chat_response: ChatCompletionResponse = response.json().await?;

        // No choice / null content is passed on as empty text
        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    async fn health_check(&self) -> bool {
        // Try /v1/models first (standard OpenAI endpoint)
        let mut models = self
            .http_client
            .get(format!("{}/v1/models", self.base_url));
        if let Some(ref api_key) = self.api_key {
            models = models.header("Authorization", format!("Bearer {}", api_key));
        }
        if let Ok(resp) = models.send().await {
            if resp.status().is_success() {
                return true;
            }
        }

        // Try /health (common for LocalAI, llama-server)
        if let Ok(resp) = self
            .http_client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
        {
            if resp.status().is_success() {
                return true;
            }
        }

        false
    }

    fn model(&self) -> &str {
        self.routes.default_model()
    }

    fn host(&self) -> &str {
        &self.base_url
    }

    fn info(&self) -> BackendInfo {
        BackendInfo {
            kind: BackendKind::OpenAICompatible.as_str().to_string(),
            host: self.base_url.clone(),
            default_model: self.routes.default_model().to_string(),
            task_models: self.routes.overrides(),
        }
    }
}
