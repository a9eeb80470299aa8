//! Pluggable inference backend abstraction
//!
//! Every analyzer step is the same shape: one document (receipt image or
//! statement PDF) plus one prompt in, free-form model text out. Backends only
//! move bytes; prompt wording and response parsing live with the analyzers.
//!
//! # Architecture
//!
//! - `InferenceBackend` trait: the single `submit` operation plus diagnostics
//! - `InferenceClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `GeminiBackend`, `OpenAICompatibleBackend`,
//!   `OllamaBackend`, `MockBackend`
//!
//! # Usage
//!
//! ```rust,ignore
//! let config = AnalyzerConfig::load()?;
//! let client = InferenceClient::from_config(&config)?;
//!
//! let media = Media::pdf(std::fs::read("estado.pdf")?)?;
//! let text = client
//!     .submit(InferenceRequest { media: &media, prompt: "...", task: TaskType::StatementExtraction })
//!     .await?;
//! ```
//!
//! # Configuration
//!
//! See [`crate::config`]. Environment variables:
//! - `AI_BACKEND`: gemini (default), openai_compatible, ollama, mock
//! - `GEMINI_API_KEY` (or `API_KEY`), `GEMINI_MODEL`, `GEMINI_HOST`
//! - `OPENAI_COMPATIBLE_HOST`, `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`
//! - `OLLAMA_HOST`, `OLLAMA_MODEL`

mod gemini;
mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;
pub mod types;

pub use gemini::GeminiBackend;
pub use mock::{MockBackend, RecordedRequest};
#[cfg(any(test, feature = "test-utils"))]
pub(crate) use mock::embedded_items;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;
pub use types::*;

use async_trait::async_trait;
use reqwest::Client;

use crate::config::{AnalyzerConfig, BackendKind};
use crate::error::{Error, Result};

/// Trait implemented by every inference backend
///
/// Backends should be Send + Sync to allow use across async tasks.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Send one document and one prompt, returning the model's raw text
    ///
    /// Non-success HTTP statuses surface as [`Error::Api`].
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String>;

    /// Check if the backend is reachable
    async fn health_check(&self) -> bool;

    /// Default model name
    fn model(&self) -> &str;

    /// Base URL (for logging)
    fn host(&self) -> &str;

    /// Description for `budgetlens check`
    fn info(&self) -> BackendInfo;
}

/// Concrete inference client enum
///
/// Provides Clone and compile-time dispatch without Box<dyn> overhead.
#[derive(Clone)]
pub enum InferenceClient {
    /// Hosted Gemini generateContent API
    Gemini(GeminiBackend),
    /// Any OpenAI chat completions server (vLLM, LocalAI, llama-server, ...)
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama HTTP API
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl InferenceClient {
    /// Build the client selected by the configuration
    ///
    /// A Gemini client without an API key is still built; its `submit`
    /// fails with [`Error::Configuration`] before any request is made.
    pub fn from_config(config: &AnalyzerConfig) -> Result<Self> {
        let client = match config.backend {
            BackendKind::Gemini => Self::Gemini(GeminiBackend::from_config(config)?),
            BackendKind::OpenAICompatible => {
                Self::OpenAICompatible(OpenAICompatibleBackend::from_config(config)?)
            }
            BackendKind::Ollama => Self::Ollama(OllamaBackend::from_config(config)?),
            BackendKind::Mock => Self::Mock(MockBackend::new()),
        };
        tracing::debug!(
            backend = config.backend.as_str(),
            host = client.host(),
            model = client.model(),
            "Inference client ready"
        );
        Ok(client)
    }

    /// Create from `AnalyzerConfig::load()` (config file + environment)
    pub fn from_env() -> Result<Self> {
        Self::from_config(&AnalyzerConfig::load()?)
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        Self::Mock(MockBackend::new())
    }

    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Gemini(_) => BackendKind::Gemini,
            Self::OpenAICompatible(_) => BackendKind::OpenAICompatible,
            Self::Ollama(_) => BackendKind::Ollama,
            Self::Mock(_) => BackendKind::Mock,
        }
    }
}

impl From<MockBackend> for InferenceClient {
    fn from(backend: MockBackend) -> Self {
        Self::Mock(backend)
    }
}

// Implement InferenceBackend for InferenceClient by delegating to the inner backend
#[async_trait]
impl InferenceBackend for InferenceClient {
    async fn submit(&self, request: InferenceRequest<'_>) -> Result<String> {
        match self {
            Self::Gemini(b) => b.submit(request).await,
            Self::OpenAICompatible(b) => b.submit(request).await,
            Self::Ollama(b) => b.submit(request).await,
            Self::Mock(b) => b.submit(request).await,
        }
    }

    async fn health_check(&self) -> bool {
        match self {
            Self::Gemini(b) => b.health_check().await,
            Self::OpenAICompatible(b) => b.health_check().await,
            Self::Ollama(b) => b.health_check().await,
            Self::Mock(b) => b.health_check().await,
        }
    }

    fn model(&self) -> &str {
        match self {
            Self::Gemini(b) => b.model(),
            Self::OpenAICompatible(b) => b.model(),
            Self::Ollama(b) => b.model(),
            Self::Mock(b) => b.model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            Self::Gemini(b) => b.host(),
            Self::OpenAICompatible(b) => b.host(),
            Self::Ollama(b) => b.host(),
            Self::Mock(b) => b.host(),
        }
    }

    fn info(&self) -> BackendInfo {
        match self {
            Self::Gemini(b) => b.info(),
            Self::OpenAICompatible(b) => b.info(),
            Self::Ollama(b) => b.info(),
            Self::Mock(b) => b.info(),
        }
    }
}

/// HTTP client shared by the network backends
pub(crate) fn http_client(config: &AnalyzerConfig) -> Result<Client> {
    Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(Error::Http)
}

/// Turn a non-success response into [`Error::Api`], keeping the body for diagnostics
pub(crate) async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        status: status.as_u16(),
        body: parsing::preview(&body, 500),
    })
}
