//! Analyzer configuration
//!
//! Selects the inference backend, its credentials, and which model handles
//! each pipeline task. Replaces process-wide globals: everything the
//! analyzer needs arrives through an [`AnalyzerConfig`] value.
//!
//! ## Configuration Resolution
//!
//! 1. Check for override in data dir (~/.local/share/budgetlens/config/analyzer.toml),
//!    or an explicit path
//! 2. Fall back to embedded defaults (compiled into binary)
//! 3. Environment variables win over both:
//!    - `AI_BACKEND`: gemini (default), openai_compatible, ollama, mock
//!    - `GEMINI_API_KEY` (or `API_KEY`), `GEMINI_MODEL`, `GEMINI_HOST`
//!    - `OPENAI_COMPATIBLE_HOST`, `OPENAI_COMPATIBLE_MODEL`, `OPENAI_COMPATIBLE_API_KEY`
//!    - `OLLAMA_HOST`, `OLLAMA_MODEL`
//!
//! A `*_MODEL` variable replaces the default model and clears per-task overrides.
//! Switching backends (`AI_BACKEND`, `--backend`) drops the file's host, models
//! and API key, which only make sense for the backend they were written for.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/analyzer.toml");

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Pipeline tasks that issue an inference call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    /// Receipt image → merchant, amount, date, category
    ReceiptAnalysis,
    /// Statement PDF → raw debit lines
    StatementExtraction,
    /// Unmatched statement lines → subcategories
    LineItemClassification,
}

impl TaskType {
    /// Get the config key for this task type
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiptAnalysis => "receipt_analysis",
            Self::StatementExtraction => "statement_extraction",
            Self::LineItemClassification => "line_item_classification",
        }
    }

    pub fn all() -> &'static [TaskType] {
        &[
            Self::ReceiptAnalysis,
            Self::StatementExtraction,
            Self::LineItemClassification,
        ]
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        Self::all().iter().copied().find(|t| t.as_str() == key)
    }
}

/// Which inference backend to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendKind {
    /// Hosted Gemini generateContent API
    #[default]
    Gemini,
    /// Any /v1/chat/completions server
    OpenAICompatible,
    /// Ollama /api/generate (images only)
    Ollama,
    /// Canned responses, no network
    Mock,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAICompatible => "openai_compatible",
            Self::Ollama => "ollama",
            Self::Mock => "mock",
        }
    }

    /// Host used when neither the config file nor the environment sets one
    pub fn default_host(&self) -> &'static str {
        match self {
            Self::Gemini => "https://generativelanguage.googleapis.com",
            Self::OpenAICompatible => "http://localhost:8080",
            Self::Ollama => "http://localhost:11434",
            Self::Mock => "mock://localhost",
        }
    }

    /// Model used when neither the config file nor the environment names one
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-2.0-flash-exp",
            Self::OpenAICompatible => "gpt-4o-mini",
            Self::Ollama => "llava",
            Self::Mock => "mock",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openai_compatible" | "openai" | "vllm" | "localai" | "llamacpp" => {
                Ok(Self::OpenAICompatible)
            }
            "ollama" => Ok(Self::Ollama),
            "mock" => Ok(Self::Mock),
            other => Err(format!("Unknown AI backend: {}", other)),
        }
    }
}

/// Resolved analyzer configuration
#[derive(Debug, Clone)]
pub struct AnalyzerConfig {
    pub backend: BackendKind,
    pub host: String,
    /// Credential for hosted backends; `None` leaves the client uninitialized
    pub api_key: Option<String>,
    pub default_model: String,
    /// Per-task model overrides
    pub task_models: HashMap<TaskType, String>,
    /// Transport timeout applied to every inference call
    pub timeout: Duration,
    /// File the settings were read from (None = embedded defaults)
    pub source: Option<PathBuf>,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Gemini,
            host: BackendKind::Gemini.default_host().to_string(),
            api_key: None,
            default_model: BackendKind::Gemini.default_model().to_string(),
            task_models: HashMap::new(),
            timeout: DEFAULT_TIMEOUT,
            source: None,
        }
    }
}

impl AnalyzerConfig {
    /// Load from the default override location (or embedded defaults), then the environment
    pub fn load() -> Result<Self> {
        Self::resolve(None, None)
    }

    /// Full resolution used by the CLI
    ///
    /// `backend_override` wins over both the file and `AI_BACKEND`.
    pub fn resolve(path: Option<&Path>, backend_override: Option<BackendKind>) -> Result<Self> {
        let mut config = load_file(path)?;
        if let Some(kind) = backend_override {
            config.set_backend(kind);
        }
        config.apply_env_with(|key| std::env::var(key).ok(), backend_override.is_none());
        Ok(config)
    }

    /// Parse a TOML document (no environment lookups)
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// Config for tests and offline runs
    pub fn mock() -> Self {
        let mut config = Self::default();
        config.set_backend(BackendKind::Mock);
        config
    }

    /// Switch backend
    ///
    /// Host, models and credentials belong to the previous backend, so they
    /// are reset to the new backend's defaults.
    pub fn set_backend(&mut self, kind: BackendKind) {
        if self.backend != kind {
            self.backend = kind;
            self.host = kind.default_host().to_string();
            self.default_model = kind.default_model().to_string();
            self.task_models.clear();
            self.api_key = None;
        }
    }

    /// Apply environment overrides through a lookup function
    fn apply_env_with<F>(&mut self, get: F, allow_backend_switch: bool)
    where
        F: Fn(&str) -> Option<String>,
    {
        if allow_backend_switch {
            if let Some(raw) = get("AI_BACKEND") {
                match raw.parse::<BackendKind>() {
                    Ok(kind) => self.set_backend(kind),
                    Err(e) => {
                        tracing::warn!(backend = %raw, "{}, keeping {}", e, self.backend)
                    }
                }
            }
        }

        let (host_var, model_var, key_vars): (&str, &str, &[&str]) = match self.backend {
            BackendKind::Gemini => ("GEMINI_HOST", "GEMINI_MODEL", &["GEMINI_API_KEY", "API_KEY"]),
            BackendKind::OpenAICompatible => (
                "OPENAI_COMPATIBLE_HOST",
                "OPENAI_COMPATIBLE_MODEL",
                &["OPENAI_COMPATIBLE_API_KEY"],
            ),
            BackendKind::Ollama => ("OLLAMA_HOST", "OLLAMA_MODEL", &[]),
            BackendKind::Mock => return,
        };

        if let Some(host) = get(host_var).filter(|h| !h.trim().is_empty()) {
            self.host = host.trim_end_matches('/').to_string();
        }
        if let Some(model) = get(model_var).filter(|m| !m.trim().is_empty()) {
            self.default_model = model;
            self.task_models.clear();
        }
        if let Some(key) = key_vars
            .iter()
            .find_map(|var| get(var).filter(|k| !k.trim().is_empty()))
        {
            self.api_key = Some(key);
        }
    }
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("budgetlens").join("config").join("analyzer.toml"))
}

/// Load configuration (explicit path, then default override, then embedded)
fn load_file(path: Option<&Path>) -> Result<AnalyzerConfig> {
    let candidate = match path {
        Some(p) => {
            if !p.exists() {
                return Err(Error::Configuration(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            Some(p.to_path_buf())
        }
        None => default_config_path().filter(|p| p.exists()),
    };

    match candidate {
        Some(p) => {
            let content = fs::read_to_string(&p)
                .map_err(|e| Error::InvalidData(format!("Failed to read config: {}", e)))?;
            let mut config = parse_config(&content)?;
            config.source = Some(p);
            Ok(config)
        }
        None => parse_config(DEFAULT_CONFIG),
    }
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    backend: Option<RawBackend>,
    defaults: Option<RawDefaults>,
    tasks: Option<HashMap<String, RawTaskConfig>>,
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    kind: Option<String>,
    host: Option<String>,
    api_key: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTaskConfig {
    model: Option<String>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<AnalyzerConfig> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::InvalidData(format!("Invalid config TOML: {}", e)))?;

    let mut config = AnalyzerConfig::default();

    if let Some(backend) = raw.backend {
        if let Some(kind) = backend.kind {
            let kind = kind.parse::<BackendKind>().map_err(Error::Configuration)?;
            config.set_backend(kind);
        }
        if let Some(host) = backend.host {
            config.host = host.trim_end_matches('/').to_string();
        }
        config.api_key = backend.api_key.filter(|k| !k.trim().is_empty());
        if let Some(timeout) = backend.timeout_secs {
            config.timeout = Duration::from_secs(timeout);
        }
    }

    if let Some(model) = raw.defaults.and_then(|d| d.model) {
        config.default_model = model;
    }

    if let Some(tasks) = raw.tasks {
        for (key, task_config) in tasks {
            let Some(task) = TaskType::from_key(&key) else {
                tracing::warn!(task = %key, "Ignoring unknown task in analyzer config");
                continue;
            };
            if let Some(model) = task_config.model {
                if model != config.default_model {
                    config.task_models.insert(task, model);
                }
            }
        }
    }

    Ok(config)
}
