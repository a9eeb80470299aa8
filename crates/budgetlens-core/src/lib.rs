//! BudgetLens Core Library
//!
//! Extraction-classification pipeline for a personal budgeting app:
//! - Receipt photo → draft expense with category and subcategory
//! - Statement PDF → budget lines classified into subcategories
//! - Pluggable inference backends (Gemini, OpenAI-compatible servers, Ollama)
//! - Built-in spending taxonomy with customizable subcategories
//! - Prompt library for customizable AI prompts
//! - Layered configuration (embedded defaults, override file, environment)

pub mod ai;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod matching;
pub mod models;
pub mod prompts;
pub mod taxonomy;

/// Test utilities including a mock Gemini server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{
    BackendInfo, GeminiBackend, InferenceBackend, InferenceClient, InferenceRequest, Media,
    MockBackend, OllamaBackend, OpenAICompatibleBackend, RecordedRequest,
};
pub use analyzer::Analyzer;
pub use config::{AnalyzerConfig, BackendKind, TaskType};
pub use error::{AnalysisStage, Error, Result};
pub use matching::{match_line_items, MatchPartition, HEURISTIC_RULES};
pub use models::{BudgetPlan, ClassifiedLineItem, ExtractedLineItem, MergeStrategy, ReceiptData};
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary};
pub use taxonomy::{CategoryGroup, MainCategory, Taxonomy};
