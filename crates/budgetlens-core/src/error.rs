//! Error types for budgetlens

use std::fmt;

use thiserror::Error;

/// Pipeline stage an inference response belongs to
///
/// Carried by response errors so the caller can tell a failed receipt
/// analysis apart from a failed statement extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStage {
    /// Single-call receipt image analysis
    Receipt,
    /// Stage 1 of the statement flow (line item extraction)
    StatementExtraction,
    /// Stage 3 of the statement flow (classification of unmatched items)
    LineItemClassification,
}

impl AnalysisStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Receipt => "receipt analysis",
            Self::StatementExtraction => "statement extraction",
            Self::LineItemClassification => "line item classification",
        }
    }
}

impl fmt::Display for AnalysisStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Empty response from model during {0}")]
    EmptyResponse(AnalysisStage),

    #[error("Invalid JSON from model during {stage}: {message}")]
    Parse {
        stage: AnalysisStage,
        message: String,
    },

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unsupported media: {0}")]
    UnsupportedMedia(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Stage this error is tied to, if it came from decoding a model response
    pub fn stage(&self) -> Option<AnalysisStage> {
        match self {
            Self::EmptyResponse(stage) | Self::Parse { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
