//! Inference request types
//!
//! These types are backend-agnostic and used across all inference implementations.

use std::collections::HashMap;

use base64::Engine;

use crate::config::{AnalyzerConfig, TaskType};
use crate::error::{Error, Result};

pub const MIME_JPEG: &str = "image/jpeg";
pub const MIME_PNG: &str = "image/png";
pub const MIME_GIF: &str = "image/gif";
pub const MIME_WEBP: &str = "image/webp";
pub const MIME_PDF: &str = "application/pdf";

/// A document sent to the model alongside the prompt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Media {
    mime_type: &'static str,
    bytes: Vec<u8>,
}

impl Media {
    /// Wrap receipt image bytes, sniffing the format from magic bytes
    ///
    /// Unrecognized formats are sent as JPEG.
    pub fn image(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidData("Image is empty".into()));
        }
        let mime_type = sniff_image_type(&bytes).unwrap_or(MIME_JPEG);
        Ok(Self { mime_type, bytes })
    }

    /// Wrap statement PDF bytes
    pub fn pdf(bytes: Vec<u8>) -> Result<Self> {
        if bytes.is_empty() {
            return Err(Error::InvalidData("PDF document is empty".into()));
        }
        if !bytes.starts_with(b"%PDF") {
            tracing::warn!("Document does not start with a %PDF header, sending anyway");
        }
        Ok(Self {
            mime_type: MIME_PDF,
            bytes,
        })
    }

    pub fn mime_type(&self) -> &'static str {
        self.mime_type
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn is_pdf(&self) -> bool {
        self.mime_type == MIME_PDF
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// `data:<mime>;base64,<payload>` form used by OpenAI-style APIs
    pub fn to_data_uri(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, self.to_base64())
    }
}

fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(MIME_JPEG)
    } else if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some(MIME_PNG)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(MIME_GIF)
    } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some(MIME_WEBP)
    } else {
        None
    }
}

/// One media blob plus one prompt
#[derive(Debug, Clone, Copy)]
pub struct InferenceRequest<'a> {
    pub media: &'a Media,
    pub prompt: &'a str,
    /// Used for model routing
    pub task: TaskType,
}

/// Model selection per task type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRoutes {
    default_model: String,
    task_models: HashMap<TaskType, String>,
}

impl ModelRoutes {
    /// Route every task to one model
    pub fn single(model: &str) -> Self {
        Self {
            default_model: model.to_string(),
            task_models: HashMap::new(),
        }
    }

    pub fn from_config(config: &AnalyzerConfig) -> Self {
        Self {
            default_model: config.default_model.clone(),
            task_models: config.task_models.clone(),
        }
    }

    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    pub fn model_for_task(&self, task: TaskType) -> &str {
        self.task_models
            .get(&task)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }

    /// Task overrides that differ from the default, in task order
    pub fn overrides(&self) -> Vec<(String, String)> {
        TaskType::all()
            .iter()
            .filter_map(|task| {
                let model = self.model_for_task(*task);
                (model != self.default_model)
                    .then(|| (task.as_str().to_string(), model.to_string()))
            })
            .collect()
    }
}

/// Backend description for display
#[derive(Debug, Clone)]
pub struct BackendInfo {
    /// Backend kind (gemini, openai_compatible, ollama, mock)
    pub kind: String,
    pub host: String,
    pub default_model: String,
    /// Task-specific model overrides (only non-default)
    pub task_models: Vec<(String, String)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_sniffing() {
        let png = Media::image(b"\x89PNG\r\n\x1a\n rest".to_vec()).unwrap();
        assert_eq!(png.mime_type(), MIME_PNG);

        let jpeg = Media::image(vec![0xFF, 0xD8, 0xFF, 0xE0, 0x00]).unwrap();
        assert_eq!(jpeg.mime_type(), MIME_JPEG);

        let webp = Media::image(b"RIFF\x00\x00\x00\x00WEBPVP8 ".to_vec()).unwrap();
        assert_eq!(webp.mime_type(), MIME_WEBP);

        let unknown = Media::image(b"not an image".to_vec()).unwrap();
        assert_eq!(unknown.mime_type(), MIME_JPEG);
    }

    #[test]
    fn test_empty_media_rejected() {
        assert!(matches!(Media::image(vec![]), Err(Error::InvalidData(_))));
        assert!(matches!(Media::pdf(vec![]), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_model_routes() {
        let mut config = AnalyzerConfig::default();
        config.default_model = "base".into();
        config
            .task_models
            .insert(TaskType::StatementExtraction, "long-context".into());

        let routes = ModelRoutes::from_config(&config);
        assert_eq!(routes.model_for_task(TaskType::ReceiptAnalysis), "base");
        assert_eq!(
            routes.model_for_task(TaskType::StatementExtraction),
            "long-context"
        );
        assert_eq!(
            routes.overrides(),
            vec![("statement_extraction".to_string(), "long-context".to_string())]
        );
        assert!(ModelRoutes::single("m").overrides().is_empty());
    }

    #[test]
    fn test_pdf_data_uri() {
        let pdf = Media::pdf(b"%PDF-1.4".to_vec()).unwrap();
        assert!(pdf.is_pdf());
        assert_eq!(pdf.to_base64(), "JVBERi0xLjQ=");
        assert_eq!(pdf.to_data_uri(), "data:application/pdf;base64,JVBERi0xLjQ=");
    }
}
