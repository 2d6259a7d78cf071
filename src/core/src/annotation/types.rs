use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error_handling::types::AnnotationError;

/// Output language requested from the annotation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Ar,
}

impl Language {
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Ar => "ar",
        }
    }

    /// English name used inside prompts.
    pub fn display_name(self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Ar => "Arabic",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationRequest {
    pub summary: String,
    pub context: String,
    pub language: Language,
}

impl AnnotationRequest {
    pub fn new<S: Into<String>, C: Into<String>>(summary: S, context: C, language: Language) -> Self {
        Self {
            summary: summary.into(),
            context: context.into(),
            language,
        }
    }
}

/// External text-generation capability: prompt material in, opaque prose out.
#[async_trait]
pub trait Annotator: Send + Sync {
    /// Annotates a single telemetry record.
    async fn annotate(&self, request: &AnnotationRequest) -> Result<String, AnnotationError>;

    /// Sends a fully built prompt, used by the batch and report analyses.
    async fn generate(&self, prompt: &str) -> Result<String, AnnotationError>;
}
