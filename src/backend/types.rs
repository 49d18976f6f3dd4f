use serde::{Deserialize, Serialize};

use crate::config::ForgeConfig;

/// Body of `POST /api/generate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationRequest {
    pub model: String,
    pub prompt: String,
    pub stream: bool,
    pub stop: Vec<String>,
}

impl GenerationRequest {
    /// Request for one article using the configured model and stop sequences
    pub fn for_article(config: &ForgeConfig, prompt: String, stream: bool) -> Self {
        Self {
            model: config.model.clone(),
            prompt,
            stream,
            stop: config.stop.clone(),
        }
    }

    pub fn streaming(self, stream: bool) -> Self {
        Self { stream, ..self }
    }
}

/// Non-streaming reply: one object carrying the whole text
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateReply {
    #[serde(default)]
    pub response: String,
}

/// One object of a streaming reply. Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct GenerateChunk {
    #[serde(default)]
    pub response: Option<String>,
    #[serde(default)]
    pub done: bool,
    /// In-band failure report, e.g. the model runner crashed mid-generation
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelDescriptor {
    pub name: String,
}

/// `GET /api/tags`
#[derive(Debug, Clone, Deserialize)]
pub struct TagsResponse {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl TagsResponse {
    pub fn contains(&self, model: &str) -> bool {
        self.models.iter().any(|m| m.name == model)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelAvailability {
    Installed,
    Missing,
    /// The listing could not be fetched or parsed
    Unknown,
}

/// Decoded `response` text of one stream object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationFragment {
    pub text: String,
}

impl GenerationFragment {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}
