//! Error Types
//!
//! Every backend-facing failure is converted into a `ForgeError` before it
//! leaves the relay. Messages are written for the person at the form, not
//! for a log file.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    /// The article directory exists but holds no files at all
    #[error("No articles found in the articles directory")]
    NoArticles,

    /// Files exist but none of them is a .txt or .md document
    #[error("No valid article files found (.txt or .md files required)")]
    NoValidArticles,

    #[error("Please enter an article topic")]
    EmptyPrompt,

    #[error("Ollama server is not running. Please start Ollama with \"ollama serve\"")]
    BackendUnavailable,

    #[error(
        "The required AI model '{model}' is not installed. Please run:\n\nollama pull {model}\n\nIf you experience issues, you can try a different model like:\nollama pull llama2"
    )]
    ModelMissing { model: String },

    /// Non-success status, transport failure or in-band error from the backend
    #[error("Failed to connect to Ollama: {0}")]
    Upstream(String),

    #[error("Failed to read articles: {0}")]
    Corpus(#[from] std::io::Error),
}

impl ForgeError {
    /// HTTP status used when this error is rendered as a JSON payload
    pub fn status(&self) -> u16 {
        match self {
            ForgeError::NoArticles
            | ForgeError::NoValidArticles
            | ForgeError::EmptyPrompt
            | ForgeError::ModelMissing { .. } => 400,
            ForgeError::BackendUnavailable => 503,
            ForgeError::Upstream(_) | ForgeError::Corpus(_) => 500,
        }
    }
}

impl From<reqwest::Error> for ForgeError {
    fn from(err: reqwest::Error) -> Self {
        ForgeError::Upstream(err.to_string())
    }
}

pub type ForgeResult<T> = std::result::Result<T, ForgeError>;
