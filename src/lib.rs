//! Article Forge
//!
//! Generates articles in the style of a local reference corpus by relaying
//! prompts to an Ollama-compatible inference server:
//! - Reference corpus loading from a plain directory of .txt/.md files
//! - Deterministic prompt composition
//! - Backend liveness and model probes
//! - A streaming relay that survives arbitrary transport chunking
//! - An axum front-end and a terminal client

pub mod backend;
pub mod config;
pub mod corpus;
pub mod error;
pub mod prompt;
pub mod relay;
pub mod render;
pub mod server;
pub mod utils;

// Re-exports for convenience
pub use backend::{GenerationFragment, GenerationRequest, InferenceBackend, OllamaBackend};
pub use config::ForgeConfig;
pub use corpus::{CorpusLoader, ReferenceDocument};
pub use error::{ForgeError, ForgeResult};
pub use relay::{FragmentStream, Relay};
pub use render::ArticleBuffer;
