//! Backend Module
//!
//! Availability probes and generation calls against an Ollama-compatible
//! inference server.

mod provider;
mod types;

pub use provider::{ByteStream, InferenceBackend, OllamaBackend};
pub use types::{
    GenerateChunk, GenerateReply, GenerationFragment, GenerationRequest, ModelAvailability,
    ModelDescriptor, TagsResponse,
};
