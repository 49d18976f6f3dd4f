use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::backend::types::{GenerateReply, GenerationRequest, ModelAvailability, TagsResponse};
use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};

/// Raw body of a streaming generation: transport chunks, no framing implied
pub type ByteStream = BoxStream<'static, ForgeResult<Vec<u8>>>;

/// The inference backend as seen by the relay
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Liveness probe. Never fails; any problem reads as unreachable.
    async fn check_reachable(&self) -> bool;

    async fn check_model_installed(&self, model: &str) -> ModelAvailability;

    /// Single-shot generation (`stream: false`)
    async fn generate(&self, request: &GenerationRequest) -> ForgeResult<GenerateReply>;

    /// Open a streaming generation and hand back the undecoded body
    async fn generate_stream(&self, request: &GenerationRequest) -> ForgeResult<ByteStream>;
}

/// Ollama's HTTP API
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    probe_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(config: &ForgeConfig) -> Self {
        Self {
            client: Client::new(),
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            probe_timeout: config.probe_timeout,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_generate(&self, request: &GenerationRequest) -> ForgeResult<reqwest::Response> {
        let res = self.client.post(self.url("/api/generate"))
            .json(request)
            .send()
            .await?;

        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            warn!("Generation call rejected with {}: {}", status, body);
            let detail = if body.trim().is_empty() { status.to_string() } else { body };
            return Err(ForgeError::Upstream(format!("Ollama API error: {}", detail)));
        }
        Ok(res)
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn check_reachable(&self) -> bool {
        match self.client.get(self.url("/api/version"))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(res) => {
                debug!("Version probe answered {}", res.status());
                res.status().is_success()
            }
            Err(e) => {
                debug!("Version probe failed: {}", e);
                false
            }
        }
    }

    async fn check_model_installed(&self, model: &str) -> ModelAvailability {
        let res = match self.client.get(self.url("/api/tags"))
            .timeout(self.probe_timeout)
            .send()
            .await
        {
            Ok(res) if res.status().is_success() => res,
            Ok(res) => {
                warn!("Error checking model availability: tags returned {}", res.status());
                return ModelAvailability::Unknown;
            }
            Err(e) => {
                warn!("Error checking model availability: {}", e);
                return ModelAvailability::Unknown;
            }
        };

        let body = match res.text().await {
            Ok(body) => body,
            Err(e) => {
                warn!("Error checking model availability: {}", e);
                return ModelAvailability::Unknown;
            }
        };

        match serde_json::from_str::<TagsResponse>(&body) {
            Ok(tags) if tags.contains(model) => ModelAvailability::Installed,
            Ok(_) => ModelAvailability::Missing,
            Err(e) => {
                warn!("Error checking model availability: unreadable tags listing: {}", e);
                ModelAvailability::Unknown
            }
        }
    }

    async fn generate(&self, request: &GenerationRequest) -> ForgeResult<GenerateReply> {
        let res = self.post_generate(request).await?;
        let reply = res.json::<GenerateReply>().await?;
        Ok(reply)
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> ForgeResult<ByteStream> {
        let res = self.post_generate(request).await?;
        let body = res.bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()).map_err(ForgeError::from))
            .boxed();
        Ok(body)
    }
}
