//! Runtime Configuration
//!
//! Every component receives a `ForgeConfig` at construction; nothing reads
//! the environment after startup.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "deepseek-r1:1.5b";
pub const DEFAULT_STOP: &str = "<think></think>";

#[derive(Debug, Clone)]
pub struct ForgeConfig {
    /// Base URL of the inference backend, without trailing slash
    pub backend_url: String,
    /// Model name sent with every generation request
    pub model: String,
    /// Directory holding the reference articles
    pub articles_dir: PathBuf,
    /// Port the HTTP server binds on 0.0.0.0
    pub port: u16,
    /// Upper bound for the liveness and model probes
    pub probe_timeout: Duration,
    pub stop: Vec<String>,
    /// Whether the relay checks `/api/tags` before generating
    pub verify_model: bool,
    /// Cap on decoded text waiting for a complete JSON value
    pub max_pending_bytes: usize,
}

impl Default for ForgeConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            articles_dir: PathBuf::from("articles"),
            port: 3000,
            probe_timeout: Duration::from_secs(5),
            stop: vec![DEFAULT_STOP.to_string()],
            verify_model: true,
            max_pending_bytes: 1024 * 1024,
        }
    }
}

impl ForgeConfig {
    /// Build from `FORGE_*` environment variables, falling back to defaults.
    /// Call `dotenv::dotenv()` first to pick up a local `.env`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let backend_url = lookup("FORGE_BACKEND_URL")
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or(defaults.backend_url);
        let model = lookup("FORGE_MODEL").unwrap_or(defaults.model);
        let articles_dir = lookup("FORGE_ARTICLES_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.articles_dir);
        let port = lookup("FORGE_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(defaults.port);
        let probe_timeout = lookup("FORGE_PROBE_TIMEOUT_SECS")
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.probe_timeout);
        let stop = lookup("FORGE_STOP")
            .map(|s| {
                s.split('|')
                    .filter(|part| !part.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or(defaults.stop);
        let verify_model = lookup("FORGE_VERIFY_MODEL")
            .map(|v| v != "0")
            .unwrap_or(defaults.verify_model);
        let max_pending_bytes = lookup("FORGE_MAX_PENDING_BYTES")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.max_pending_bytes);

        Self {
            backend_url,
            model,
            articles_dir,
            port,
            probe_timeout,
            stop,
            verify_model,
            max_pending_bytes,
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("0.0.0.0:{}", self.port)
    }
}
