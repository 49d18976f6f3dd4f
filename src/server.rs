use axum::{
    body::Body,
    extract::{Json, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::backend::{GenerationRequest, InferenceBackend};
use crate::config::ForgeConfig;
use crate::corpus::CorpusLoader;
use crate::error::ForgeError;
use crate::prompt::compose;
use crate::relay::{FragmentStream, Relay};

/// Fragments buffered between the relay task and the response body
const FORWARD_CAPACITY: usize = 32;

/// Renders a `ForgeError` as `{ "error": ... }` with its status code
pub struct ServerError(ForgeError);

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            error!("Article generation failed: {}", self.0);
        } else {
            warn!("Article request rejected: {}", self.0);
        }
        (status, Json(serde_json::json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<ForgeError> for ServerError {
    fn from(err: ForgeError) -> Self {
        Self(err)
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ForgeConfig>,
    pub corpus: Arc<CorpusLoader>,
    pub relay: Relay,
}

impl AppState {
    pub fn new(config: ForgeConfig, backend: Arc<dyn InferenceBackend>) -> Self {
        let relay = Relay::new(backend, &config);
        let corpus = Arc::new(CorpusLoader::new(config.articles_dir.clone()));
        Self { config: Arc::new(config), corpus, relay }
    }
}

#[derive(Deserialize)]
struct GenerateArticleRequest {
    #[serde(default)]
    prompt: String,
    #[serde(default = "default_stream")]
    stream: bool,
}

fn default_stream() -> bool {
    true
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(|| async { "OK" }))
        .route("/api/generate", post(generate_article))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState) -> anyhow::Result<()> {
    let addr = state.config.bind_addr();
    let app = router(state);

    info!("🚀 Article Forge listening at http://{}", addr);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

fn plain_text(body: Body) -> Response {
    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], body).into_response()
}

async fn generate_article(
    State(state): State<AppState>,
    Json(req): Json<GenerateArticleRequest>,
) -> Result<Response, ServerError> {
    let topic = req.prompt.trim();
    if topic.is_empty() {
        return Err(ForgeError::EmptyPrompt.into());
    }

    let documents = state.corpus.load().await?;
    info!("Generating article about {:?} from {} references", topic, documents.len());

    let prompt = compose(topic, &documents);
    let request = GenerationRequest::for_article(&state.config, prompt, req.stream);

    if !req.stream {
        let fragment = state.relay.generate_once(request).await?;
        return Ok(plain_text(Body::from(fragment.text)));
    }

    let fragments = state.relay.start(request).await?;
    let (tx, rx) = mpsc::channel(FORWARD_CAPACITY);
    tokio::spawn(forward(fragments, tx));

    Ok(plain_text(Body::from_stream(ReceiverStream::new(rx))))
}

/// Pump relay fragments into the response body until the relay ends or the
/// client goes away. Returning drops the relay and its upstream connection.
async fn forward(mut fragments: FragmentStream, tx: mpsc::Sender<Result<String, ForgeError>>) {
    loop {
        let next = tokio::select! {
            _ = tx.closed() => {
                info!("Client disconnected, releasing upstream");
                return;
            }
            next = fragments.next() => next,
        };

        let Some(item) = next else { return };
        let failed = item.is_err();
        if let Err(e) = &item {
            error!("Relay failed after streaming began, truncating article: {}", e);
        }
        if tx.send(item.map(|f| f.text)).await.is_err() {
            info!("Client disconnected, releasing upstream");
            return;
        }
        if failed {
            return;
        }
    }
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>AI Article Generator</title>
    <script src="https://cdn.jsdelivr.net/npm/marked/marked.min.js"></script>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; max-width: 960px; margin: 40px auto; padding: 0 16px; color: #222; }
        h1 { text-align: center; }
        form { display: flex; gap: 8px; margin-bottom: 8px; }
        input { flex: 1; padding: 8px; font-size: 15px; }
        button { padding: 8px 16px; }
        .hint { color: #777; font-size: 13px; }
        .error { background: #fdecea; border: 1px solid #f5c2c0; color: #8a1c17; padding: 12px; border-radius: 4px; white-space: pre-wrap; display: none; }
        details { margin: 16px 0; color: #666; }
        details pre { white-space: pre-wrap; font-size: 13px; }
        #article { font-family: Georgia, serif; line-height: 1.6; }
    </style>
</head>
<body>
    <h1>AI Article Generator</h1>
    <div class="error" id="error"></div>
    <form id="form">
        <input id="prompt" placeholder="Enter your article topic or theme" autocomplete="off">
        <button id="submit" type="submit">Generate Article</button>
    </form>
    <p class="hint">Place your reference articles (.txt or .md files) in the articles directory.</p>
    <details id="thought-panel" style="display:none"><summary>Model thoughts</summary><pre id="thought"></pre></details>
    <div id="article"></div>

    <script>
        const form = document.getElementById('form');
        const promptInput = document.getElementById('prompt');
        const submit = document.getElementById('submit');
        const errorBox = document.getElementById('error');
        const thoughtPanel = document.getElementById('thought-panel');
        const thought = document.getElementById('thought');
        const article = document.getElementById('article');
        const THOUGHT = /<think>([\s\S]*?)<\/think>/;

        function render(buffer) {
            const match = buffer.match(THOUGHT);
            let body = buffer;
            if (match) {
                thoughtPanel.style.display = 'block';
                thought.textContent = match[1].trim();
                body = buffer.slice(0, match.index) + buffer.slice(match.index + match[0].length);
            }
            article.innerHTML = marked.parse(body.trim());
        }

        form.addEventListener('submit', async (e) => {
            e.preventDefault();
            const prompt = promptInput.value.trim();
            if (!prompt) return;

            submit.disabled = true;
            submit.textContent = 'Generating...';
            errorBox.style.display = 'none';
            thoughtPanel.style.display = 'none';
            thought.textContent = '';
            article.innerHTML = '';

            try {
                const res = await fetch('/api/generate', {
                    method: 'POST',
                    headers: { 'Content-Type': 'application/json' },
                    body: JSON.stringify({ prompt }),
                });
                if (!res.ok) {
                    const data = await res.json().catch(() => ({}));
                    throw new Error(data.error || 'Failed to generate article');
                }
                const reader = res.body.getReader();
                const decoder = new TextDecoder();
                let buffer = '';
                for (;;) {
                    const { done, value } = await reader.read();
                    if (done) break;
                    buffer += decoder.decode(value, { stream: true });
                    render(buffer);
                }
                buffer += decoder.decode();
                render(buffer);
            } catch (err) {
                errorBox.textContent = err.message;
                errorBox.style.display = 'block';
            } finally {
                submit.disabled = false;
                submit.textContent = 'Generate Article';
            }
        });
    </script>
</body>
</html>"#;
