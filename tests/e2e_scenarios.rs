use async_trait::async_trait;
use futures::stream;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use article_forge::backend::{ByteStream, GenerateReply, ModelAvailability};
use article_forge::prompt::compose;
use article_forge::{
    ArticleBuffer, CorpusLoader, ForgeConfig, ForgeError, ForgeResult, GenerationRequest,
    InferenceBackend, Relay,
};

/// Replays a fixed byte stream, cut wherever the test says
struct ScriptedBackend {
    reachable: bool,
    chunks: Vec<Vec<u8>>,
    generate_calls: AtomicUsize,
    last_request: Mutex<Option<GenerationRequest>>,
}

impl ScriptedBackend {
    fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            reachable: true,
            chunks,
            generate_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }

    fn from_strs(chunks: &[&str]) -> Self {
        Self::new(chunks.iter().map(|c| c.as_bytes().to_vec()).collect())
    }

    /// Cut `bytes` at every offset in `cuts`
    fn segmented(bytes: &[u8], cuts: &[usize]) -> Self {
        let mut chunks = Vec::new();
        let mut start = 0;
        for &cut in cuts {
            chunks.push(bytes[start..cut].to_vec());
            start = cut;
        }
        chunks.push(bytes[start..].to_vec());
        Self::new(chunks)
    }
}

#[async_trait]
impl InferenceBackend for ScriptedBackend {
    async fn check_reachable(&self) -> bool {
        self.reachable
    }

    async fn check_model_installed(&self, _model: &str) -> ModelAvailability {
        ModelAvailability::Installed
    }

    async fn generate(&self, request: &GenerationRequest) -> ForgeResult<GenerateReply> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        Ok(GenerateReply { response: String::new() })
    }

    async fn generate_stream(&self, request: &GenerationRequest) -> ForgeResult<ByteStream> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        let chunks: Vec<ForgeResult<Vec<u8>>> = self.chunks.iter().cloned().map(Ok).collect();
        Ok(stream::iter(chunks).boxed())
    }
}

async fn fragments_of(backend: Arc<ScriptedBackend>) -> Vec<String> {
    let relay = Relay::new(backend, &ForgeConfig::default());
    let request = GenerationRequest::for_article(&ForgeConfig::default(), "p".into(), true);
    relay
        .relay(request)
        .map(|item| item.expect("relay should not fail").text)
        .collect()
        .await
}

const REPLY: &str = concat!(
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"<think>\",\"done\":false}\n",
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"short plan\",\"done\":false}\n",
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"</think>\\n\\n\",\"done\":false}\n",
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"Les robots \",\"done\":false}\n",
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"sont géniaux 🤖\",\"done\":false}\n",
    "{\"model\":\"deepseek-r1:1.5b\",\"response\":\"\",\"done\":true,\"eval_count\":5}\n",
);

fn expected_reply_fragments() -> Vec<String> {
    ["<think>", "short plan", "</think>\n\n", "Les robots ", "sont géniaux 🤖"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[tokio::test]
async fn test_e2e_robots_article() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sample.md"), "Robots are useful.").unwrap();

    let documents = CorpusLoader::new(dir.path()).load().await.unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].title, "sample");

    let config = ForgeConfig::default();
    let prompt = compose("robots", &documents);
    let backend = Arc::new(ScriptedBackend::from_strs(&[
        r#"{"response":"Robots "}"#,
        r#"{"response":"are great."}"#,
    ]));
    let relay = Relay::new(backend.clone(), &config);

    let mut buffer = ArticleBuffer::new();
    let mut fragments = Vec::new();
    let mut stream = relay.relay(GenerationRequest::for_article(&config, prompt, true));
    while let Some(item) = stream.next().await {
        let fragment = item.unwrap();
        buffer.push(&fragment.text);
        fragments.push(fragment.text);
    }

    assert_eq!(fragments, vec!["Robots ", "are great."]);
    assert_eq!(buffer.text(), "Robots are great.");
    assert_eq!(buffer.segments().body, "Robots are great.");

    let sent = backend.last_request.lock().unwrap().clone().unwrap();
    assert!(sent.stream);
    assert_eq!(sent.stop, vec!["<think></think>".to_string()]);
    assert!(sent.prompt.contains("Title: sample\n\nContent:\nRobots are useful.\n\n"));
    assert!(sent.prompt.contains("\"robots\""));
}

#[tokio::test]
async fn test_e2e_segmentation_does_not_change_fragments() {
    let bytes = REPLY.as_bytes();
    let expected = expected_reply_fragments();

    let whole = fragments_of(Arc::new(ScriptedBackend::segmented(bytes, &[]))).await;
    assert_eq!(whole, expected);

    // Every single cut point, including ones inside 'é' and the emoji
    for cut in 1..bytes.len() {
        let got = fragments_of(Arc::new(ScriptedBackend::segmented(bytes, &[cut]))).await;
        assert_eq!(got, expected, "cut at {}", cut);
    }

    // Fixed-width windows
    for width in [1usize, 2, 3, 5, 7, 16, 64] {
        let cuts: Vec<usize> = (width..bytes.len()).step_by(width).collect();
        let got = fragments_of(Arc::new(ScriptedBackend::segmented(bytes, &cuts))).await;
        assert_eq!(got, expected, "width {}", width);
    }
}

#[tokio::test]
async fn test_e2e_concatenation_matches_response_fields() {
    let fragments = fragments_of(Arc::new(ScriptedBackend::segmented(REPLY.as_bytes(), &[40, 41, 200]))).await;

    let expected: String = REPLY
        .lines()
        .map(|line| serde_json::from_str::<serde_json::Value>(line).unwrap())
        .filter_map(|v| v["response"].as_str().map(str::to_string))
        .collect();
    assert_eq!(fragments.concat(), expected);

    let mut buffer = ArticleBuffer::new();
    fragments.iter().for_each(|f| {
        buffer.push(f);
    });
    let segments = buffer.segments();
    assert_eq!(segments.thought.as_deref(), Some("short plan"));
    assert_eq!(segments.body, "Les robots sont géniaux 🤖");
}

const MALFORMED: &[&str] = &[
    "<html>502 Bad Gateway</html>\n",
    r#"{"response": oops}"#,
    r#"{"a":"#,
    r#"{"x":["#,
    r#"{"k":1,"m":"#,
    "{",
    r#"{"response":"unterminated"#,
];

#[tokio::test]
async fn test_e2e_malformed_chunk_between_good_ones() {
    for &bad in MALFORMED {
        // Mid-stream: more good data follows the good chunk after the bad one
        let backend = Arc::new(ScriptedBackend::from_strs(&[
            "{\"response\":\"first \"}\n",
            bad,
            "{\"response\":\"second \"}\n",
            "{\"response\":\"third\"}\n",
        ]));
        assert_eq!(fragments_of(backend).await, vec!["first ", "second ", "third"], "mid-stream {:?}", bad);

        // Next-to-last: the stream ends right after the good chunk
        let backend = Arc::new(ScriptedBackend::from_strs(&[
            "{\"response\":\"first \"}\n",
            bad,
            "{\"response\":\"second\"}\n",
        ]));
        assert_eq!(fragments_of(backend).await, vec!["first ", "second"], "next-to-last {:?}", bad);
    }
}

#[tokio::test]
async fn test_e2e_unreachable_backend_never_generates() {
    let mut scripted = ScriptedBackend::from_strs(&["{\"response\":\"x\"}"]);
    scripted.reachable = false;
    let backend = Arc::new(scripted);
    let relay = Relay::new(backend.clone(), &ForgeConfig::default());

    let items: Vec<_> = relay
        .relay(GenerationRequest::for_article(&ForgeConfig::default(), "p".into(), true))
        .collect()
        .await;

    assert_eq!(items.len(), 1);
    assert!(matches!(items[0], Err(ForgeError::BackendUnavailable)));
    assert_eq!(backend.generate_calls.load(Ordering::SeqCst), 0);
}

/// Upstream fed by the test through a channel, so the test can observe
/// when the relay lets go of it
struct ChannelBackend {
    body: Mutex<Option<mpsc::Receiver<ForgeResult<Vec<u8>>>>>,
}

#[async_trait]
impl InferenceBackend for ChannelBackend {
    async fn check_reachable(&self) -> bool {
        true
    }

    async fn check_model_installed(&self, _model: &str) -> ModelAvailability {
        ModelAvailability::Installed
    }

    async fn generate(&self, _request: &GenerationRequest) -> ForgeResult<GenerateReply> {
        Err(ForgeError::Upstream("not scripted".into()))
    }

    async fn generate_stream(&self, _request: &GenerationRequest) -> ForgeResult<ByteStream> {
        let rx = self.body.lock().unwrap().take().expect("stream opened once");
        Ok(ReceiverStream::new(rx).boxed())
    }
}

#[tokio::test]
async fn test_e2e_consumer_cancellation_releases_upstream() {
    let (tx, rx) = mpsc::channel(4);
    let backend = Arc::new(ChannelBackend { body: Mutex::new(Some(rx)) });
    let relay = Relay::new(backend, &ForgeConfig::default());
    let mut stream = relay.relay(GenerationRequest::for_article(&ForgeConfig::default(), "p".into(), true));

    tx.send(Ok(br#"{"response":"a"}"#.to_vec())).await.unwrap();
    let first = stream.next().await.unwrap().unwrap();
    assert_eq!(first.text, "a");
    assert!(!tx.is_closed());

    drop(stream);
    assert!(tx.is_closed());
}

#[tokio::test]
async fn test_e2e_completion_releases_upstream() {
    let (tx, rx) = mpsc::channel(4);
    let backend = Arc::new(ChannelBackend { body: Mutex::new(Some(rx)) });
    let relay = Relay::new(backend, &ForgeConfig::default());
    let mut stream = relay.relay(GenerationRequest::for_article(&ForgeConfig::default(), "p".into(), true));

    tx.send(Ok(br#"{"response":"only"}"#.to_vec())).await.unwrap();
    tx.send(Err(ForgeError::Upstream("reset".into()))).await.unwrap();

    assert_eq!(stream.next().await.unwrap().unwrap().text, "only");
    assert!(stream.next().await.unwrap().is_err());
    assert!(stream.next().await.is_none());
    assert!(tx.is_closed());
}

#[test]
fn test_e2e_partial_object_holds_until_completed() {
    let (tx, rx) = mpsc::channel(4);
    let backend = Arc::new(ChannelBackend { body: Mutex::new(Some(rx)) });
    let relay = Relay::new(backend, &ForgeConfig::default());
    let mut stream = relay.relay(GenerationRequest::for_article(&ForgeConfig::default(), "p".into(), true));
    let mut next = tokio_test::task::spawn(stream.next());

    tokio_test::assert_pending!(next.poll());

    tx.try_send(Ok(br#"{"response":"hal"#.to_vec())).unwrap();
    assert!(next.is_woken());
    tokio_test::assert_pending!(next.poll());

    tx.try_send(Ok(br#"f"}"#.to_vec())).unwrap();
    let item = tokio_test::assert_ready!(next.poll());
    assert_eq!(item.unwrap().unwrap().text, "half");
}
