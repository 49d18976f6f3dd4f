//! Streaming Response Relay
//!
//! Turns a chunked `/api/generate` body into an ordered stream of text
//! fragments. The handshake (liveness probe, model probe, generation call)
//! runs once; after that the relay is a plain read loop:
//!
//! ```text
//! Idle -> AwaitingBackend -> Streaming -> Completed
//!   \            \              \
//!    +------------+--------------+--> Failed
//! ```
//!
//! Each relay owns its upstream body. Dropping the fragment stream, whether
//! on completion, failure or consumer cancellation, drops the body and
//! releases the connection.

mod frames;

pub use frames::{Frame, FrameDecoder};

use futures::stream::{self, BoxStream};
use futures_util::StreamExt;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::backend::{ByteStream, GenerationFragment, GenerationRequest, InferenceBackend, ModelAvailability};
use crate::config::ForgeConfig;
use crate::error::{ForgeError, ForgeResult};
use crate::utils::truncate_text;

/// Fragments in arrival order, ending after the first error
pub type FragmentStream = BoxStream<'static, ForgeResult<GenerationFragment>>;

const LOG_PREVIEW_BYTES: usize = 120;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayPhase {
    Idle,
    AwaitingBackend,
    Streaming,
    Completed,
    Failed,
}

impl RelayPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayPhase::Completed | RelayPhase::Failed)
    }
}

#[derive(Clone)]
pub struct Relay {
    backend: Arc<dyn InferenceBackend>,
    verify_model: bool,
    max_pending_bytes: usize,
}

impl Relay {
    pub fn new(backend: Arc<dyn InferenceBackend>, config: &ForgeConfig) -> Self {
        Self {
            backend,
            verify_model: config.verify_model,
            max_pending_bytes: config.max_pending_bytes,
        }
    }

    /// Probe the backend and the model before any generation call
    async fn handshake(&self, request: &GenerationRequest) -> ForgeResult<()> {
        debug!(phase = ?RelayPhase::Idle, "Probing backend liveness");
        if !self.backend.check_reachable().await {
            warn!(phase = ?RelayPhase::Failed, "Backend unreachable, generation skipped");
            return Err(ForgeError::BackendUnavailable);
        }

        debug!(phase = ?RelayPhase::AwaitingBackend, "Backend reachable");
        if self.verify_model {
            match self.backend.check_model_installed(&request.model).await {
                ModelAvailability::Installed => {}
                ModelAvailability::Missing => {
                    warn!(phase = ?RelayPhase::Failed, "Model {} is not installed", request.model);
                    return Err(ForgeError::ModelMissing { model: request.model.clone() });
                }
                ModelAvailability::Unknown => {
                    warn!("Model availability unknown for {}, proceeding", request.model);
                }
            }
        }
        Ok(())
    }

    /// Run the handshake now and return the open fragment stream. Failures
    /// before the first byte surface here as a typed error.
    pub async fn start(&self, request: GenerationRequest) -> ForgeResult<FragmentStream> {
        let relay_id = Uuid::new_v4();
        let span = info_span!("relay", %relay_id, model = %request.model);

        async move {
            let request = request.streaming(true);
            self.handshake(&request).await?;

            let body = self.backend.generate_stream(&request).await.inspect_err(|e| {
                warn!(phase = ?RelayPhase::Failed, "Generation call failed: {}", e);
            })?;
            info!(phase = ?RelayPhase::Streaming, "Upstream stream open");

            Ok::<_, ForgeError>(RelayStream::new(relay_id, body, self.max_pending_bytes).into_stream())
        }
        .instrument(span)
        .await
    }

    /// Lazy form of [`Relay::start`]: nothing happens until the stream is
    /// polled, and a handshake failure arrives as the only item.
    pub fn relay(&self, request: GenerationRequest) -> FragmentStream {
        let relay = self.clone();
        stream::once(async move { relay.start(request).await })
            .flat_map(|started| match started {
                Ok(fragments) => fragments,
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            })
            .boxed()
    }

    /// Non-streaming generation: the whole `response` as one fragment
    pub async fn generate_once(&self, request: GenerationRequest) -> ForgeResult<GenerationFragment> {
        let relay_id = Uuid::new_v4();
        let span = info_span!("relay", %relay_id, model = %request.model);

        async move {
            let request = request.streaming(false);
            self.handshake(&request).await?;
            let reply = self.backend.generate(&request).await?;
            info!(phase = ?RelayPhase::Completed, "Received {} bytes in one reply", reply.response.len());
            Ok::<_, ForgeError>(GenerationFragment::new(reply.response))
        }
        .instrument(span)
        .await
    }
}

/// Read-loop state for one open upstream body
struct RelayStream {
    relay_id: Uuid,
    /// `None` once the upstream has been released
    body: Option<ByteStream>,
    frames: FrameDecoder,
    ready: VecDeque<ForgeResult<GenerationFragment>>,
    phase: RelayPhase,
    emitted: usize,
}

impl RelayStream {
    fn new(relay_id: Uuid, body: ByteStream, max_pending_bytes: usize) -> Self {
        Self {
            relay_id,
            body: Some(body),
            frames: FrameDecoder::new(max_pending_bytes),
            ready: VecDeque::new(),
            phase: RelayPhase::Streaming,
            emitted: 0,
        }
    }

    fn into_stream(self) -> FragmentStream {
        stream::unfold(self, |mut state| async move {
            loop {
                if let Some(item) = state.ready.pop_front() {
                    return Some((item, state));
                }
                if state.phase.is_terminal() {
                    return None;
                }
                state.advance().await;
            }
        })
        .boxed()
    }

    /// Read one chunk from upstream and queue whatever it yields
    async fn advance(&mut self) {
        let Some(body) = self.body.as_mut() else {
            self.phase = RelayPhase::Completed;
            return;
        };

        let next = body.next().await;
        match next {
            Some(Ok(chunk)) => {
                let frames = self.frames.push(&chunk);
                self.accept(frames);
            }
            Some(Err(e)) => {
                warn!(relay_id = %self.relay_id, "Upstream read failed: {}", e);
                self.fail(e);
            }
            None => {
                let frames = self.frames.finish();
                self.accept(frames);
                if self.phase == RelayPhase::Streaming {
                    self.phase = RelayPhase::Completed;
                    self.body = None;
                    info!(relay_id = %self.relay_id, "Relay completed after {} fragments", self.emitted);
                }
            }
        }
    }

    fn accept(&mut self, frames: Vec<Frame>) {
        for frame in frames {
            if self.phase.is_terminal() {
                break;
            }
            match frame {
                Frame::Parsed(chunk) => {
                    if let Some(error) = chunk.error {
                        warn!(relay_id = %self.relay_id, "Backend reported error mid-stream: {}", error);
                        self.fail(ForgeError::Upstream(error));
                        continue;
                    }
                    if chunk.done {
                        debug!(relay_id = %self.relay_id, "Backend signalled done");
                    }
                    if let Some(text) = chunk.response.filter(|t| !t.is_empty()) {
                        self.emitted += 1;
                        self.ready.push_back(Ok(GenerationFragment { text }));
                    }
                }
                Frame::Unparsed(raw) => {
                    warn!(
                        relay_id = %self.relay_id,
                        "Skipping unparsable stream data: {:?}",
                        truncate_text(&raw, LOG_PREVIEW_BYTES)
                    );
                }
            }
        }
    }

    fn fail(&mut self, error: ForgeError) {
        self.ready.push_back(Err(error));
        self.phase = RelayPhase::Failed;
        self.body = None;
    }
}
