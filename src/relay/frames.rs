//! Frame extraction from a decoded generation stream.
//!
//! The backend writes one JSON object per generation step, but the transport
//! is free to cut the bytes anywhere. Decoded text accumulates in a pending
//! buffer and complete objects are pulled off its front; whatever cannot
//! start or finish an object is handed back as `Frame::Unparsed`.

use serde_json::Value;

use crate::backend::GenerateChunk;
use crate::utils::Utf8StreamDecoder;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Parsed(GenerateChunk),
    /// Text skipped while resynchronising. Only ever logged.
    Unparsed(String),
}

pub struct FrameDecoder {
    utf8: Utf8StreamDecoder,
    pending: String,
    max_pending_bytes: usize,
}

impl FrameDecoder {
    pub fn new(max_pending_bytes: usize) -> Self {
        Self {
            utf8: Utf8StreamDecoder::new(),
            pending: String::new(),
            max_pending_bytes,
        }
    }

    /// Feed one transport chunk and return every frame it completes
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Frame> {
        let text = self.utf8.decode(chunk);
        self.pending.push_str(&text);

        let mut frames = self.drain();
        if self.pending.len() > self.max_pending_bytes {
            frames.push(Frame::Unparsed(std::mem::take(&mut self.pending)));
        }
        frames
    }

    /// End of stream: flush the decoder, then give up on each object that
    /// never closed and retry from the next `{` after it.
    pub fn finish(&mut self) -> Vec<Frame> {
        let tail = self.utf8.finish();
        self.pending.push_str(&tail);

        let mut frames = self.drain();
        // drain() leaves either nothing or an unterminated object starting at 0
        while !self.pending.is_empty() {
            let skip = self
                .pending
                .char_indices()
                .skip(1)
                .find(|&(_, c)| c == '{')
                .map_or(self.pending.len(), |(i, _)| i);
            frames.push(Frame::Unparsed(self.pending.drain(..skip).collect()));
            frames.extend(self.drain());
        }
        frames
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    fn drain(&mut self) -> Vec<Frame> {
        let mut frames = Vec::new();
        let mut consumed = 0;

        loop {
            let rest = &self.pending[consumed..];
            let body = rest.trim_start();
            let lead = rest.len() - body.len();

            if body.is_empty() {
                consumed = self.pending.len();
                break;
            }

            if !body.starts_with('{') {
                let skip = body.find('{').unwrap_or(body.len());
                frames.push(Frame::Unparsed(body[..skip].to_string()));
                consumed += lead + skip;
                continue;
            }

            let mut values = serde_json::Deserializer::from_str(body).into_iter::<Value>();
            match values.next() {
                Some(Ok(value)) => {
                    let end = values.byte_offset();
                    frames.push(match serde_json::from_value::<GenerateChunk>(value) {
                        Ok(chunk) => Frame::Parsed(chunk),
                        Err(_) => Frame::Unparsed(body[..end].to_string()),
                    });
                    consumed += lead + end;
                }
                Some(Err(e)) if e.is_eof() => {
                    // Object still arriving
                    consumed += lead;
                    break;
                }
                Some(Err(_)) => {
                    let skip = body[1..].find('{').map(|i| i + 1).unwrap_or(body.len());
                    frames.push(Frame::Unparsed(body[..skip].to_string()));
                    consumed += lead + skip;
                }
                None => {
                    consumed += lead;
                    break;
                }
            }
        }

        self.pending.drain(..consumed);
        frames
    }
}
