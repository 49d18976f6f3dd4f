//! Client Renderer
//!
//! Accumulates relayed fragments and splits the text into the model's
//! `<think>` section and the article body. The split is recomputed from the
//! whole buffer after every fragment.

use regex::Regex;
use std::sync::OnceLock;

pub const THOUGHT_OPEN: &str = "<think>";
pub const THOUGHT_CLOSE: &str = "</think>";

fn thought_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<think>(.*?)</think>").expect("thought pattern is valid"))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Segments {
    /// Text inside the first complete `<think>` pair
    pub thought: Option<String>,
    /// Everything else; this is what gets rendered as the article
    pub body: String,
}

/// Split `text` on the first complete thought pair. An unclosed `<think>`
/// is left in the body.
pub fn split_segments(text: &str) -> Segments {
    match thought_pattern().captures(text) {
        Some(caps) => {
            let span = caps.get(0).map(|m| m.range()).unwrap_or(0..0);
            let thought = caps.get(1).map(|m| m.as_str().trim().to_string());
            let body = format!("{}{}", &text[..span.start], &text[span.end..]);
            Segments { thought, body: body.trim().to_string() }
        }
        None => Segments { thought: None, body: text.trim().to_string() },
    }
}

#[derive(Debug, Default)]
pub struct ArticleBuffer {
    text: String,
}

impl ArticleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, fragment: &str) -> Segments {
        self.text.push_str(fragment);
        self.segments()
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> Segments {
        split_segments(&self.text)
    }

    /// True while a `<think>` has been opened and not yet closed
    pub fn thought_open(&self) -> bool {
        match self.text.rfind(THOUGHT_OPEN) {
            Some(open) => !self.text[open..].contains(THOUGHT_CLOSE),
            None => false,
        }
    }
}
