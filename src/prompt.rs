//! Prompt Composer
//!
//! Pure string assembly: reference articles first, then the writing
//! instructions. Document order is kept exactly as loaded.

use crate::corpus::ReferenceDocument;

const BLOCK_DELIMITER: &str = "---\n";

/// Render the reference articles as `Title/Content` blocks joined by `---`
pub fn reference_blocks(documents: &[ReferenceDocument]) -> String {
    documents
        .iter()
        .map(|doc| format!("Title: {}\n\nContent:\n{}\n\n", doc.title, doc.content))
        .collect::<Vec<_>>()
        .join(BLOCK_DELIMITER)
}

/// Build the full instruction for one article about `topic`
pub fn compose(topic: &str, documents: &[ReferenceDocument]) -> String {
    let references = reference_blocks(documents);
    format!(
        "You are an expert content writer. Based on the following reference articles, \
write a new comprehensive article about \"{topic}\".\n\
Use the writing style, tone, and structure from these articles, but create entirely original content.\n\
Incorporate relevant insights and patterns from the source articles while maintaining originality.\n\
Do not include any thoughts or explanations about the writing process.\n\
Do not include any content within <think> tags.\n\
\n\
Reference Articles:\n\
{references}\n\
Write a well-structured, engaging article on the topic above:"
    )
}
