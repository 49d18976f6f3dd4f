//! Reference Corpus Loader
//!
//! Scans the article directory on every request and returns the `.txt` and
//! `.md` documents in directory-listing order. Nothing is cached.

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::{ForgeError, ForgeResult};

pub const PLACEHOLDER_FILE: &str = "sample-article.md";

const PLACEHOLDER_ARTICLE: &str = "# Welcome to the Article Generator

This placeholder was created because the articles directory did not exist yet.

## Adding Reference Articles

1. Put plain text (.txt) or markdown (.md) files in the articles directory
2. Give each article a clear title and body
3. New articles are generated in the style of these references

## Example Structure

Title: The Future of Technology
Date: 2024-02-27

Machine learning keeps changing how software gets written...

## Next Steps

Replace this file with your own articles for better results.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDocument {
    pub title: String,
    pub content: String,
}

pub struct CorpusLoader {
    dir: PathBuf,
}

impl CorpusLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the directory with a placeholder article on first run
    pub async fn ensure_bootstrapped(&self) -> ForgeResult<()> {
        if fs::try_exists(&self.dir).await? {
            return Ok(());
        }
        info!("Articles directory {:?} missing, creating placeholder", self.dir);
        fs::create_dir_all(&self.dir).await?;
        fs::write(self.dir.join(PLACEHOLDER_FILE), PLACEHOLDER_ARTICLE).await?;
        Ok(())
    }

    /// Load every reference document. Fails with `NoArticles` when the
    /// directory is empty and `NoValidArticles` when nothing qualifies.
    pub async fn load(&self) -> ForgeResult<Vec<ReferenceDocument>> {
        self.ensure_bootstrapped().await?;

        let mut entries = fs::read_dir(&self.dir).await?;
        let mut seen = 0usize;
        let mut documents = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            seen += 1;
            let path = entry.path();
            let Some(title) = document_title(&path) else {
                debug!("Skipping non-article entry {:?}", path);
                continue;
            };
            // Follows symlinks
            if !fs::metadata(&path).await?.is_file() {
                continue;
            }
            let bytes = fs::read(&path).await?;
            let content = match String::from_utf8(bytes) {
                Ok(content) => content,
                Err(e) => {
                    warn!("Reference article {:?} is not valid UTF-8, decoding lossily", path);
                    String::from_utf8_lossy(e.as_bytes()).into_owned()
                }
            };
            documents.push(ReferenceDocument { title, content });
        }

        if seen == 0 {
            return Err(ForgeError::NoArticles);
        }
        if documents.is_empty() {
            return Err(ForgeError::NoValidArticles);
        }

        debug!("Loaded {} reference articles from {:?}", documents.len(), self.dir);
        Ok(documents)
    }
}

/// Title for a `.txt`/`.md` file name, `None` for anything else
fn document_title(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    name.strip_suffix(".md")
        .or_else(|| name.strip_suffix(".txt"))
        .map(str::to_string)
}
