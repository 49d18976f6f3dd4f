//! Terminal client for a running Article Forge server.
//!
//! Usage: `article_client <topic...>`. The article body is printed as it
//! streams in; the model's thoughts are printed once, at the end.

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use std::io::{self, Write};

use article_forge::utils::Utf8StreamDecoder;
use article_forge::ArticleBuffer;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()))
        .init();

    let topic = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if topic.trim().is_empty() {
        bail!("Usage: article_client <topic>");
    }

    let server = std::env::var("FORGE_SERVER_URL").unwrap_or_else(|_| {
        let port = std::env::var("FORGE_PORT").unwrap_or_else(|_| "3000".to_string());
        format!("http://localhost:{}", port)
    });

    let res = reqwest::Client::new()
        .post(format!("{}/api/generate", server.trim_end_matches('/')))
        .json(&serde_json::json!({ "prompt": topic }))
        .send()
        .await
        .with_context(|| format!("Could not reach Article Forge at {}", server))?;

    if !res.status().is_success() {
        let status = res.status();
        let payload: serde_json::Value = res.json().await.unwrap_or_default();
        let message = payload["error"].as_str().unwrap_or("Failed to generate article");
        bail!("{} ({})", message, status);
    }

    println!("📝 {}\n{}", topic, "─".repeat(50));

    let mut stream = res.bytes_stream();
    let mut decoder = Utf8StreamDecoder::new();
    let mut buffer = ArticleBuffer::new();
    let mut printed = String::new();
    let mut stdout = io::stdout();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.context("Article stream interrupted")?;
        buffer.push(&decoder.decode(&chunk));
        print_progress(&buffer, &mut printed, &mut stdout)?;
    }
    buffer.push(&decoder.finish());
    print_progress(&buffer, &mut printed, &mut stdout)?;

    println!("\n{}", "─".repeat(50));
    if let Some(thought) = buffer.segments().thought.filter(|t| !t.is_empty()) {
        println!("💭 Model thoughts:\n{}", thought);
    }

    Ok(())
}

/// Print whatever the body gained since the last call. Holds output while a
/// thought section is still open, since the body shrinks once it closes.
fn print_progress(buffer: &ArticleBuffer, printed: &mut String, out: &mut impl Write) -> io::Result<()> {
    if buffer.thought_open() {
        return Ok(());
    }
    let body = buffer.segments().body;
    if let Some(fresh) = body.strip_prefix(printed.as_str()) {
        if !fresh.is_empty() {
            write!(out, "{}", fresh)?;
            out.flush()?;
            printed.push_str(fresh);
        }
    }
    Ok(())
}
