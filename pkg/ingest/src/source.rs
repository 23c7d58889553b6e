use std::io::Read;

use anyhow::{Context, Result, bail};
use tracing::info;

/// A fully-read source buffer, labeled with where it came from.
#[derive(Debug, Clone)]
pub struct NamedSource {
    pub name: String,
    pub content: String,
}

/// Read every source into memory. Each entry is a file path, an `http(s)://`
/// URL, or `-` for stdin. Failures are collected per source so one bad
/// source does not discard the rest.
pub async fn open_sources(
    sources: &[String],
    user_agent: &str,
) -> (Vec<NamedSource>, Vec<anyhow::Error>) {
    let mut opened = Vec::new();
    let mut errors = Vec::new();

    // Audit endpoints are frequently served with self-signed certificates.
    let client = match reqwest::Client::builder()
        .danger_accept_invalid_certs(true)
        .user_agent(user_agent)
        .build()
    {
        Ok(client) => Some(client),
        Err(e) => {
            errors.push(anyhow::Error::from(e).context("building http client"));
            None
        }
    };

    for source in sources {
        match read_source(source, client.as_ref()).await {
            Ok(content) => {
                info!(source = %source, bytes = content.len(), "read audit source");
                opened.push(NamedSource {
                    name: source.clone(),
                    content,
                });
            }
            Err(e) => errors.push(e),
        }
    }

    (opened, errors)
}

async fn read_source(source: &str, client: Option<&reqwest::Client>) -> Result<String> {
    if source.starts_with("http://") || source.starts_with("https://") {
        let client = client.context("http client unavailable")?;
        let resp = client
            .get(source)
            .send()
            .await
            .with_context(|| format!("fetching {source}"))?;
        if !resp.status().is_success() {
            bail!("error fetching {}: {}", source, resp.status());
        }
        Ok(resp
            .text()
            .await
            .with_context(|| format!("reading response from {source}"))?)
    } else if source == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("reading stdin")?;
        Ok(buf)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("opening {source}"))
    }
}
