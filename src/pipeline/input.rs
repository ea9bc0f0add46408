//! Document loading for the `resolve` subcommand.
//!
//! The HTTP path receives bytes from the multipart form. The CLI accepts a
//! local path or an `http(s)://` URL and turns it into the same
//! `(filename, bytes)` pair so both paths share one pipeline. Magic bytes
//! (`%PDF`) are checked here so a wrong file fails with a readable error
//! rather than a pdfium one.

use crate::error::ResolveError;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// A document read from disk or the network.
#[derive(Debug, Clone)]
pub struct LoadedDocument {
    pub filename: String,
    pub bytes: Vec<u8>,
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Read `input` from disk, or download it when it is a URL.
pub async fn load_document(input: &str, timeout_secs: u64) -> Result<LoadedDocument, ResolveError> {
    let doc = if is_url(input) {
        download(input, timeout_secs).await?
    } else {
        read_local(input).await?
    };
    check_magic(input, &doc.bytes)?;
    Ok(doc)
}

async fn read_local(input: &str) -> Result<LoadedDocument, ResolveError> {
    let path = Path::new(input);
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ResolveError::InputUnavailable {
            input: input.to_string(),
            reason: e.to_string(),
        })?;
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "brain-map.pdf".to_string());
    debug!("Read {} bytes from {}", bytes.len(), path.display());
    Ok(LoadedDocument { filename, bytes })
}

async fn download(url: &str, timeout_secs: u64) -> Result<LoadedDocument, ResolveError> {
    info!("Downloading brain map from: {}", url);

    let unavailable = |reason: String| ResolveError::InputUnavailable {
        input: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unavailable(e.to_string()))?;

    let response = client.get(url).send().await.map_err(|e| {
        if e.is_timeout() {
            unavailable(format!("timed out after {timeout_secs}s"))
        } else {
            unavailable(e.to_string())
        }
    })?;

    if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
    }

    let filename = filename_from_url(url);
    let bytes = response
        .bytes()
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    info!("Downloaded {} bytes as {}", bytes.len(), filename);
    Ok(LoadedDocument {
        filename,
        bytes: bytes.to_vec(),
    })
}

/// Last non-empty path segment containing a dot, else `brain-map.pdf`.
fn filename_from_url(url: &str) -> String {
    reqwest::Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|last| !last.is_empty() && last.contains('.'))
        .unwrap_or_else(|| "brain-map.pdf".to_string())
}

/// Inputs shorter than the magic are rejected too; their bytes are reported
/// zero-padded.
fn check_magic(input: &str, bytes: &[u8]) -> Result<(), ResolveError> {
    if bytes.starts_with(PDF_MAGIC) {
        return Ok(());
    }
    let mut magic = [0u8; 4];
    let n = bytes.len().min(4);
    magic[..n].copy_from_slice(&bytes[..n]);
    Err(ResolveError::NotAPdf {
        input: input.to_string(),
        magic,
    })
}
