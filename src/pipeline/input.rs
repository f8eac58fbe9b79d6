//! Input resolution: read a user-supplied path or URL into PDF bytes.
//!
//! The document is read exactly once. pdfium loads from a byte slice, so a
//! downloaded PDF never touches the file system. The `%PDF` magic is checked
//! here so a wrong file produces a clear error instead of a pdfium parse
//! failure.

use crate::error::ExplainError;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Resolve `input` (local path or HTTP/HTTPS URL) to validated PDF bytes.
pub async fn read_input(input: &str, download_timeout_secs: u64) -> Result<Vec<u8>, ExplainError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ExplainError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_url(input) {
        download(input, download_timeout_secs).await
    } else {
        read_local(input).await
    }
}

/// Reject anything that does not start with the PDF magic.
pub fn ensure_pdf(bytes: &[u8], source_name: &str) -> Result<(), ExplainError> {
    if bytes.starts_with(PDF_MAGIC) {
        Ok(())
    } else {
        Err(ExplainError::NotAPdf {
            source_name: source_name.to_string(),
            magic: bytes.iter().take(PDF_MAGIC.len()).copied().collect(),
        })
    }
}

async fn read_local(path_str: &str) -> Result<Vec<u8>, ExplainError> {
    let path = PathBuf::from(path_str);
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => ExplainError::PermissionDenied { path: path.clone() },
        _ => ExplainError::FileNotFound { path: path.clone() },
    })?;
    ensure_pdf(&bytes, path_str)?;
    debug!("Read local PDF: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

async fn download(url: &str, timeout_secs: u64) -> Result<Vec<u8>, ExplainError> {
    info!("Downloading PDF from: {}", url);

    reqwest::Url::parse(url).map_err(|_| ExplainError::InvalidInput {
        input: url.to_string(),
    })?;

    let failed = |reason: String| ExplainError::DownloadFailed {
        url: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            ExplainError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            failed(e.to_string())
        }
    };

    let response = client.get(url).send().await.map_err(classify)?;
    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(classify)?.to_vec();
    ensure_pdf(&bytes, url)?;
    info!("Downloaded {} bytes", bytes.len());
    Ok(bytes)
}
