//! Input resolution: normalise a user-supplied path, `-`, or URL to a reader.
//!
//! ## Why download to a temp file?
//!
//! The pipeline reads its source exactly once and cannot restart it. A
//! remote document is therefore fetched completely into a `TempDir` first,
//! so a dropped connection fails the job before any consumer has seen a
//! byte. The directory is removed when the `ResolvedInput` is dropped.

use crate::error::SpoolError;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tracing::{debug, info};

/// A boxed, owned document reader.
pub type SourceReader = Box<dyn AsyncRead + Unpin + Send>;

/// The resolved input: a local path, standard input, or a downloaded temp file.
pub enum ResolvedInput {
    /// Input was already a local file.
    Local(PathBuf),
    /// Input is the process's standard input (`-`).
    Stdin,
    /// Input was a URL; the document was downloaded to a temporary directory.
    /// The `TempDir` is kept alive to prevent cleanup until processing completes.
    Downloaded { path: PathBuf, _temp_dir: TempDir },
}

impl ResolvedInput {
    /// The file backing this input, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ResolvedInput::Local(p) => Some(p),
            ResolvedInput::Stdin => None,
            ResolvedInput::Downloaded { path, .. } => Some(path),
        }
    }

    /// Open the document for a single pass.
    pub async fn open(&self) -> Result<SourceReader, SpoolError> {
        let Some(path) = self.path() else {
            return Ok(Box::new(tokio::io::stdin()));
        };
        let file = tokio::fs::File::open(path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::PermissionDenied => SpoolError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => SpoolError::FileNotFound {
                path: path.to_path_buf(),
            },
        })?;
        Ok(Box::new(file))
    }
}

/// Check if the input string looks like a URL.
pub fn is_url(input: &str) -> bool {
    input.starts_with("http://") || input.starts_with("https://")
}

/// Check if the input string names standard input.
pub fn is_stdin(input: &str) -> bool {
    input == "-"
}

/// Resolve the input string to something the pipeline can read.
///
/// If the input is a URL, download it to a temporary directory.
/// If the input is a local file, validate it exists and is readable.
pub async fn resolve_input(input: &str, timeout_secs: u64) -> Result<ResolvedInput, SpoolError> {
    if input.trim().is_empty() {
        return Err(SpoolError::InvalidInput {
            input: input.to_string(),
        });
    }
    if is_stdin(input) {
        debug!("Reading document from stdin");
        Ok(ResolvedInput::Stdin)
    } else if is_url(input) {
        download_url(input, timeout_secs).await
    } else {
        resolve_local(input)
    }
}

/// Resolve a local file path, validating existence and readability.
fn resolve_local(path_str: &str) -> Result<ResolvedInput, SpoolError> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(SpoolError::FileNotFound { path });
    }
    if path.is_dir() {
        return Err(SpoolError::InvalidInput {
            input: path_str.to_string(),
        });
    }

    // Check read permission by attempting to open
    match std::fs::File::open(&path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(SpoolError::PermissionDenied { path });
        }
        Err(_) => {
            return Err(SpoolError::FileNotFound { path });
        }
    }

    debug!("Resolved local document: {}", path.display());
    Ok(ResolvedInput::Local(path))
}

/// Download a URL to a temporary directory and return the path.
async fn download_url(url: &str, timeout_secs: u64) -> Result<ResolvedInput, SpoolError> {
    info!("Downloading document from: {}", url);

    let failed = |reason: String| SpoolError::DownloadFailed {
        url: url.to_string(),
        reason,
    };
    let classify = |e: reqwest::Error| {
        if e.is_timeout() {
            SpoolError::DownloadTimeout {
                url: url.to_string(),
                secs: timeout_secs,
            }
        } else {
            SpoolError::DownloadFailed {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| failed(e.to_string()))?;

    let mut response = client.get(url).send().await.map_err(classify)?;

    if !response.status().is_success() {
        return Err(failed(format!("HTTP {}", response.status())));
    }

    let temp_dir = TempDir::new().map_err(|e| SpoolError::Internal(e.to_string()))?;
    let file_path = temp_dir.path().join(extract_filename(url));

    let mut file = tokio::fs::File::create(&file_path)
        .await
        .map_err(|e| SpoolError::Internal(format!("Failed to create temp file: {}", e)))?;
    let mut total = 0u64;
    while let Some(chunk) = response.chunk().await.map_err(classify)? {
        file.write_all(&chunk)
            .await
            .map_err(|e| SpoolError::Internal(format!("Failed to write temp file: {}", e)))?;
        total += chunk.len() as u64;
    }
    file.flush()
        .await
        .map_err(|e| SpoolError::Internal(format!("Failed to write temp file: {}", e)))?;

    info!("Downloaded {} bytes to: {}", total, file_path.display());

    Ok(ResolvedInput::Downloaded {
        path: file_path,
        _temp_dir: temp_dir,
    })
}

/// Extract a reasonable filename from the URL.
fn extract_filename(url: &str) -> String {
    if let Ok(parsed) = reqwest::Url::parse(url) {
        if let Some(mut segments) = parsed.path_segments() {
            if let Some(last) = segments.next_back() {
                if !last.is_empty() && last.contains('.') {
                    return last.to_string();
                }
            }
        }
    }

    "document.bin".to_string()
}
