//! Error types for the edgequake-spool library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`SpoolError`]: **Fatal**: the job cannot be prepared at all (input
//!   missing, source stream broke mid-read, the compressor failed, or the
//!   job was cancelled). Returned as `Err(SpoolError)` from the top-level
//!   `spool*` functions.
//!
//! * [`StageWarning`]: **Non-fatal**: one consumer of the document failed
//!   (renderer binary missing, analyzer killed after its time budget, a
//!   malformed report line) but the job is still submittable. Stored inside
//!   [`crate::output::JobArtifacts`] so callers can see what degraded.
//!
//! Cancellation is always fatal and always surfaces as
//! [`SpoolError::Cancelled`]; no stage converts it into a warning.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-spool library.
#[derive(Debug, Error)]
pub enum SpoolError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Document not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The input string is not a file path, `-`, or a valid URL.
    #[error("Invalid input '{input}': not a file path, '-', or a valid HTTP/HTTPS URL")]
    InvalidInput { input: String },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}\nCheck your internet connection.")]
    DownloadFailed { url: String, reason: String },

    /// Download exceeded the configured timeout.
    #[error("Download timed out after {secs}s for '{url}'\nIncrease --download-timeout.")]
    DownloadTimeout { url: String, secs: u64 },

    // ── Pipeline errors ───────────────────────────────────────────────────
    /// Reading the source document failed after `bytes_read` bytes.
    #[error("Failed to read source document after {bytes_read} bytes: {source}")]
    SourceRead {
        bytes_read: u64,
        #[source]
        source: std::io::Error,
    },

    /// The compressed copy of the document could not be produced.
    #[error("Compression failed: {0}")]
    Compression(#[source] std::io::Error),

    /// The job was cancelled while the pipeline was running.
    #[error("Job cancelled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Could not create or write one of the artifact files.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SpoolError {
    /// True when the error is the cancellation signal rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpoolError::Cancelled)
    }
}

/// A non-fatal problem recorded while preparing a job.
///
/// The job still produces a compressed payload and a descriptor; the
/// warning explains which artifact is missing or degraded.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum StageWarning {
    /// An external program could not be started.
    #[error("{stage}: failed to start '{program}': {detail}")]
    SpawnFailed {
        stage: String,
        program: String,
        detail: String,
    },

    /// A sink rejected a write and was removed from the fan-out.
    #[error("{sink}: dropped from fan-out after {bytes_written} bytes: {detail}")]
    SinkDropped {
        sink: String,
        bytes_written: u64,
        detail: String,
    },

    /// An external program overran its time budget and was terminated.
    #[error("{stage}: still running after {secs}s, terminated")]
    TimedOut { stage: String, secs: u64 },

    /// An external program exited with a failure status.
    #[error("{stage}: exited with {status}")]
    ExitFailure { stage: String, status: String },

    /// Renderer output could not be packed into a preview container.
    #[error("preview unavailable: {detail}")]
    PreviewUnavailable { detail: String },

    /// An analyzer report line did not match the expected shape.
    #[error("ink report line {line_no} is malformed: {line:?}")]
    MalformedLine { line_no: usize, line: String },
}

/// A preview container that cannot be built or read back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PreviewError {
    /// A page or the whole container would not fit the 32-bit layout.
    #[error("preview too large: {0} bytes does not fit in a u32 field")]
    TooLarge(usize),

    /// The buffer does not start with the container magic.
    #[error("not a preview container (bad magic)")]
    BadMagic,

    /// The buffer ends before a field it announces.
    #[error("preview container truncated: {0}")]
    Truncated(&'static str),

    /// An index entry points outside the page section.
    #[error("page {page} offset {offset} is outside the page section")]
    BadOffset { page: usize, offset: u32 },
}
