//! # edgequake-spool
//!
//! Prepare a document for submission to a remote print service in a single
//! pass over its bytes.
//!
//! ## Why this crate?
//!
//! A print job needs three things derived from the same document: a
//! compressed copy to upload, a preview of each page for the user, and an
//! ink-coverage estimate that decides whether the job goes to a color
//! device. The source may be stdin or a network stream that cannot be
//! re-read, so the document is read exactly once and fanned out to every
//! consumer concurrently.
//!
//! ## Pipeline Overview
//!
//! ```text
//! document
//!  │
//!  ├─ 1. Input      resolve a local file, `-` (stdin), or download from URL
//!  ├─ 2. Distribute read fixed-size chunks, write each to every live sink
//!  │     ├─ gzip      bounded queue + blocking compressor worker
//!  │     ├─ renderer  external process (Ghostscript png16m by default)
//!  │     └─ analyzer  external process (Ghostscript inkcov by default)
//!  ├─ 3. Preview    split renderer output at page magic, pack the container
//!  ├─ 4. Ink        classify each page as color / grayscale / empty
//!  └─ 5. Output     compressed payload + preview + job descriptor
//! ```
//!
//! A renderer or analyzer that fails to start, exits early, or overruns its
//! time budget degrades the job (recorded as a [`StageWarning`]) but never
//! fails it. Only input, source-read, and compression failures are fatal.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_spool::{spool, SpoolConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SpoolConfig::default();
//!     let job = spool("report.ps", &config).await?;
//!     println!(
//!         "{} pages, color map {}, {} bytes compressed",
//!         job.descriptor.total_pages,
//!         job.descriptor.color_map,
//!         job.compressed.len()
//!     );
//!     for w in &job.warnings {
//!         eprintln!("warning: {w}");
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `spool` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-spool = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod cancel;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod spool;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use cancel::CancelToken;
pub use config::{ProcessCommand, SpoolConfig, SpoolConfigBuilder, PNG_SIGNATURE};
pub use error::{PreviewError, SpoolError, StageWarning};
pub use output::{JobArtifacts, JobManifest, PipelineStats};
pub use pipeline::descriptor::{ColorMode, JobDescriptor};
pub use pipeline::inkcov::{ColorMap, InkReport, PageColor};
pub use pipeline::preview::{PreviewContainer, PREVIEW_MAGIC};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback};
pub use spool::{spool, spool_reader, spool_sync, spool_to_dir, spool_with_cancel, write_artifacts};
