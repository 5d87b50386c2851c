//! Results of preparing one print job.

use crate::error::StageWarning;
use crate::pipeline::descriptor::JobDescriptor;
use crate::pipeline::inkcov::InkReport;
use crate::pipeline::preview::PreviewContainer;
use serde::{Deserialize, Serialize};

/// Everything the API client needs to submit the job.
///
/// All buffers are owned; nothing here refers back to pipeline state.
#[derive(Debug, Clone)]
pub struct JobArtifacts {
    /// gzip of the raw document, byte-for-byte what was read.
    pub compressed: Vec<u8>,
    /// `None` when the renderer could not be started or was disabled.
    pub preview: Option<PreviewContainer>,
    /// Full ink analysis, including diagnostics.
    pub ink: InkReport,
    pub descriptor: JobDescriptor,
    pub stats: PipelineStats,
    /// Non-fatal problems, in the order they were observed.
    pub warnings: Vec<StageWarning>,
}

impl JobArtifacts {
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// The JSON view written to [`MANIFEST_FILE`].
    pub fn manifest(&self) -> JobManifest<'_> {
        JobManifest {
            descriptor: &self.descriptor,
            attributes: self.descriptor.attributes(),
            payload_file: PAYLOAD_FILE,
            preview_file: self.preview.as_ref().map(|_| PREVIEW_FILE),
            stats: &self.stats,
            warnings: &self.warnings,
        }
    }
}

/// Timing and volume figures for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineStats {
    pub bytes_read: u64,
    pub compressed_bytes: usize,
    pub preview_bytes: Option<usize>,
    pub preview_pages: Option<usize>,
    /// Sinks removed from the fan-out after a failed write.
    pub dropped_sinks: Vec<String>,
    pub distribute_ms: u64,
    pub render_ms: Option<u64>,
    pub analyze_ms: Option<u64>,
    pub total_ms: u64,
}

/// File name of the compressed payload written by [`crate::spool_to_dir`].
pub const PAYLOAD_FILE: &str = "document.gz";
/// File name of the preview container written by [`crate::spool_to_dir`].
pub const PREVIEW_FILE: &str = "preview.bin";
/// File name of the JSON manifest written by [`crate::spool_to_dir`].
pub const MANIFEST_FILE: &str = "job.json";

/// JSON-friendly summary of a prepared job (everything except the binary blobs).
#[derive(Debug, Clone, Serialize)]
pub struct JobManifest<'a> {
    pub descriptor: &'a JobDescriptor,
    pub attributes: Vec<&'static str>,
    pub payload_file: &'static str,
    pub preview_file: Option<&'static str>,
    pub stats: &'a PipelineStats,
    pub warnings: &'a [StageWarning],
}
