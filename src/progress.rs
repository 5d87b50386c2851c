//! Progress-callback trait for pipeline events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::SpoolConfigBuilder::progress_callback`] to receive
//! events as the document is fanned out and the artifacts are assembled.
//!
//! # Example
//!
//! ```rust
//! use edgequake_spool::{PipelineProgressCallback, SpoolConfig};
//! use std::sync::{Arc, atomic::{AtomicU64, Ordering}};
//!
//! struct ByteCounter {
//!     seen: AtomicU64,
//! }
//!
//! impl PipelineProgressCallback for ByteCounter {
//!     fn on_chunk_distributed(&self, bytes_total: u64) {
//!         self.seen.store(bytes_total, Ordering::Relaxed);
//!     }
//! }
//!
//! let counter = Arc::new(ByteCounter { seen: AtomicU64::new(0) });
//!
//! let config = SpoolConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::PipelineStats;
use std::sync::Arc;
use std::time::Duration;

/// Called by the pipeline as it moves through its stages.
///
/// All methods default to no-ops so implementors only override what they
/// need. Events are emitted from the coordinating task, never concurrently.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once, after the sinks are set up and before the first read.
    ///
    /// # Arguments
    /// * `sinks`: names of the sinks that will receive the document
    fn on_pipeline_start(&self, sinks: &[String]) {
        let _ = sinks;
    }

    /// Called after each chunk has been offered to every active sink.
    ///
    /// # Arguments
    /// * `bytes_total`: bytes read from the source so far
    fn on_chunk_distributed(&self, bytes_total: u64) {
        let _ = bytes_total;
    }

    /// Called when a sink is removed from the fan-out after a failed write.
    fn on_sink_dropped(&self, sink: &str, error: &str) {
        let _ = (sink, error);
    }

    /// Called when a stage (distribution, compression, render, analysis) finishes.
    fn on_stage_complete(&self, stage: &str, elapsed: Duration) {
        let _ = (stage, elapsed);
    }

    /// Called once all artifacts are assembled.
    fn on_pipeline_complete(&self, stats: &PipelineStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias for the shared callback handle stored in the config.
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;
