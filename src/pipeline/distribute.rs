//! Single-pass fan-out of the source document to every sink.
//!
//! The source is read once, in fixed-size chunks, and each chunk is offered
//! to every sink that is still active, always in the same order. A sink
//! whose write fails leaves the active set for the rest of the run; the
//! others keep receiving data. When the source is exhausted every sink,
//! active or not, is closed exactly once.

use crate::cancel::CancelToken;
use crate::error::SpoolError;
use crate::pipeline::sink::Sink;
use crate::progress::ProgressCallback;
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// A sink removed from the fan-out after a failed write.
#[derive(Debug, Clone, PartialEq)]
pub struct DroppedSink {
    pub name: String,
    /// Bytes the sink accepted before it failed.
    pub bytes_written: u64,
    pub error: String,
}

/// Outcome of one [`distribute`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DistributionReport {
    /// Total bytes read from the source.
    pub bytes_read: u64,
    /// Names of the sinks that received every chunk, in sink order.
    pub active: Vec<String>,
    /// Sinks that failed mid-stream, in the order they failed.
    pub dropped: Vec<DroppedSink>,
}

impl DistributionReport {
    pub fn is_active(&self, name: &str) -> bool {
        self.active.iter().any(|n| n == name)
    }
}

/// Read `source` to the end and write each chunk to every active sink.
///
/// Sink write failures are absorbed into the report. Source read failures
/// and cancellation are returned as errors; in that case the sinks are left
/// open and released when their owner drops them.
pub async fn distribute<R>(
    source: &mut R,
    sinks: &mut [&mut dyn Sink],
    chunk_size: usize,
    cancel: &CancelToken,
    progress: Option<&ProgressCallback>,
) -> Result<DistributionReport, SpoolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut active = vec![true; sinks.len()];
    let mut written = vec![0u64; sinks.len()];
    let mut report = DistributionReport::default();

    loop {
        let n = match cancel.run(source.read(&mut buf)).await? {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => {
                return Err(SpoolError::SourceRead {
                    bytes_read: report.bytes_read,
                    source: e,
                })
            }
        };
        report.bytes_read += n as u64;
        let chunk = &buf[..n];

        for (i, sink) in sinks.iter_mut().enumerate() {
            if !active[i] {
                continue;
            }
            match cancel.run(sink.write(chunk)).await? {
                Ok(()) => written[i] += n as u64,
                Err(e) => {
                    warn!(
                        "{}: write failed after {} bytes, dropping from fan-out: {}",
                        sink.name(),
                        written[i],
                        e
                    );
                    active[i] = false;
                    if let Some(cb) = progress {
                        cb.on_sink_dropped(sink.name(), &e.to_string());
                    }
                    report.dropped.push(DroppedSink {
                        name: sink.name().to_string(),
                        bytes_written: written[i],
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Some(cb) = progress {
            cb.on_chunk_distributed(report.bytes_read);
        }
    }

    for (i, sink) in sinks.iter_mut().enumerate() {
        match cancel.run(sink.close()).await? {
            Ok(()) => debug!("{}: closed after {} bytes", sink.name(), written[i]),
            Err(e) if active[i] => warn!("{}: close failed: {}", sink.name(), e),
            Err(e) => debug!("{}: close of dropped sink failed: {}", sink.name(), e),
        }
        if active[i] {
            report.active.push(sink.name().to_string());
        }
    }

    info!(
        "Distributed {} bytes to {}/{} sinks",
        report.bytes_read,
        report.active.len(),
        sinks.len()
    );

    Ok(report)
}
