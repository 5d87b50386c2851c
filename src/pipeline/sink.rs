//! The consumer side of the fan-out.
//!
//! A [`Sink`] accepts the document chunk by chunk and is closed exactly once
//! when the source is exhausted. The trait returns boxed futures so the
//! distributor can hold heterogeneous sinks (`&mut dyn Sink`) while the
//! caller keeps ownership of the concrete values and collects their results
//! afterwards.

use futures::future::BoxFuture;
use std::io;

/// A write-and-close consumer of the document byte stream.
pub trait Sink: Send {
    /// Short, stable name used in logs and warnings (`"gzip"`, `"renderer"`, …).
    fn name(&self) -> &str;

    /// Accept one non-empty chunk. An error means the sink is unusable for
    /// the rest of the run.
    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;

    /// Signal end-of-stream and release the input side.
    fn close(&mut self) -> BoxFuture<'_, io::Result<()>>;
}
