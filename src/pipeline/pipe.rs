//! Write end of a unidirectional pipe into an external process.
//!
//! The kernel pipe buffer is the bound: once it is full, `write` parks the
//! caller until the reader on the other side drains it. When that reader
//! exits, further writes fail with `BrokenPipe`, which the distributor
//! treats as "drop this sink".

use std::io;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::process::ChildStdin;
use tracing::debug;

/// Owned write end of a pipe. Closing is idempotent; writes after close fail.
pub struct PipeWriter<W = ChildStdin> {
    inner: Option<W>,
    bytes_written: u64,
}

impl<W> PipeWriter<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(inner: W) -> Self {
        Self {
            inner: Some(inner),
            bytes_written: 0,
        }
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Write the whole chunk or fail.
    pub async fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        let inner = self
            .inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "pipe already closed"))?;
        inner.write_all(chunk).await?;
        self.bytes_written += chunk.len() as u64;
        Ok(())
    }

    /// Flush and drop the write end so the reader sees end-of-file.
    ///
    /// A reader that has already exited makes the flush fail; the handle is
    /// released regardless.
    pub async fn close(&mut self) -> io::Result<()> {
        let Some(mut inner) = self.inner.take() else {
            return Ok(());
        };
        let res = inner.shutdown().await;
        drop(inner);
        debug!("pipe closed after {} bytes", self.bytes_written);
        match res {
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => Ok(()),
            other => other,
        }
    }
}
