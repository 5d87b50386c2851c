//! Gzip copy of the raw document, produced off the coordinating task.
//!
//! `write` pushes an owned buffer onto a bounded `mpsc` queue and only waits
//! when the queue is full. A `spawn_blocking` worker owns the
//! [`GzEncoder`] and its in-memory destination exclusively; the compressed
//! bytes are handed back through the worker's `JoinHandle` when the sink is
//! closed, so no lock is ever shared between the two sides.

use crate::pipeline::sink::Sink;
use flate2::write::GzEncoder;
use flate2::Compression;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::io::{self, Write};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Bounded-queue gzip sink writing into `W`.
pub struct CompressionSink<W = Vec<u8>> {
    tx: Option<mpsc::Sender<Vec<u8>>>,
    worker: Option<JoinHandle<io::Result<W>>>,
    outcome: Option<io::Result<W>>,
    bytes_in: u64,
}

impl CompressionSink {
    /// Start a worker compressing into a fresh buffer.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn(level: u32, queue_capacity: usize) -> Self {
        Self::with_destination(Vec::new(), level, queue_capacity)
    }
}

impl<W: Write + Send + 'static> CompressionSink<W> {
    /// Start a worker appending compressed output to `dest`.
    ///
    /// `write` waits while `queue_capacity` buffers are queued and unread.
    pub fn with_destination(dest: W, level: u32, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let worker = tokio::task::spawn_blocking(move || compress_worker(rx, dest, level));
        Self {
            tx: Some(tx),
            worker: Some(worker),
            outcome: None,
            bytes_in: 0,
        }
    }

    /// Uncompressed bytes accepted so far.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_in
    }

    /// Queue one buffer for compression. Empty buffers are ignored.
    pub async fn send(&mut self, buf: Vec<u8>) -> io::Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::BrokenPipe, "compressor already closed"))?;
        let len = buf.len() as u64;
        tx.send(buf)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "compression worker stopped"))?;
        self.bytes_in += len;
        Ok(())
    }

    /// End the queue, wait for the worker to drain it and write the gzip trailer.
    ///
    /// Calling `finish` again returns the first outcome's status without
    /// waiting.
    pub async fn finish(&mut self) -> io::Result<()> {
        // Dropping the only sender is the end-of-stream marker for the worker.
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            let outcome = match worker.await {
                Ok(res) => res,
                Err(join) => Err(io::Error::other(format!("compression worker panicked: {join}"))),
            };
            if outcome.is_ok() {
                debug!("gzip: {} bytes compressed", self.bytes_in);
            }
            self.outcome = Some(outcome);
        }
        match &self.outcome {
            Some(Err(e)) => Err(io::Error::new(e.kind(), e.to_string())),
            _ => Ok(()),
        }
    }

    /// Take the destination holding the compressed bytes. Fails if the sink
    /// was never finished or the worker failed.
    pub fn into_output(mut self) -> io::Result<W> {
        self.outcome.take().unwrap_or_else(|| {
            Err(io::Error::other("compression sink was not finished"))
        })
    }
}

impl<W: Write + Send + 'static> Sink for CompressionSink<W> {
    fn name(&self) -> &str {
        "gzip"
    }

    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.send(chunk.to_vec()).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.finish().boxed()
    }
}

/// Worker loop: runs on the blocking pool until every sender is gone.
fn compress_worker<W: Write>(
    mut rx: mpsc::Receiver<Vec<u8>>,
    dest: W,
    level: u32,
) -> io::Result<W> {
    let mut encoder = GzEncoder::new(dest, Compression::new(level));
    while let Some(buf) = rx.blocking_recv() {
        if let Err(e) = encoder.write_all(&buf) {
            warn!("gzip worker write failed: {}", e);
            return Err(e);
        }
    }
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::io::Read;
    use std::sync::mpsc as std_mpsc;
    use std::time::Duration;
    use tokio::sync::oneshot;

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .expect("valid gzip");
        out
    }

    #[tokio::test]
    async fn round_trips_in_write_order() {
        let mut sink = CompressionSink::spawn(6, 4);
        let mut expected = Vec::new();
        for i in 0..50u8 {
            let buf = vec![i; 1000 + i as usize];
            expected.extend_from_slice(&buf);
            sink.send(buf).await.expect("send");
        }
        sink.finish().await.expect("finish");
        assert_eq!(sink.bytes_written(), expected.len() as u64);

        let out = sink.into_output().expect("output");
        assert_eq!(gunzip(&out), expected);
    }

    #[tokio::test]
    async fn empty_stream_is_valid_gzip() {
        let mut sink = CompressionSink::spawn(6, 1);
        sink.finish().await.expect("finish");
        let out = sink.into_output().expect("output");
        assert!(!out.is_empty(), "gzip header and trailer expected");
        assert!(gunzip(&out).is_empty());
    }

    #[tokio::test]
    async fn destination_prefix_is_kept() {
        let mut sink = CompressionSink::with_destination(b"HDR".to_vec(), 1, 2);
        sink.send(b"abc".to_vec()).await.expect("send");
        sink.finish().await.expect("finish");
        let out = sink.into_output().expect("output");
        assert_eq!(&out[..3], b"HDR");
        assert_eq!(gunzip(&out[3..]), b"abc");
    }

    #[tokio::test]
    async fn send_after_finish_fails() {
        let mut sink = CompressionSink::spawn(6, 1);
        sink.finish().await.expect("finish");
        sink.finish().await.expect("second finish is a no-op");
        let err = sink.send(b"late".to_vec()).await.expect_err("closed");
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    /// Blocks the worker on its first write until released.
    struct GatedWriter {
        entered: Option<oneshot::Sender<()>>,
        release: std_mpsc::Receiver<()>,
        out: Vec<u8>,
    }

    impl Write for GatedWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if let Some(entered) = self.entered.take() {
                let _ = entered.send(());
                let _ = self.release.recv();
            }
            self.out.extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn full_queue_makes_send_wait() {
        let (entered_tx, entered_rx) = oneshot::channel();
        let (release_tx, release_rx) = std_mpsc::channel();
        let dest = GatedWriter {
            entered: Some(entered_tx),
            release: release_rx,
            out: Vec::new(),
        };
        // Level 0 stores the input, so the first buffer reaches the writer.
        let mut sink = CompressionSink::with_destination(dest, 0, 1);

        let first = vec![1u8; 256 * 1024];
        sink.send(first.clone()).await.expect("first send");
        entered_rx.await.expect("worker reached the writer");

        // The worker is stalled: one slot is free, then the queue is full.
        sink.send(vec![2u8; 16]).await.expect("second send fills the queue");
        let third =
            tokio::time::timeout(Duration::from_millis(200), sink.send(vec![3u8; 16])).await;
        assert!(third.is_err(), "send must wait while the queue is full");
        assert_eq!(sink.bytes_written(), first.len() as u64 + 16);

        release_tx.send(()).expect("release worker");
        sink.finish().await.expect("finish");
        let out = sink.into_output().expect("output").out;
        let mut expected = first;
        expected.extend_from_slice(&[2u8; 16]);
        assert_eq!(gunzip(&out), expected);
    }

    #[tokio::test]
    async fn unfinished_sink_has_no_output() {
        let sink = CompressionSink::spawn(6, 1);
        assert!(sink.into_output().is_err());
    }

    #[tokio::test]
    async fn works_through_dyn_sink() {
        let mut sink = CompressionSink::spawn(6, 2);
        {
            let dyn_sink: &mut dyn Sink = &mut sink;
            assert_eq!(dyn_sink.name(), "gzip");
            dyn_sink.write(b"through the trait").await.expect("write");
            dyn_sink.close().await.expect("close");
        }
        assert_eq!(gunzip(&sink.into_output().expect("output")), b"through the trait");
    }
}
