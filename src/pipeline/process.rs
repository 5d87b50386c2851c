//! External renderer / analyzer processes.
//!
//! ## Why drain stdout on a separate task?
//!
//! The distributor writes the document into the child's stdin while the
//! child writes its result to stdout. If nobody reads stdout, the child
//! blocks once its stdout pipe fills, stops reading stdin, and our write
//! blocks too: a deadlock. A drain task is therefore started the moment the
//! process is spawned and forwards every stdout chunk over a channel, so
//! whatever has been read is available to the caller at any time.
//!
//! ## Bounded join
//!
//! After the input is closed, [`ExternalProcess::join`] waits for the child
//! up to a per-stage budget. A child still running after that is killed with
//! `SIGKILL` straight away; no `SIGTERM` is sent first, so a renderer killed
//! mid-page cannot flush it. Whatever it printed before being killed is
//! still returned.
//!
//! Only the direct child is killed. A wrapper script may leave descendants
//! holding stdout open, so EOF on stdout is never awaited past the budget
//! (or past [`DRAIN_GRACE`] after a kill). The drain is then aborted and the
//! output read so far is kept.
use crate::cancel::CancelToken;
use crate::config::ProcessCommand;
use crate::error::SpoolError;
use crate::pipeline::pipe::PipeWriter;
use crate::pipeline::sink::Sink;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::ffi::OsStr;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How long stdout may stay open once the child has been killed.
pub const DRAIN_GRACE: Duration = Duration::from_secs(1);

const DRAIN_CHUNK: usize = 64 * 1024;

/// What a joined process left behind.
#[derive(Debug)]
pub struct ProcessOutput {
    /// Everything the process wrote to stdout.
    pub stdout: Vec<u8>,
    /// Exit status, `None` if it could not be collected.
    pub status: Option<ExitStatus>,
    /// True when the time budget ran out and the process was killed.
    pub timed_out: bool,
    pub elapsed: Duration,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        !self.timed_out && self.status.is_some_and(|s| s.success())
    }
}

/// A spawned child with a piped stdin (our sink) and a drained stdout.
pub struct ExternalProcess {
    stage: String,
    program: String,
    child: Child,
    stdin: PipeWriter,
    output: mpsc::UnboundedReceiver<Vec<u8>>,
    drain: JoinHandle<io::Result<()>>,
    started: Instant,
}

impl ExternalProcess {
    /// Spawn `cmd` for `stage`, with `search_path` as the child's `PATH`.
    ///
    /// The stdout drain starts immediately. The child is killed if this
    /// handle is dropped before [`join`](Self::join) completes.
    pub fn spawn(
        stage: &str,
        cmd: &ProcessCommand,
        search_path: Option<&OsStr>,
    ) -> io::Result<Self> {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        if let Some(path) = search_path {
            command.env("PATH", path);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| io::Error::other("child stdin was not captured"))?;
        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("child stdout was not captured"))?;

        let (tx, output) = mpsc::unbounded_channel();
        let drain = tokio::spawn(async move {
            let mut buf = vec![0u8; DRAIN_CHUNK];
            loop {
                let n = stdout.read(&mut buf).await?;
                if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                    return Ok(());
                }
            }
        });

        info!("{}: started '{}' (pid {:?})", stage, cmd, child.id());

        Ok(Self {
            stage: stage.to_string(),
            program: cmd.program.clone(),
            child,
            stdin: PipeWriter::new(stdin),
            output,
            drain,
            started: Instant::now(),
        })
    }

    pub fn stage(&self) -> &str {
        &self.stage
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Bytes successfully written to the child's stdin.
    pub fn bytes_written(&self) -> u64 {
        self.stdin.bytes_written()
    }

    /// Close stdin (if still open), wait up to `timeout`, kill on overrun,
    /// and collect stdout.
    ///
    /// Only cancellation is an error; a crashed or killed child still yields
    /// a [`ProcessOutput`].
    pub async fn join(
        mut self,
        timeout: Duration,
        cancel: &CancelToken,
    ) -> Result<ProcessOutput, SpoolError> {
        if let Err(e) = self.stdin.close().await {
            debug!("{}: closing stdin failed: {}", self.stage, e);
        }

        let join_start = Instant::now();
        let mut timed_out = false;
        let waited = cancel
            .run(tokio::time::timeout(timeout, self.child.wait()))
            .await;
        let status = match waited {
            Err(cancelled) => {
                let _ = self.child.start_kill();
                self.drain.abort();
                return Err(cancelled);
            }
            Ok(Ok(Ok(status))) => Some(status),
            Ok(Ok(Err(e))) => {
                warn!("{}: failed to wait for '{}': {}", self.stage, self.program, e);
                None
            }
            Ok(Err(_elapsed)) => {
                warn!(
                    "{}: '{}' still running after {}s, killing",
                    self.stage,
                    self.program,
                    timeout.as_secs()
                );
                timed_out = true;
                if let Err(e) = self.child.start_kill() {
                    warn!("{}: kill failed: {}", self.stage, e);
                }
                self.child.wait().await.ok()
            }
        };

        let drain_budget = if timed_out {
            DRAIN_GRACE
        } else {
            timeout.saturating_sub(join_start.elapsed()).max(DRAIN_GRACE)
        };
        let mut stdout = Vec::new();
        let drained = cancel
            .run(tokio::time::timeout(
                drain_budget,
                collect_output(&mut self.output, &mut stdout),
            ))
            .await;
        match drained {
            Err(cancelled) => {
                self.drain.abort();
                return Err(cancelled);
            }
            Ok(Ok(())) => match (&mut self.drain).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{}: reading stdout failed: {}", self.stage, e),
                Err(join) => {
                    return Err(SpoolError::Internal(format!(
                        "{} stdout drain panicked: {join}",
                        self.stage
                    )))
                }
            },
            Ok(Err(_elapsed)) => {
                warn!(
                    "{}: stdout still open {:?} after '{}' exited, keeping {} bytes",
                    self.stage,
                    drain_budget,
                    self.program,
                    stdout.len()
                );
                self.drain.abort();
                while let Ok(chunk) = self.output.try_recv() {
                    stdout.extend_from_slice(&chunk);
                }
            }
        }

        let elapsed = self.started.elapsed();
        debug!(
            "{}: exited {:?} after {:?}, {} bytes of output",
            self.stage,
            status,
            elapsed,
            stdout.len()
        );

        Ok(ProcessOutput {
            stdout,
            status,
            timed_out,
            elapsed,
        })
    }
}

/// Append stdout chunks until the drain task hangs up.
async fn collect_output(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>, out: &mut Vec<u8>) {
    while let Some(chunk) = rx.recv().await {
        out.extend_from_slice(&chunk);
    }
}

impl Sink for ExternalProcess {
    fn name(&self) -> &str {
        &self.stage
    }

    fn write<'a>(&'a mut self, chunk: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        self.stdin.write(chunk).boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, io::Result<()>> {
        self.stdin.close().boxed()
    }
}
