//! Configuration types for print-job preparation.
//!
//! All pipeline behaviour is controlled through [`SpoolConfig`], built via
//! its [`SpoolConfigBuilder`]. One config can be shared by many jobs.
//!
//! External programs are described by [`ProcessCommand`] values and the
//! directory list used to find them is carried explicitly in
//! [`SpoolConfig::search_path`]; the pipeline never mutates the process-wide
//! `PATH`.

use crate::error::SpoolError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::time::Duration;

/// The 8-byte PNG signature that starts every page the default renderer emits.
pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Default fan-out chunk size (64 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Default compression queue depth, in buffers.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// An external program plus its fixed arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ProcessCommand {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Parse a whitespace-separated command line such as `"gs -q -sDEVICE=inkcov -"`.
    ///
    /// No quoting rules are applied; arguments containing spaces must be
    /// supplied through [`ProcessCommand::new`].
    pub fn parse(line: &str) -> Result<Self, SpoolError> {
        let mut parts = line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| SpoolError::InvalidConfig("empty command line".into()))?;
        Ok(Self::new(program, parts))
    }

    /// Ghostscript rendering every page of stdin to PNG on stdout.
    pub fn default_renderer() -> Self {
        Self::new(
            "gs",
            [
                "-q",
                "-dSAFER",
                "-dBATCH",
                "-dNOPAUSE",
                "-sDEVICE=png16m",
                "-r50",
                "-sOutputFile=-",
                "-",
            ],
        )
    }

    /// Ghostscript printing one `C M Y K CMYK OK` line per page of stdin.
    pub fn default_analyzer() -> Self {
        Self::new(
            "gs",
            [
                "-q",
                "-dSAFER",
                "-dBATCH",
                "-dNOPAUSE",
                "-sDEVICE=inkcov",
                "-sOutputFile=-",
                "-",
            ],
        )
    }
}

impl fmt::Display for ProcessCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Configuration for preparing one print job.
///
/// Built via [`SpoolConfig::builder()`] or using [`SpoolConfig::default()`].
///
/// # Example
/// ```rust
/// use edgequake_spool::SpoolConfig;
///
/// let config = SpoolConfig::builder()
///     .compression_level(9)
///     .render_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct SpoolConfig {
    /// Bytes read from the source per fan-out step. Default: 64 KiB.
    pub chunk_size: usize,

    /// Maximum number of buffers waiting for the compressor. Default: 1024.
    ///
    /// Together with `chunk_size` this bounds the uncompressed bytes in
    /// flight (64 MiB at the defaults). A full queue throttles the reader.
    pub queue_capacity: usize,

    /// gzip level 0–9. Default: 6.
    pub compression_level: u32,

    /// Page renderer. `None` skips the preview artifact.
    pub renderer: Option<ProcessCommand>,

    /// Ink-coverage analyzer. `None` uses the single-grayscale-page fallback.
    pub analyzer: Option<ProcessCommand>,

    /// Byte sequence that starts each page in the renderer output.
    /// Default: the PNG signature.
    pub page_magic: Vec<u8>,

    /// Time the renderer may keep running after its input is closed. Default: 300.
    pub render_timeout_secs: u64,

    /// Time the analyzer may keep running after its input is closed. Default: 120.
    pub analyze_timeout_secs: u64,

    /// `PATH` handed to spawned programs. `None` inherits the caller's.
    pub search_path: Option<OsString>,

    /// Download timeout for URL inputs in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Optional observer for pipeline events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for SpoolConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            compression_level: 6,
            renderer: Some(ProcessCommand::default_renderer()),
            analyzer: Some(ProcessCommand::default_analyzer()),
            page_magic: PNG_SIGNATURE.to_vec(),
            render_timeout_secs: 300,
            analyze_timeout_secs: 120,
            search_path: None,
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for SpoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpoolConfig")
            .field("chunk_size", &self.chunk_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("compression_level", &self.compression_level)
            .field("renderer", &self.renderer)
            .field("analyzer", &self.analyzer)
            .field("page_magic", &self.page_magic)
            .field("render_timeout_secs", &self.render_timeout_secs)
            .field("analyze_timeout_secs", &self.analyze_timeout_secs)
            .field("search_path", &self.search_path)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl SpoolConfig {
    /// Create a new builder for `SpoolConfig`.
    pub fn builder() -> SpoolConfigBuilder {
        SpoolConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    pub fn analyze_timeout(&self) -> Duration {
        Duration::from_secs(self.analyze_timeout_secs)
    }
}

/// Builder for [`SpoolConfig`].
#[derive(Debug)]
pub struct SpoolConfigBuilder {
    config: SpoolConfig,
}

impl SpoolConfigBuilder {
    pub fn chunk_size(mut self, bytes: usize) -> Self {
        self.config.chunk_size = bytes.max(512);
        self
    }

    pub fn queue_capacity(mut self, buffers: usize) -> Self {
        self.config.queue_capacity = buffers.max(1);
        self
    }

    pub fn compression_level(mut self, level: u32) -> Self {
        self.config.compression_level = level.min(9);
        self
    }

    pub fn renderer(mut self, cmd: ProcessCommand) -> Self {
        self.config.renderer = Some(cmd);
        self
    }

    pub fn analyzer(mut self, cmd: ProcessCommand) -> Self {
        self.config.analyzer = Some(cmd);
        self
    }

    /// Skip the renderer; the job is prepared without a preview.
    pub fn disable_preview(mut self) -> Self {
        self.config.renderer = None;
        self
    }

    /// Skip the analyzer; the job is described as one grayscale page.
    pub fn disable_ink_analysis(mut self) -> Self {
        self.config.analyzer = None;
        self
    }

    pub fn page_magic(mut self, magic: impl Into<Vec<u8>>) -> Self {
        self.config.page_magic = magic.into();
        self
    }

    pub fn render_timeout_secs(mut self, secs: u64) -> Self {
        self.config.render_timeout_secs = secs;
        self
    }

    pub fn analyze_timeout_secs(mut self, secs: u64) -> Self {
        self.config.analyze_timeout_secs = secs;
        self
    }

    pub fn search_path(mut self, path: impl Into<OsString>) -> Self {
        self.config.search_path = Some(path.into());
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<SpoolConfig, SpoolError> {
        let c = &self.config;
        if c.page_magic.is_empty() {
            return Err(SpoolError::InvalidConfig(
                "page magic must not be empty".into(),
            ));
        }
        if c.compression_level > 9 {
            return Err(SpoolError::InvalidConfig(format!(
                "compression level must be 0–9, got {}",
                c.compression_level
            )));
        }
        for cmd in [&c.renderer, &c.analyzer].into_iter().flatten() {
            if cmd.program.trim().is_empty() {
                return Err(SpoolError::InvalidConfig(
                    "external program name must not be empty".into(),
                ));
            }
        }
        Ok(self.config)
    }
}
