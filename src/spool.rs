//! Top-level entry points: prepare a print job from a document.

use crate::cancel::CancelToken;
use crate::config::{ProcessCommand, SpoolConfig};
use crate::error::{SpoolError, StageWarning};
use crate::output::{JobArtifacts, PipelineStats, MANIFEST_FILE, PAYLOAD_FILE, PREVIEW_FILE};
use crate::pipeline::compress::CompressionSink;
use crate::pipeline::descriptor::JobDescriptor;
use crate::pipeline::distribute::distribute;
use crate::pipeline::inkcov;
use crate::pipeline::input;
use crate::pipeline::preview::PreviewContainer;
use crate::pipeline::process::{ExternalProcess, ProcessOutput};
use crate::pipeline::sink::Sink;
use std::io;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::io::AsyncRead;
use tracing::{debug, info, warn};

/// Stage name of the preview renderer.
pub const RENDER_STAGE: &str = "renderer";
/// Stage name of the ink coverage analyzer.
pub const ANALYZE_STAGE: &str = "analyzer";

/// Prepare a print job from a file path, `-` (stdin), or an HTTP(S) URL.
///
/// This is the main entry point of the library.
pub async fn spool(
    input_str: impl AsRef<str>,
    config: &SpoolConfig,
) -> Result<JobArtifacts, SpoolError> {
    spool_with_cancel(input_str, config, &CancelToken::new()).await
}

/// Like [`spool`], but stops with [`SpoolError::Cancelled`] once `cancel` fires.
pub async fn spool_with_cancel(
    input_str: impl AsRef<str>,
    config: &SpoolConfig,
    cancel: &CancelToken,
) -> Result<JobArtifacts, SpoolError> {
    let input_str = input_str.as_ref();
    info!("Preparing job: {}", input_str);

    // `resolved` owns the temp dir of a downloaded document; keep it alive
    // until the pipeline is done reading.
    let resolved = cancel
        .run(input::resolve_input(input_str, config.download_timeout_secs))
        .await??;
    let mut reader = resolved.open().await?;
    spool_reader(&mut reader, config, cancel).await
}

/// Run the full pipeline over an already-open document stream.
///
/// The stream is read exactly once. Every chunk goes to the gzip sink and
/// to whichever of the renderer and analyzer could be started.
pub async fn spool_reader<R>(
    source: &mut R,
    config: &SpoolConfig,
    cancel: &CancelToken,
) -> Result<JobArtifacts, SpoolError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let total_start = Instant::now();
    let progress = config.progress_callback.as_ref();
    let search_path = config.search_path.as_deref();
    let mut warnings = Vec::new();

    let mut compressor = CompressionSink::spawn(config.compression_level, config.queue_capacity);
    let mut renderer = start_stage(
        RENDER_STAGE,
        config.renderer.as_ref(),
        search_path,
        &mut warnings,
    );
    let mut analyzer = start_stage(
        ANALYZE_STAGE,
        config.analyzer.as_ref(),
        search_path,
        &mut warnings,
    );

    // ── 1. Fan the document out ──────────────────────────────────────────
    let distribute_start = Instant::now();
    let report = {
        let mut sinks: Vec<&mut dyn Sink> = Vec::with_capacity(3);
        sinks.push(&mut compressor);
        if let Some(p) = renderer.as_mut() {
            sinks.push(p);
        }
        if let Some(p) = analyzer.as_mut() {
            sinks.push(p);
        }
        if let Some(cb) = progress {
            let names: Vec<String> = sinks.iter().map(|s| s.name().to_string()).collect();
            cb.on_pipeline_start(&names);
        }
        distribute(source, &mut sinks, config.chunk_size, cancel, progress).await?
    };
    let distribute_elapsed = distribute_start.elapsed();
    if let Some(cb) = progress {
        cb.on_stage_complete("distribute", distribute_elapsed);
    }

    for dropped in &report.dropped {
        if dropped.name == compressor.name() {
            return Err(SpoolError::Compression(io::Error::other(format!(
                "compressor rejected input after {} bytes: {}",
                dropped.bytes_written, dropped.error
            ))));
        }
        warnings.push(StageWarning::SinkDropped {
            sink: dropped.name.clone(),
            bytes_written: dropped.bytes_written,
            detail: dropped.error.clone(),
        });
    }

    // ── 2. Collect the compressed payload ────────────────────────────────
    let compressed_in = compressor.bytes_written();
    let compressed = compressor.into_output().map_err(SpoolError::Compression)?;
    if compressed_in != report.bytes_read {
        return Err(SpoolError::Compression(io::Error::other(format!(
            "compressor accepted {} of {} bytes",
            compressed_in, report.bytes_read
        ))));
    }

    // ── 3. Join the external stages concurrently ─────────────────────────
    let (render_out, analyze_out) = tokio::join!(
        join_stage(renderer, config.render_timeout(), cancel),
        join_stage(analyzer, config.analyze_timeout(), cancel),
    );
    let render_out = render_out?;
    let analyze_out = analyze_out?;

    if let Some(out) = &render_out {
        record_exit(RENDER_STAGE, out, config.render_timeout(), &mut warnings);
        if let Some(cb) = progress {
            cb.on_stage_complete(RENDER_STAGE, out.elapsed);
        }
    }
    if let Some(out) = &analyze_out {
        record_exit(ANALYZE_STAGE, out, config.analyze_timeout(), &mut warnings);
        if let Some(cb) = progress {
            cb.on_stage_complete(ANALYZE_STAGE, out.elapsed);
        }
    }

    // ── 4. Build the artifacts ───────────────────────────────────────────
    let preview = render_out.as_ref().and_then(|out| {
        match PreviewContainer::encode(&out.stdout, &config.page_magic) {
            Ok(container) => Some(container),
            Err(e) => {
                warn!("{}: preview container unavailable: {}", RENDER_STAGE, e);
                warnings.push(StageWarning::PreviewUnavailable {
                    detail: e.to_string(),
                });
                None
            }
        }
    });

    let ink_output = analyze_out.as_ref().map(|o| o.stdout.as_slice()).unwrap_or(&[]);
    let ink = inkcov::analyze_bytes(ink_output);
    for (line_no, line) in &ink.malformed_lines {
        warnings.push(StageWarning::MalformedLine {
            line_no: *line_no,
            line: line.clone(),
        });
    }
    let descriptor = JobDescriptor::from_report(&ink);

    let stats = PipelineStats {
        bytes_read: report.bytes_read,
        compressed_bytes: compressed.len(),
        preview_bytes: preview.as_ref().map(PreviewContainer::len),
        preview_pages: preview.as_ref().map(PreviewContainer::page_count),
        dropped_sinks: report.dropped.iter().map(|d| d.name.clone()).collect(),
        distribute_ms: distribute_elapsed.as_millis() as u64,
        render_ms: render_out.as_ref().map(|o| o.elapsed.as_millis() as u64),
        analyze_ms: analyze_out.as_ref().map(|o| o.elapsed.as_millis() as u64),
        total_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Job prepared: {} bytes in, {} compressed, {} page(s) ({} color), {} warning(s)",
        stats.bytes_read,
        stats.compressed_bytes,
        descriptor.total_pages,
        descriptor.color_pages,
        warnings.len()
    );

    if let Some(cb) = progress {
        cb.on_pipeline_complete(&stats);
    }

    Ok(JobArtifacts {
        compressed,
        preview,
        ink,
        descriptor,
        stats,
        warnings,
    })
}

/// Prepare a job and write its artifacts into `dir`.
///
/// Writes [`PAYLOAD_FILE`], [`PREVIEW_FILE`] (when a preview exists) and
/// [`MANIFEST_FILE`]. Each file is written atomically (temp file + rename).
pub async fn spool_to_dir(
    input_str: impl AsRef<str>,
    dir: impl AsRef<Path>,
    config: &SpoolConfig,
    cancel: &CancelToken,
) -> Result<JobArtifacts, SpoolError> {
    let artifacts = spool_with_cancel(input_str, config, cancel).await?;
    write_artifacts(&artifacts, dir.as_ref()).await?;
    Ok(artifacts)
}

/// Write already-prepared artifacts into `dir`, creating it if needed.
pub async fn write_artifacts(artifacts: &JobArtifacts, dir: &Path) -> Result<(), SpoolError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| SpoolError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

    write_atomic(&dir.join(PAYLOAD_FILE), &artifacts.compressed).await?;
    if let Some(preview) = &artifacts.preview {
        write_atomic(&dir.join(PREVIEW_FILE), preview.as_bytes()).await?;
    }

    let manifest_path = dir.join(MANIFEST_FILE);
    let manifest = serde_json::to_vec_pretty(&artifacts.manifest()).map_err(|e| {
        SpoolError::OutputWriteFailed {
            path: manifest_path.clone(),
            source: io::Error::other(e),
        }
    })?;
    write_atomic(&manifest_path, &manifest).await?;

    debug!("Artifacts written to {}", dir.display());
    Ok(())
}

/// Synchronous wrapper around [`spool`].
///
/// Creates a temporary tokio runtime internally.
pub fn spool_sync(
    input_str: impl AsRef<str>,
    config: &SpoolConfig,
) -> Result<JobArtifacts, SpoolError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| SpoolError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(spool(input_str, config))
}

// ── Helpers ──────────────────────────────────────────────────────────────

fn start_stage(
    stage: &str,
    cmd: Option<&ProcessCommand>,
    search_path: Option<&std::ffi::OsStr>,
    warnings: &mut Vec<StageWarning>,
) -> Option<ExternalProcess> {
    let Some(cmd) = cmd else {
        debug!("{}: disabled", stage);
        return None;
    };
    match ExternalProcess::spawn(stage, cmd, search_path) {
        Ok(process) => Some(process),
        Err(e) => {
            warn!("{}: failed to start '{}': {}", stage, cmd.program, e);
            warnings.push(StageWarning::SpawnFailed {
                stage: stage.to_string(),
                program: cmd.program.clone(),
                detail: e.to_string(),
            });
            None
        }
    }
}

async fn join_stage(
    process: Option<ExternalProcess>,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<Option<ProcessOutput>, SpoolError> {
    match process {
        Some(p) => p.join(timeout, cancel).await.map(Some),
        None => Ok(None),
    }
}

fn record_exit(
    stage: &str,
    out: &ProcessOutput,
    timeout: Duration,
    warnings: &mut Vec<StageWarning>,
) {
    if out.timed_out {
        warnings.push(StageWarning::TimedOut {
            stage: stage.to_string(),
            secs: timeout.as_secs(),
        });
    } else if !out.success() {
        let status = out
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "unknown status".to_string());
        warn!("{}: {}", stage, status);
        warnings.push(StageWarning::ExitFailure {
            stage: stage.to_string(),
            status,
        });
    }
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SpoolError> {
    let failed = |source| SpoolError::OutputWriteFailed {
        path: path.to_path_buf(),
        source,
    };
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".tmp");
    let tmp_path = std::path::PathBuf::from(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(failed)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(failed)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::descriptor::ColorMode;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn in_memory_config() -> SpoolConfig {
        SpoolConfig::builder()
            .disable_preview()
            .disable_ink_analysis()
            .build()
            .expect("config")
    }

    fn gunzip(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        GzDecoder::new(data).read_to_end(&mut out).expect("gunzip");
        out
    }

    #[tokio::test]
    async fn compresses_without_external_stages() {
        let doc: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        let mut source = doc.as_slice();

        let artifacts = spool_reader(&mut source, &in_memory_config(), &CancelToken::new())
            .await
            .expect("spool");

        assert_eq!(gunzip(&artifacts.compressed), doc);
        assert_eq!(artifacts.stats.bytes_read, doc.len() as u64);
        assert!(artifacts.preview.is_none());
        assert!(artifacts.warnings.is_empty());
    }

    #[tokio::test]
    async fn missing_analyzer_falls_back_to_one_gray_page() {
        let mut source: &[u8] = b"%!PS\n";
        let artifacts = spool_reader(&mut source, &in_memory_config(), &CancelToken::new())
            .await
            .expect("spool");

        assert!(artifacts.ink.fallback);
        assert_eq!(artifacts.descriptor.total_pages, 1);
        assert_eq!(artifacts.descriptor.color_map, "0");
        assert_eq!(artifacts.descriptor.color_mode, ColorMode::Monochrome);
    }

    #[tokio::test]
    async fn empty_document_still_produces_a_payload() {
        let mut source: &[u8] = b"";
        let artifacts = spool_reader(&mut source, &in_memory_config(), &CancelToken::new())
            .await
            .expect("spool");
        assert!(gunzip(&artifacts.compressed).is_empty());
        assert_eq!(artifacts.stats.bytes_read, 0);
    }

    #[tokio::test]
    async fn source_failure_is_fatal() {
        let mut source = tokio_test::io::Builder::new()
            .read(b"partial")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let err = spool_reader(&mut source, &in_memory_config(), &CancelToken::new())
            .await
            .err()
            .expect("must fail");
        assert!(
            matches!(err, SpoolError::SourceRead { bytes_read: 7, .. }),
            "got: {err:?}"
        );
    }

    #[tokio::test]
    async fn cancelled_token_stops_the_job() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mut source: &[u8] = b"data";
        let err = spool_reader(&mut source, &in_memory_config(), &cancel)
            .await
            .err()
            .expect("must fail");
        assert!(err.is_cancelled());
    }

    #[tokio::test]
    async fn missing_renderer_is_a_warning() {
        let config = SpoolConfig::builder()
            .renderer(ProcessCommand::new("edgequake-no-such-renderer", ["-q"]))
            .disable_ink_analysis()
            .build()
            .expect("config");
        let mut source: &[u8] = b"%!PS\n";
        let artifacts = spool_reader(&mut source, &config, &CancelToken::new())
            .await
            .expect("spool");

        assert!(artifacts.preview.is_none());
        assert!(matches!(
            artifacts.warnings.as_slice(),
            [StageWarning::SpawnFailed { stage, .. }] if stage == RENDER_STAGE
        ));
        assert_eq!(gunzip(&artifacts.compressed), b"%!PS\n");
    }

    #[tokio::test]
    async fn writes_artifacts_to_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let input = dir.path().join("doc.ps");
        std::fs::write(&input, b"%!PS\nshowpage\n").expect("write");
        let out_dir = dir.path().join("job");

        let artifacts = spool_to_dir(
            input.to_str().expect("utf8"),
            &out_dir,
            &in_memory_config(),
            &CancelToken::new(),
        )
        .await
        .expect("spool_to_dir");

        let payload = std::fs::read(out_dir.join(PAYLOAD_FILE)).expect("payload");
        assert_eq!(payload, artifacts.compressed);
        assert!(!out_dir.join(PREVIEW_FILE).exists());

        let manifest: serde_json::Value =
            serde_json::from_slice(&std::fs::read(out_dir.join(MANIFEST_FILE)).expect("manifest"))
                .expect("json");
        assert_eq!(manifest["descriptor"]["total_pages"], 1);
        assert_eq!(manifest["payload_file"], PAYLOAD_FILE);
        assert!(manifest["preview_file"].is_null());
    }
}
