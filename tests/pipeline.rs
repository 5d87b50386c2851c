//! Integration tests for the full spool pipeline.
//!
//! External stages are played by `cat` and `sh`, so these run anywhere with
//! a POSIX shell. The Ghostscript test at the bottom is gated behind
//! `SPOOL_E2E` because it needs `gs` on the PATH.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture
#![cfg(unix)]

use edgequake_spool::{
    spool_reader, spool_to_dir, CancelToken, ColorMode, PipelineProgressCallback, PipelineStats,
    PreviewContainer, ProcessCommand, SpoolConfig, SpoolError, StageWarning, PNG_SIGNATURE,
};
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn sh(script: &str) -> ProcessCommand {
    ProcessCommand::new("sh", ["-c", script])
}

/// An analyzer that swallows the document and then prints `report`.
fn fake_analyzer(report: &str) -> ProcessCommand {
    sh(&format!("cat >/dev/null; printf '{report}'"))
}

fn gunzip(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).expect("gunzip");
    out
}

/// A document whose bytes already look like renderer output, so `cat`
/// can stand in for the renderer.
fn framed_pages(pages: &[&[u8]]) -> Vec<u8> {
    let mut doc = Vec::new();
    for page in pages {
        doc.extend_from_slice(&PNG_SIGNATURE);
        doc.extend_from_slice(page);
    }
    doc
}

fn has_warning(warnings: &[StageWarning], pred: impl Fn(&StageWarning) -> bool) -> bool {
    warnings.iter().any(pred)
}

#[derive(Default)]
struct Events(Mutex<Vec<String>>);

impl PipelineProgressCallback for Events {
    fn on_pipeline_start(&self, sinks: &[String]) {
        self.0.lock().unwrap().push(format!("start:{}", sinks.join(",")));
    }

    fn on_sink_dropped(&self, sink: &str, _error: &str) {
        self.0.lock().unwrap().push(format!("dropped:{sink}"));
    }

    fn on_stage_complete(&self, stage: &str, _elapsed: Duration) {
        self.0.lock().unwrap().push(format!("stage:{stage}"));
    }

    fn on_pipeline_complete(&self, _stats: &PipelineStats) {
        self.0.lock().unwrap().push("complete".to_string());
    }
}

// ── Happy path ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn all_three_consumers_see_the_whole_document() {
    let doc = framed_pages(&[b"first page", b"second page"]);
    let config = SpoolConfig::builder()
        .renderer(ProcessCommand::new("cat", Vec::<String>::new()))
        .analyzer(fake_analyzer(
            " 0.20 0.50 0.10 0.00 CMYK OK\\n 0.10 0.10 0.10 0.00 CMYK OK\\n",
        ))
        .build()
        .expect("config");

    let mut source = doc.as_slice();
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(job.warnings.is_empty(), "warnings: {:?}", job.warnings);
    assert_eq!(gunzip(&job.compressed), doc);

    let preview = job.preview.as_ref().expect("preview");
    assert_eq!(preview.page_count(), 2);
    assert_eq!(preview.page_offset(0), Some(13));
    let mut first = PNG_SIGNATURE.to_vec();
    first.extend_from_slice(b"first page");
    assert_eq!(preview.decode_page(0), Some(first));

    assert_eq!(job.descriptor.total_pages, 2);
    assert_eq!(job.descriptor.color_pages, 1);
    assert_eq!(job.descriptor.grayscale_pages, 1);
    assert_eq!(job.descriptor.color_map, "10");
    assert_eq!(job.descriptor.color_mode, ColorMode::Color);
    assert_eq!(job.stats.preview_pages, Some(2));
    assert!(job.stats.render_ms.is_some());
}

#[tokio::test]
async fn large_document_with_small_chunks() {
    let doc: Vec<u8> = (0..3 * 1024 * 1024u32).map(|i| (i * 7 % 256) as u8).collect();
    let config = SpoolConfig::builder()
        .chunk_size(4096)
        .renderer(sh("cat >/dev/null"))
        .analyzer(fake_analyzer(" 0.0 0.0 0.0 0.3 CMYK OK\\n"))
        .build()
        .expect("config");

    let mut source = doc.as_slice();
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert_eq!(job.stats.bytes_read, doc.len() as u64);
    assert_eq!(gunzip(&job.compressed), doc);
    assert_eq!(job.descriptor.color_map, "0");
    // Renderer printed nothing: a valid, empty container.
    assert_eq!(job.preview.as_ref().map(PreviewContainer::page_count), Some(0));
}

// ── Degraded jobs ───────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_programs_degrade_but_do_not_fail() {
    let config = SpoolConfig::builder()
        .renderer(ProcessCommand::new("edgequake-missing-renderer", ["-q"]))
        .analyzer(ProcessCommand::new("edgequake-missing-analyzer", ["-q"]))
        .build()
        .expect("config");

    let mut source: &[u8] = b"%!PS\nshowpage\n";
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(job.preview.is_none());
    assert_eq!(gunzip(&job.compressed), b"%!PS\nshowpage\n");
    assert!(job.ink.fallback);
    assert_eq!(job.descriptor.total_pages, 1);
    assert_eq!(job.descriptor.color_map, "0");
    let spawn_failures = job
        .warnings
        .iter()
        .filter(|w| matches!(w, StageWarning::SpawnFailed { .. }))
        .count();
    assert_eq!(spawn_failures, 2);
}

#[tokio::test]
async fn search_path_limits_where_programs_are_found() {
    let empty = tempfile::tempdir().expect("tempdir");
    let config = SpoolConfig::builder()
        .renderer(ProcessCommand::new("cat", Vec::<String>::new()))
        .disable_ink_analysis()
        .search_path(empty.path())
        .build()
        .expect("config");

    let mut source: &[u8] = b"data";
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(job.preview.is_none());
    assert!(has_warning(&job.warnings, |w| matches!(
        w,
        StageWarning::SpawnFailed { program, .. } if program == "cat"
    )));
}

#[tokio::test]
async fn renderer_exiting_early_is_dropped_from_fan_out() {
    let doc = vec![b'x'; 4 * 1024 * 1024];
    let events = Arc::new(Events::default());
    let config = SpoolConfig::builder()
        .renderer(sh("exit 0"))
        .analyzer(fake_analyzer(" 0.1 0.1 0.1 0.0 CMYK OK\\n"))
        .progress_callback(events.clone())
        .build()
        .expect("config");

    let mut source = doc.as_slice();
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(has_warning(&job.warnings, |w| matches!(
        w,
        StageWarning::SinkDropped { sink, .. } if sink == "renderer"
    )));
    assert_eq!(job.stats.dropped_sinks, vec!["renderer".to_string()]);
    // The others still received every byte.
    assert_eq!(gunzip(&job.compressed), doc);
    assert_eq!(job.descriptor.total_pages, 1);
    assert!(!job.ink.fallback);

    let events = events.0.lock().unwrap().clone();
    assert_eq!(events.first().map(String::as_str), Some("start:gzip,renderer,analyzer"));
    assert!(events.contains(&"dropped:renderer".to_string()));
    assert_eq!(events.last().map(String::as_str), Some("complete"));
}

#[tokio::test]
async fn slow_renderer_is_killed_after_its_budget() {
    let config = SpoolConfig::builder()
        .renderer(sh("cat >/dev/null; exec sleep 30"))
        .render_timeout_secs(1)
        .analyzer(fake_analyzer(" 0.1 0.1 0.1 0.0 CMYK OK\\n"))
        .build()
        .expect("config");

    let mut source: &[u8] = b"%!PS\n";
    let job = tokio::time::timeout(
        Duration::from_secs(15),
        spool_reader(&mut source, &config, &CancelToken::new()),
    )
    .await
    .expect("timeout must bound the renderer")
    .expect("spool");

    assert!(has_warning(&job.warnings, |w| matches!(
        w,
        StageWarning::TimedOut { stage, secs: 1 } if stage == "renderer"
    )));
    assert_eq!(job.descriptor.total_pages, 1);
    assert!(!job.ink.fallback);
}

#[tokio::test]
async fn failing_analyzer_output_is_still_used() {
    let config = SpoolConfig::builder()
        .disable_preview()
        .analyzer(sh(
            "cat >/dev/null; printf ' 0.3 0.3 0.3 0.0 CMYK OK\\n'; exit 2",
        ))
        .build()
        .expect("config");

    let mut source: &[u8] = b"%!PS\n";
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(has_warning(&job.warnings, |w| matches!(
        w,
        StageWarning::ExitFailure { stage, .. } if stage == "analyzer"
    )));
    assert_eq!(job.descriptor.color_map, "0");
    assert!(!job.ink.fallback);
}

#[tokio::test]
async fn malformed_report_lines_are_skipped() {
    let config = SpoolConfig::builder()
        .disable_preview()
        .analyzer(fake_analyzer(
            "GPL Ghostscript banner\\n 0.0 0.0 0.0 0.0 CMYK OK\\n 0.0 0.4 0.4 0.0 CMYK OK\\n",
        ))
        .build()
        .expect("config");

    let mut source: &[u8] = b"%!PS\n";
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(has_warning(&job.warnings, |w| matches!(
        w,
        StageWarning::MalformedLine { line_no: 1, .. }
    )));
    // Blank page skipped, remaining page is color (C != M).
    assert_eq!(job.descriptor.total_pages, 1);
    assert_eq!(job.descriptor.color_map, "1");
    assert_eq!(job.ink.skipped_empty_pages, 1);
}

// ── Cancellation ────────────────────────────────────────────────────────────

#[tokio::test]
async fn cancel_while_waiting_for_renderer() {
    let config = SpoolConfig::builder()
        .renderer(sh("cat >/dev/null; exec sleep 30"))
        .disable_ink_analysis()
        .build()
        .expect("config");

    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        trigger.cancel();
    });

    let mut source: &[u8] = b"%!PS\n";
    let result = tokio::time::timeout(
        Duration::from_secs(10),
        spool_reader(&mut source, &config, &cancel),
    )
    .await
    .expect("cancellation must interrupt the wait");

    assert!(matches!(result, Err(SpoolError::Cancelled)));
}

// ── Output directory ────────────────────────────────────────────────────────

#[tokio::test]
async fn spool_to_dir_writes_all_artifacts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("doc.bin");
    let doc = framed_pages(&[b"only page"]);
    std::fs::write(&input, &doc).expect("write input");
    let out = dir.path().join("out");

    let config = SpoolConfig::builder()
        .renderer(ProcessCommand::new("cat", Vec::<String>::new()))
        .analyzer(fake_analyzer(" 0.0 0.0 0.0 0.5 CMYK OK\\n"))
        .build()
        .expect("config");

    let job = spool_to_dir(input.to_str().expect("utf8"), &out, &config, &CancelToken::new())
        .await
        .expect("spool_to_dir");

    assert_eq!(gunzip(&std::fs::read(out.join("document.gz")).expect("payload")), doc);

    let preview =
        PreviewContainer::parse(std::fs::read(out.join("preview.bin")).expect("preview"))
            .expect("parse preview");
    assert_eq!(preview.page_count(), 1);
    assert_eq!(Some(preview.as_bytes()), job.preview.as_ref().map(|p| p.as_bytes()));

    let manifest: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out.join("job.json")).expect("manifest"))
            .expect("json");
    assert_eq!(manifest["descriptor"]["color_mode"], "monochrome");
    assert_eq!(manifest["preview_file"], "preview.bin");
    assert_eq!(manifest["attributes"].as_array().map(Vec::len), Some(0));

    // No temp files left behind.
    let leftovers: Vec<PathBuf> = std::fs::read_dir(&out)
        .expect("read_dir")
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|x| x == "tmp"))
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {leftovers:?}");
}

// ── Real Ghostscript ────────────────────────────────────────────────────────

/// Skip unless SPOOL_E2E is set; Ghostscript must then be installed.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("SPOOL_E2E").is_err() {
            println!("SKIP: set SPOOL_E2E=1 to run Ghostscript tests");
            return;
        }
    }};
}

#[tokio::test]
async fn ghostscript_renders_and_analyzes_postscript() {
    e2e_skip_unless_ready!();

    // One page with a red box, one blank page, one with black text.
    let doc = b"%!PS\n\
        1 0 0 setrgbcolor 100 100 200 200 rectfill showpage\n\
        showpage\n\
        0 setgray /Helvetica findfont 24 scalefont setfont 72 720 moveto (Hello) show showpage\n";

    let config = SpoolConfig::default();
    let mut source: &[u8] = doc;
    let job = spool_reader(&mut source, &config, &CancelToken::new())
        .await
        .expect("spool");

    assert!(job.warnings.is_empty(), "warnings: {:?}", job.warnings);
    assert_eq!(job.preview.as_ref().map(PreviewContainer::page_count), Some(3));
    assert_eq!(job.descriptor.color_map, "10");
    assert_eq!(job.descriptor.color_mode, ColorMode::Color);
}
