//! Ink-coverage report parsing and color classification.
//!
//! The analyzer prints one line per page:
//!
//! ```text
//!  0.02616  0.01140  0.01041  0.00000 CMYK OK
//! ```
//!
//! Each line is parsed into an [`InkCoverage`] and classified:
//!
//! * **empty**: all four components are exactly zero; the page is skipped
//! * **color**: cyan, magenta and yellow are not all equal
//! * **grayscale**: everything else, including pages with equal non-zero
//!   C/M/Y and any amount of black
//!
//! The resulting [`ColorMap`] has one digit per non-empty page. A report
//! without a single usable page is replaced by one grayscale page so a job
//! is never submitted with zero pages.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};

static RE_INKCOV_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\s*(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+(\d+(?:\.\d+)?)\s+CMYK OK\s*$",
    )
    .unwrap()
});

/// Per-page ink usage reported by the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InkCoverage {
    pub cyan: f64,
    pub magenta: f64,
    pub yellow: f64,
    pub black: f64,
}

impl InkCoverage {
    pub fn new(cyan: f64, magenta: f64, yellow: f64, black: f64) -> Self {
        Self {
            cyan,
            magenta,
            yellow,
            black,
        }
    }

    /// Parse one analyzer line; `None` if it does not have the expected shape.
    pub fn parse_line(line: &str) -> Option<Self> {
        let caps = RE_INKCOV_LINE.captures(line)?;
        let component = |i: usize| caps[i].parse::<f64>().ok();
        Some(Self::new(
            component(1)?,
            component(2)?,
            component(3)?,
            component(4)?,
        ))
    }

    #[allow(clippy::float_cmp)]
    pub fn is_empty(&self) -> bool {
        self.cyan == 0.0 && self.magenta == 0.0 && self.yellow == 0.0 && self.black == 0.0
    }

    #[allow(clippy::float_cmp)]
    pub fn classify(&self) -> PageColor {
        if self.is_empty() {
            PageColor::Empty
        } else if self.cyan != self.magenta || self.magenta != self.yellow {
            PageColor::Color
        } else {
            PageColor::Grayscale
        }
    }
}

/// Classification of a single page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageColor {
    Empty,
    Grayscale,
    Color,
}

/// One parsed report line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageInk {
    /// 1-indexed line in the analyzer output.
    pub line_no: usize,
    pub coverage: InkCoverage,
    pub color: PageColor,
}

/// Ordered grayscale/color flags, one per non-empty page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColorMap(Vec<bool>);

impl ColorMap {
    pub fn push(&mut self, is_color: bool) {
        self.0.push(is_color);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn color_count(&self) -> usize {
        self.0.iter().filter(|&&c| c).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.0.iter().copied()
    }

    /// `'0'` for grayscale and `'1'` for color, in page order.
    pub fn to_digits(&self) -> String {
        self.0.iter().map(|&c| if c { '1' } else { '0' }).collect()
    }
}

impl FromIterator<bool> for ColorMap {
    fn from_iter<I: IntoIterator<Item = bool>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ColorMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_digits())
    }
}

/// Everything derived from one analyzer run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InkReport {
    /// Every well-formed line, empty pages included.
    pub pages: Vec<PageInk>,
    pub color_map: ColorMap,
    pub valid_pages: usize,
    pub color_pages: usize,
    pub grayscale_pages: usize,
    /// Well-formed lines with all-zero ink.
    pub skipped_empty_pages: usize,
    /// `(line_no, line)` of every non-blank line that failed to parse.
    pub malformed_lines: Vec<(usize, String)>,
    /// True when the single-grayscale-page substitute was used.
    pub fallback: bool,
}

/// Parse analyzer output and classify every page.
pub fn analyze(text: &str) -> InkReport {
    let mut report = InkReport::default();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let Some(coverage) = InkCoverage::parse_line(line) else {
            warn!("Ignoring malformed ink report line {}: {:?}", line_no, line);
            report.malformed_lines.push((line_no, line.to_string()));
            continue;
        };

        let color = coverage.classify();
        debug!("Ink line {}: {:?} → {:?}", line_no, coverage, color);
        match color {
            PageColor::Empty => report.skipped_empty_pages += 1,
            PageColor::Grayscale => report.color_map.push(false),
            PageColor::Color => report.color_map.push(true),
        }
        report.pages.push(PageInk {
            line_no,
            coverage,
            color,
        });
    }

    if report.color_map.is_empty() {
        info!("No printable pages in ink report, assuming one grayscale page");
        report.color_map.push(false);
        report.fallback = true;
    }

    report.valid_pages = report.color_map.len();
    report.color_pages = report.color_map.color_count();
    report.grayscale_pages = report.valid_pages - report.color_pages;

    if report.skipped_empty_pages > 0 {
        info!("Skipped {} empty pages", report.skipped_empty_pages);
    }

    report
}

/// [`analyze`] over raw process output; invalid UTF-8 is replaced, not rejected.
pub fn analyze_bytes(output: &[u8]) -> InkReport {
    analyze(&String::from_utf8_lossy(output))
}
