//! Job descriptor: the page counts and color map handed to the API client.

use crate::pipeline::inkcov::{ColorMap, InkReport};
use serde::{Deserialize, Serialize};

/// Attribute flag set on jobs that contain at least one color page.
pub const COLOR_ATTRIBUTE: &str = "color";

/// Whether the job needs a color device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    Color,
    Monochrome,
}

/// Counts and per-page color digits describing one print job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub total_pages: usize,
    pub color_pages: usize,
    pub grayscale_pages: usize,
    /// One `'0'` (grayscale) or `'1'` (color) per page, in document order.
    pub color_map: String,
    pub color_mode: ColorMode,
}

impl JobDescriptor {
    pub fn new(
        total_pages: usize,
        color_pages: usize,
        grayscale_pages: usize,
        color_map: &ColorMap,
    ) -> Self {
        let color_mode = if color_pages > 0 {
            ColorMode::Color
        } else {
            ColorMode::Monochrome
        };
        Self {
            total_pages,
            color_pages,
            grayscale_pages,
            color_map: color_map.to_digits(),
            color_mode,
        }
    }

    pub fn from_report(report: &InkReport) -> Self {
        Self::new(
            report.valid_pages,
            report.color_pages,
            report.grayscale_pages,
            &report.color_map,
        )
    }

    pub fn is_color(&self) -> bool {
        self.color_mode == ColorMode::Color
    }

    /// Job attribute flags for the remote API.
    pub fn attributes(&self) -> Vec<&'static str> {
        if self.is_color() {
            vec![COLOR_ATTRIBUTE]
        } else {
            Vec::new()
        }
    }
}
