use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::config::ExtractionConfig;
use crate::detection::contours::{self, SortOrder};
use crate::detection::preprocessing::{self, LineMasks};
use crate::models::{Grid, LineSegment, Orientation};

/// Rule lines found inside one table region
#[derive(Debug, Clone, Default)]
pub struct GridLines {
    /// Horizontal rules, top-to-bottom
    pub rows: Vec<LineSegment>,
    /// Vertical rules, left-to-right
    pub columns: Vec<LineSegment>,
}

impl GridLines {
    pub fn to_grid(&self) -> Grid {
        Grid::from_segments(&self.rows, &self.columns)
    }
}

/// Contours of one line mask longer than `min_length` along the mask's axis
pub fn extract_lines(mask: &GrayImage, orientation: Orientation, min_length: u32) -> Vec<LineSegment> {
    let order = match orientation {
        Orientation::Horizontal => SortOrder::TopToBottom,
        Orientation::Vertical => SortOrder::LeftToRight,
    };
    let found = contours::find_sorted_contours(mask, order);
    let lines: Vec<LineSegment> = found
        .iter()
        .map(|c| LineSegment {
            bbox: c.bbox,
            orientation,
        })
        .filter(|line| line.length() > min_length)
        .collect();

    debug!(
        ?orientation,
        contours = found.len(),
        kept = lines.len(),
        "filtered rule lines"
    );
    lines
}

/// Re-detect rule lines inside a cropped table at its own resolution.
///
/// Page-level masks are tuned for the whole sheet and lose thin interior
/// rules, so each region gets its own isolation pass. Fewer than two lines
/// on an axis is not an error; the resulting grid just has no cells.
pub fn reconstruct_grid(region: &DynamicImage, config: &ExtractionConfig) -> (LineMasks, GridLines) {
    let masks = preprocessing::isolate_lines(region, config);
    let lines = GridLines {
        rows: extract_lines(&masks.horizontal, Orientation::Horizontal, config.min_row_line_length),
        columns: extract_lines(&masks.vertical, Orientation::Vertical, config.min_column_line_length),
    };
    (masks, lines)
}
