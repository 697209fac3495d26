use image::DynamicImage;
use imageproc::point::Point;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding box in pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Smallest box containing every point, or None for an empty slice
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        let min_x = min_x.max(0) as u32;
        let min_y = min_y.max(0) as u32;
        Some(Self {
            x: min_x,
            y: min_y,
            width: (max_x.max(0) as u32) - min_x + 1,
            height: (max_y.max(0) as u32) - min_y + 1,
        })
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    /// Clip the box so it lies inside an image of the given size
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let x = self.x.min(width);
        let y = self.y.min(height);
        Self {
            x,
            y,
            width: self.width.min(width - x),
            height: self.height.min(height - y),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// A traced boundary of a connected foreground region
#[derive(Debug, Clone)]
pub struct Contour {
    pub points: Vec<Point<i32>>,
    pub bbox: BoundingBox,
    /// True when the boundary encloses a background hole rather than a region
    pub is_hole: bool,
}

impl Contour {
    pub fn width(&self) -> u32 {
        self.bbox.width
    }

    pub fn height(&self) -> u32 {
        self.bbox.height
    }

    pub fn area(&self) -> u64 {
        self.bbox.area()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Horizontal,
    Vertical,
}

/// Bounding box of a long rule line found in a horizontal or vertical mask
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineSegment {
    pub bbox: BoundingBox,
    pub orientation: Orientation,
}

impl LineSegment {
    /// Extent along the dominant axis
    pub fn length(&self) -> u32 {
        match self.orientation {
            Orientation::Horizontal => self.bbox.width,
            Orientation::Vertical => self.bbox.height,
        }
    }

    /// Coordinate across the line: y for horizontal rules, x for vertical ones
    pub fn position(&self) -> u32 {
        match self.orientation {
            Orientation::Horizontal => self.bbox.y,
            Orientation::Vertical => self.bbox.x,
        }
    }
}

/// A plausible table cropped out of the working page
#[derive(Debug, Clone)]
pub struct TableRegion {
    /// Position among retained regions, top-to-bottom
    pub rank: usize,
    /// Deterministic name derived from rank and source file
    pub name: String,
    pub bbox: BoundingBox,
    pub image: DynamicImage,
}

/// Row and column boundary coordinates of one table, both strictly increasing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Grid {
    rows: Vec<u32>,
    columns: Vec<u32>,
}

impl Grid {
    /// Build from segments already sorted along their perpendicular axis.
    /// Segments sharing a coordinate collapse into one boundary.
    pub fn from_segments(rows: &[LineSegment], columns: &[LineSegment]) -> Self {
        Self {
            rows: strictly_increasing(rows.iter().map(LineSegment::position)),
            columns: strictly_increasing(columns.iter().map(LineSegment::position)),
        }
    }

    pub fn row_boundaries(&self) -> &[u32] {
        &self.rows
    }

    pub fn column_boundaries(&self) -> &[u32] {
        &self.columns
    }

    /// Number of cell rows, zero when fewer than two boundaries exist
    pub fn row_count(&self) -> usize {
        self.rows.len().saturating_sub(1)
    }

    pub fn column_count(&self) -> usize {
        self.columns.len().saturating_sub(1)
    }

    /// Every cell in row-major order
    pub fn cells(&self) -> impl Iterator<Item = CellSpan> + '_ {
        self.rows.windows(2).enumerate().flat_map(move |(row, ys)| {
            self.columns.windows(2).enumerate().map(move |(col, xs)| CellSpan {
                row,
                col,
                bbox: BoundingBox::new(xs[0], ys[0], xs[1] - xs[0], ys[1] - ys[0]),
            })
        })
    }
}

fn strictly_increasing(coords: impl Iterator<Item = u32>) -> Vec<u32> {
    let mut out: Vec<u32> = coords.collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Position and pixel extent of one grid cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub row: usize,
    pub col: usize,
    pub bbox: BoundingBox,
}

/// What a cell holds before recognition runs
#[derive(Debug, Clone)]
pub enum CellContent {
    /// Built-in header label of a recognised layout
    Label(String),
    /// Cropped cell image awaiting text recognition
    Pending(DynamicImage),
}

#[derive(Debug, Clone)]
pub struct Cell {
    pub row: usize,
    pub col: usize,
    pub content: CellContent,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableHeader {
    pub title: String,
    pub row: usize,
    pub col: usize,
}

/// Resolved text of one cell
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellValue {
    pub row: usize,
    pub col: usize,
    pub text: String,
    /// Set when recognition failed; `text` is empty in that case
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CellValue {
    pub fn is_resolved(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableResult {
    pub header: TableHeader,
    pub data: Vec<CellValue>,
}
