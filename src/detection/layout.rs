use image::DynamicImage;

use crate::models::{Cell, CellContent, Grid, TableHeader};

const LABEL_QUESTION_NO: &str = "પ્રશ્નક્રમ";
const LABEL_LEARNING_OUTCOME_NO: &str = "અધ્યયન નિષ્પતિ ક્રમ";
const LABEL_STUDENT_ID: &str = "વિદ્યાર્થી યુનિક આઈડી";
const LABEL_TEST_DATE: &str = "પરીક્ષણ તારીખ";

/// The fixed table layouts printed on the answer sheet, keyed by how many
/// row and column boundaries their grid has. Matching is exact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layout {
    /// 12 row boundaries x 3 column boundaries: 11 questions, 2 columns
    MarksReceived,
    /// 3 row boundaries x 3 column boundaries: id and date
    StudentSummary,
    Unrecognized,
}

impl Layout {
    pub fn from_counts(row_boundaries: usize, column_boundaries: usize) -> Self {
        match (row_boundaries, column_boundaries) {
            (12, 3) => Layout::MarksReceived,
            (3, 3) => Layout::StudentSummary,
            _ => Layout::Unrecognized,
        }
    }

    pub fn recognize(grid: &Grid) -> Self {
        Self::from_counts(grid.row_boundaries().len(), grid.column_boundaries().len())
    }

    pub fn title(&self) -> Option<&'static str> {
        match self {
            Layout::MarksReceived => Some("Marks received"),
            Layout::StudentSummary => Some("Student summary"),
            Layout::Unrecognized => None,
        }
    }

    /// Built-in text for header positions; None means the cell is read by OCR
    pub fn header_label(&self, row: usize, col: usize) -> Option<String> {
        match (self, row, col) {
            (Layout::MarksReceived, 0, 0) => Some(LABEL_QUESTION_NO.to_string()),
            (Layout::MarksReceived, 0, 1) => Some(LABEL_LEARNING_OUTCOME_NO.to_string()),
            (Layout::MarksReceived, r, 0) => Some(r.to_string()),
            (Layout::StudentSummary, 0, 0) => Some(LABEL_STUDENT_ID.to_string()),
            (Layout::StudentSummary, 1, 0) => Some(LABEL_TEST_DATE.to_string()),
            _ => None,
        }
    }

    pub fn header(&self, grid: &Grid) -> Option<TableHeader> {
        self.title().map(|title| TableHeader {
            title: title.to_string(),
            row: grid.row_count(),
            col: grid.column_count(),
        })
    }

    /// Lay out every cell of the grid: header positions get their label,
    /// the rest get the crop `[row_b[r]..row_b[r+1], col_b[c]..col_b[c+1]]`
    /// of `image`, clipped to its bounds. Empty for unrecognised layouts.
    pub fn plan_cells(&self, grid: &Grid, image: &DynamicImage) -> Vec<Cell> {
        if *self == Layout::Unrecognized {
            return Vec::new();
        }
        grid.cells()
            .map(|span| {
                let content = match self.header_label(span.row, span.col) {
                    Some(label) => CellContent::Label(label),
                    None => {
                        let b = span.bbox.clamp_to(image.width(), image.height());
                        CellContent::Pending(image.crop_imm(b.x, b.y, b.width, b.height))
                    }
                };
                Cell {
                    row: span.row,
                    col: span.col,
                    content,
                }
            })
            .collect()
    }
}
