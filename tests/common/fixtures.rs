use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};
use sheetgrid::{RecognitionError, SheetPipeline, TextRecognizer};
use tempfile::NamedTempFile;

pub const PAGE_WIDTH: u32 = 1100;
const INK: Rgb<u8> = Rgb([20, 20, 20]);
const LINE_WIDTH: u32 = 3;

/// Table width shared by every drawn layout; row rules must beat the
/// default 800 px minimum inside the crop
pub const TABLE_WIDTH: u32 = 900;
pub const TABLE_LEFT: u32 = 100;

/// Blank sheet of paper
pub fn blank_page(height: u32) -> RgbImage {
    ImageBuffer::from_fn(PAGE_WIDTH, height, |_, _| Rgb([250u8, 250u8, 250u8]))
}

/// Draw a ruled table with `rows` rows of `row_height` and two equal columns.
/// Returns the y coordinate just below the table.
pub fn draw_table(page: &mut RgbImage, top: u32, rows: u32, row_height: u32) -> u32 {
    let left = TABLE_LEFT;
    let right = left + TABLE_WIDTH;
    let bottom = top + rows * row_height;

    for i in 0..=rows {
        let y = top + i * row_height;
        for x in left..right + LINE_WIDTH {
            for t in 0..LINE_WIDTH {
                page.put_pixel(x, y + t, INK);
            }
        }
    }
    for x in [left, left + TABLE_WIDTH / 2, right] {
        for y in top..bottom + LINE_WIDTH {
            for t in 0..LINE_WIDTH {
                page.put_pixel(x + t, y, INK);
            }
        }
    }
    bottom + LINE_WIDTH
}

/// Marks received: 11 rows x 2 columns
pub fn draw_marks_table(page: &mut RgbImage, top: u32) -> u32 {
    draw_table(page, top, 11, 40)
}

/// Student summary: 2 rows x 2 columns
pub fn draw_summary_table(page: &mut RgbImage, top: u32) -> u32 {
    draw_table(page, top, 2, 100)
}

pub fn marks_sheet() -> DynamicImage {
    let mut page = blank_page(1000);
    draw_marks_table(&mut page, 200);
    DynamicImage::ImageRgb8(page)
}

pub fn marks_and_summary_sheet() -> DynamicImage {
    let mut page = blank_page(1100);
    draw_marks_table(&mut page, 100);
    draw_summary_table(&mut page, 750);
    DynamicImage::ImageRgb8(page)
}

pub fn three_summary_sheet() -> DynamicImage {
    let mut page = blank_page(1100);
    for top in [80, 430, 780] {
        draw_summary_table(&mut page, top);
    }
    DynamicImage::ImageRgb8(page)
}

/// Marks table above a four-row table that matches no printed layout
pub fn marks_and_unknown_sheet() -> DynamicImage {
    let mut page = blank_page(1100);
    draw_marks_table(&mut page, 100);
    draw_table(&mut page, 700, 4, 50);
    DynamicImage::ImageRgb8(page)
}

/// The marks sheet photographed at twice the resolution
pub fn double_size_marks_sheet() -> DynamicImage {
    let sheet = marks_sheet();
    sheet.resize_exact(sheet.width() * 2, sheet.height() * 2, FilterType::Nearest)
}

pub fn blank_sheet() -> DynamicImage {
    DynamicImage::ImageRgb8(blank_page(1000))
}

/// Writes an image to a temp file with the given suffix.
/// The file will be automatically cleaned up when dropped.
pub fn write_temp_image(image: &DynamicImage, suffix: &str) -> NamedTempFile {
    let file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("Failed to create temp image file");
    image
        .save_with_format(file.path(), image::ImageFormat::Png)
        .expect("Failed to save test image");
    file
}

/// Recognizer answering every cell with the same text
pub struct FixedText {
    pub text: String,
    pub calls: AtomicUsize,
}

impl FixedText {
    pub fn new(text: &str) -> Arc<Self> {
        Arc::new(Self {
            text: text.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextRecognizer for FixedText {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.text.clone())
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// Recognizer whose backend always rejects the request
pub struct Rejecting;

impl TextRecognizer for Rejecting {
    fn recognize(&self, _image: &DynamicImage) -> Result<String, RecognitionError> {
        Err(RecognitionError::Service("quota exceeded".into()))
    }

    fn name(&self) -> &str {
        "rejecting"
    }
}

pub fn pipeline_with(recognizer: Arc<dyn TextRecognizer>) -> SheetPipeline {
    SheetPipeline::new(recognizer)
}
