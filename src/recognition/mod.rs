pub mod dispatch;
pub mod ocrs;
pub mod vision;

use image::DynamicImage;

use crate::error::RecognitionError;

pub use dispatch::{CellKey, Dispatcher, RecognitionRequest};

/// External collaborator turning a cropped cell image into text.
///
/// Implementations are shared across worker tasks, so they must be
/// `Send + Sync`; calls are blocking and run on the blocking thread pool.
pub trait TextRecognizer: Send + Sync {
    /// Full text found in the image, raw as the backend returns it
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError>;

    /// Human-readable backend name (used in log output)
    fn name(&self) -> &str;
}

/// Join newline-separated segments with single spaces and trim the ends
pub fn normalize_text(raw: &str) -> String {
    raw.replace("\r\n", "\n").replace('\n', " ").trim().to_string()
}
