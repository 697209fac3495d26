use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use ::ocrs::{ImageSource, OcrEngine, OcrEngineParams};
use image::DynamicImage;
use rten::Model;
use tracing::info;

use crate::error::RecognitionError;
use crate::recognition::TextRecognizer;

const DETECTION_MODEL: &str = "text-detection.rten";
const RECOGNITION_MODEL: &str = "text-recognition.rten";

/// Standard cache location of the ocrs models
pub fn default_model_dir() -> Option<PathBuf> {
    let home_dir = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .ok()?;
    Some(Path::new(&home_dir).join(".cache/ocrs"))
}

/// Local recognizer running the ocrs engine in-process
pub struct OcrsRecognizer {
    model_dir: PathBuf,
    // Loaded once on first use; the Arc lets callers drop the lock before running OCR
    engine: Mutex<Option<Arc<OcrEngine>>>,
}

impl OcrsRecognizer {
    /// Fails early when the model files are missing
    pub fn new(model_dir: impl Into<PathBuf>) -> Result<Self, RecognitionError> {
        let model_dir = model_dir.into();
        let detection = model_dir.join(DETECTION_MODEL);
        let recognition = model_dir.join(RECOGNITION_MODEL);
        if !detection.exists() || !recognition.exists() {
            return Err(RecognitionError::Engine(format!(
                "OCR models not found. Expected locations:\n  - {}\n  - {}",
                detection.display(),
                recognition.display()
            )));
        }
        Ok(Self {
            model_dir,
            engine: Mutex::new(None),
        })
    }

    pub fn from_default_cache() -> Result<Self, RecognitionError> {
        let dir = default_model_dir()
            .ok_or_else(|| RecognitionError::Engine("cannot locate home directory".into()))?;
        Self::new(dir)
    }

    fn engine(&self) -> Result<Arc<OcrEngine>, RecognitionError> {
        let mut guard = self
            .engine
            .lock()
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        if let Some(engine) = guard.as_ref() {
            return Ok(engine.clone());
        }

        info!(dir = %self.model_dir.display(), "loading ocrs models");
        let detection_model = Model::load_file(self.model_dir.join(DETECTION_MODEL))
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        let recognition_model = Model::load_file(self.model_dir.join(RECOGNITION_MODEL))
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        let engine = OcrEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|e| RecognitionError::Engine(e.to_string()))?;

        let engine = Arc::new(engine);
        *guard = Some(engine.clone());
        Ok(engine)
    }
}

impl TextRecognizer for OcrsRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String, RecognitionError> {
        let engine = self.engine()?;
        let rgb = image.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions())
            .map_err(|e| RecognitionError::Encode(e.to_string()))?;
        let input = engine
            .prepare_input(source)
            .map_err(|e| RecognitionError::Engine(e.to_string()))?;
        engine
            .get_text(&input)
            .map_err(|e| RecognitionError::Engine(e.to_string()))
    }

    fn name(&self) -> &str {
        "ocrs"
    }
}
