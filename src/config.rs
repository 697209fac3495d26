use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::SheetError;

/// Tunable thresholds for the extraction pipeline.
///
/// The defaults are tuned for a phone photograph of the printed answer
/// sheet at its native resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Resize the page to this height before page-level line isolation.
    /// `None` keeps the source resolution the area bounds are tuned for.
    pub working_height: Option<u32>,
    /// Neighbourhood size of the mean-based adaptive threshold (odd)
    pub adaptive_block_size: u32,
    /// Value subtracted from the local mean; negative raises the bar
    pub adaptive_offset: i16,
    /// Structuring element length is image extent divided by this
    pub line_scale_divisor: u32,
    /// Neighbourhood size used to find edge pixels during smoothing (odd)
    pub smoothing_block_size: u32,
    /// Inclusive bounding-box area bounds for table regions
    pub min_table_area: u64,
    pub max_table_area: u64,
    /// Row rules must be strictly wider than this
    pub min_row_line_length: u32,
    /// Column rules must be strictly taller than this
    pub min_column_line_length: u32,
    pub letters: LetterConfig,
    pub recognition: RecognitionConfig,
    pub enhancement: CellEnhancement,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            working_height: None,
            adaptive_block_size: 15,
            adaptive_offset: -2,
            line_scale_divisor: 30,
            smoothing_block_size: 3,
            min_table_area: 130_000,
            max_table_area: 900_000,
            min_row_line_length: 800,
            min_column_line_length: 150,
            letters: LetterConfig::default(),
            recognition: RecognitionConfig::default(),
            enhancement: CellEnhancement::default(),
        }
    }
}

impl ExtractionConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, SheetError> {
        let raw = std::fs::read_to_string(path).map_err(|e| SheetError::io(path, e))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| SheetError::Config(format!("{}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SheetError> {
        if self.adaptive_block_size % 2 == 0 || self.smoothing_block_size % 2 == 0 {
            return Err(SheetError::Config("threshold block sizes must be odd".into()));
        }
        if self.line_scale_divisor == 0 {
            return Err(SheetError::Config("line_scale_divisor must be positive".into()));
        }
        if self.min_table_area > self.max_table_area {
            return Err(SheetError::Config(format!(
                "min_table_area {} exceeds max_table_area {}",
                self.min_table_area, self.max_table_area
            )));
        }
        if self.recognition.max_concurrency == 0 {
            return Err(SheetError::Config("recognition.max_concurrency must be positive".into()));
        }
        Ok(())
    }

    pub fn with_working_height(mut self, height: Option<u32>) -> Self {
        self.working_height = height;
        self
    }

    pub fn with_table_area(mut self, min: u64, max: u64) -> Self {
        self.min_table_area = min;
        self.max_table_area = max;
        self
    }

    pub fn with_line_lengths(mut self, row: u32, column: u32) -> Self {
        self.min_row_line_length = row;
        self.min_column_line_length = column;
        self
    }

    pub fn with_recognition(mut self, recognition: RecognitionConfig) -> Self {
        self.recognition = recognition;
        self
    }
}

/// Bounds for the auxiliary character crops
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LetterConfig {
    pub min_width: u32,
    pub max_width: u32,
    pub min_height: u32,
    /// Side of the square each crop is normalised to
    pub size: u32,
}

impl Default for LetterConfig {
    fn default() -> Self {
        Self {
            min_width: 3,
            max_width: 60,
            min_height: 20,
            size: 28,
        }
    }
}

/// Limits applied to calls to the text-recognition collaborator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecognitionConfig {
    pub max_concurrency: usize,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for RecognitionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_ms: 15_000,
            max_retries: 2,
            retry_backoff_ms: 250,
        }
    }
}

impl RecognitionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms * attempt as u64)
    }
}

/// Optional contrast/brightness/sharpening applied to cell crops before
/// recognition. The identity setting leaves crops untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CellEnhancement {
    pub contrast: f32,
    pub brightness: f32,
    pub sharpen_sigma: f32,
    pub sharpen_amount: f32,
    pub sharpen_threshold: u8,
}

impl Default for CellEnhancement {
    fn default() -> Self {
        Self {
            contrast: 1.0,
            brightness: 0.0,
            sharpen_sigma: 1.0,
            sharpen_amount: 0.0,
            sharpen_threshold: 0,
        }
    }
}

impl CellEnhancement {
    pub fn is_identity(&self) -> bool {
        self.contrast == 1.0 && self.brightness == 0.0 && self.sharpen_amount == 0.0
    }
}
