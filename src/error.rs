use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Infrastructure failures that abort processing of one source image.
///
/// Business outcomes such as "no table detected" are not errors; they are
/// reported through [`crate::response::PipelineResponse`].
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("failed to write image {path}: {source}")]
    ImageEncode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("i/o error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("debug directory is not empty: {0}")]
    DebugDirNotEmpty(PathBuf),

    #[error("invalid configuration: {0}")]
    Config(String),

    /// A detection task on the blocking pool panicked or was cancelled
    #[error("table processing task failed: {0}")]
    Task(String),

    #[error(transparent)]
    Recognition(#[from] RecognitionError),
}

impl SheetError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failure of a single text-recognition request
#[derive(Debug, Clone, Error)]
pub enum RecognitionError {
    #[error("recognition timed out after {0:?}")]
    Timeout(Duration),

    /// Network or rate-limit failure worth retrying
    #[error("transient recognition failure: {0}")]
    Transient(String),

    #[error("recognition service error: {0}")]
    Service(String),

    #[error("recognition engine error: {0}")]
    Engine(String),

    #[error("failed to encode cell image: {0}")]
    Encode(String),
}

impl RecognitionError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Transient(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_timeouts_and_transient_errors_retry() {
        assert!(RecognitionError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(RecognitionError::Transient("503".into()).is_transient());
        assert!(!RecognitionError::Service("bad key".into()).is_transient());
        assert!(!RecognitionError::Engine("model".into()).is_transient());
    }
}
