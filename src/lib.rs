pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod recognition;
pub mod response;
pub mod workspace;

pub use config::{ExtractionConfig, RecognitionConfig};
pub use error::{RecognitionError, SheetError};
pub use models::{BoundingBox, CellValue, Contour, Grid, LineSegment, TableHeader, TableRegion, TableResult};
pub use pipeline::{DebugConfig, SheetPipeline};
pub use recognition::TextRecognizer;
pub use response::{PipelineResponse, ResponseKind};
pub use workspace::Workspace;
