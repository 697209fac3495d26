mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from sheetgrid for tests
pub use sheetgrid::response::{CODE_SUCCESS, CODE_TABLE_COUNT};
pub use sheetgrid::{
    ExtractionConfig, PipelineResponse, RecognitionConfig, RecognitionError, ResponseKind, SheetError, SheetPipeline,
    TextRecognizer, Workspace,
};
