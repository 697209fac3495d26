use serde::Serialize;

use crate::models::TableResult;

pub const CODE_SUCCESS: u32 = 200;
/// Shared by "no table" and "too many tables", kept for client compatibility
pub const CODE_TABLE_COUNT: u32 = 500_001;

const MSG_SUCCESS: &str = "successfully processed the image";
const MSG_NO_TABLE: &str =
    "We could not detect any table, please bring answer sheet bit-far from phone camera";
const MSG_TOO_MANY: &str =
    "We have detected more than two tables, please bring answer sheet near to phone camera";

/// Most tables one answer sheet can carry
pub const MAX_TABLES: usize = 2;

/// Outcome of one source image, distinct even where wire codes collide
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Success,
    NoTableDetected,
    TooManyTables,
}

impl ResponseKind {
    pub fn code(&self) -> u32 {
        match self {
            ResponseKind::Success => CODE_SUCCESS,
            ResponseKind::NoTableDetected | ResponseKind::TooManyTables => CODE_TABLE_COUNT,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ResponseKind::Success => MSG_SUCCESS,
            ResponseKind::NoTableDetected => MSG_NO_TABLE,
            ResponseKind::TooManyTables => MSG_TOO_MANY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Status {
    pub code: u32,
    pub message: String,
}

/// Status envelope returned to the caller for one source image
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResponse {
    pub status: Status,
    pub response: Vec<TableResult>,
    #[serde(skip)]
    kind: ResponseKind,
}

impl PipelineResponse {
    pub fn new(kind: ResponseKind, response: Vec<TableResult>) -> Self {
        Self {
            status: Status {
                code: kind.code(),
                message: kind.message().to_string(),
            },
            response,
            kind,
        }
    }

    pub fn kind(&self) -> ResponseKind {
        self.kind
    }

    pub fn is_success(&self) -> bool {
        self.kind == ResponseKind::Success
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Apply the table-count rule: one or two tables succeed, anything else is a
/// business error carrying an empty result list.
pub fn aggregate(tables: Vec<TableResult>) -> PipelineResponse {
    if tables.len() > MAX_TABLES {
        PipelineResponse::new(ResponseKind::TooManyTables, Vec::new())
    } else if tables.is_empty() {
        PipelineResponse::new(ResponseKind::NoTableDetected, Vec::new())
    } else {
        PipelineResponse::new(ResponseKind::Success, tables)
    }
}
