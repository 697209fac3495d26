use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, GrayImage, ImageReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::ExtractionConfig;
use crate::detection::grid::reconstruct_grid;
use crate::detection::layout::Layout;
use crate::detection::letters;
use crate::detection::preprocessing::{self, LineMasks};
use crate::detection::tables::classify_tables;
use crate::error::{RecognitionError, SheetError};
use crate::models::{Cell, CellContent, CellValue, TableHeader, TableRegion, TableResult};
use crate::recognition::{CellKey, Dispatcher, RecognitionRequest, TextRecognizer};
use crate::response::{MAX_TABLES, PipelineResponse, ResponseKind, aggregate};
use crate::workspace::{SheetOutput, Workspace};

/// Debug configuration for pipeline execution
#[derive(Clone, Debug)]
pub struct DebugConfig {
    /// Root directory for debug outputs
    pub output_dir: PathBuf,
}

impl DebugConfig {
    fn save_masks(&self, step: &str, name: &str, masks: &LineMasks, combined: Option<&GrayImage>) -> Result<(), SheetError> {
        let dir = self.output_dir.join(step);
        std::fs::create_dir_all(&dir).map_err(|e| SheetError::io(&dir, e))?;
        let mut images = vec![("horizontal", &masks.horizontal), ("vertical", &masks.vertical)];
        if let Some(c) = combined {
            images.push(("combined", c));
        }
        for (kind, img) in images {
            let path = dir.join(format!("{}_{}.png", name, kind));
            img.save(&path).map_err(|source| SheetError::ImageEncode { path: path.clone(), source })?;
        }
        debug!(step, name, "saved debug masks");
        Ok(())
    }
}

/// A recognised table whose data cells still await text recognition
#[derive(Debug)]
struct PreparedTable {
    index: usize,
    header: TableHeader,
    cells: Vec<Cell>,
}

impl PreparedTable {
    fn requests(&self) -> impl Iterator<Item = RecognitionRequest> + '_ {
        self.cells.iter().filter_map(|cell| match &cell.content {
            CellContent::Pending(image) => Some(RecognitionRequest {
                key: CellKey {
                    table: self.index,
                    row: cell.row,
                    col: cell.col,
                },
                image: image.clone(),
            }),
            CellContent::Label(_) => None,
        })
    }

    /// Fold recognition outcomes back in row-major order. Failed cells keep
    /// their position with empty text and an error marker.
    fn resolve(self, recognized: &mut HashMap<CellKey, Result<String, RecognitionError>>) -> TableResult {
        let data = self
            .cells
            .into_iter()
            .map(|cell| {
                let (text, error) = match cell.content {
                    CellContent::Label(label) => (label, None),
                    CellContent::Pending(_) => {
                        let key = CellKey {
                            table: self.index,
                            row: cell.row,
                            col: cell.col,
                        };
                        match recognized.remove(&key) {
                            Some(Ok(text)) => (text, None),
                            Some(Err(e)) => {
                                warn!(table = self.index, row = cell.row, col = cell.col, error = %e, "cell left unresolved");
                                (String::new(), Some(e.to_string()))
                            }
                            None => (String::new(), Some("recognition did not complete".to_string())),
                        }
                    }
                };
                CellValue {
                    row: cell.row,
                    col: cell.col,
                    text,
                    error,
                }
            })
            .collect();
        TableResult {
            header: self.header,
            data,
        }
    }
}

/// Load and decode an image file
pub fn load_image(path: &Path) -> Result<DynamicImage, SheetError> {
    ImageReader::open(path)
        .map_err(|e| SheetError::io(path, e))?
        .with_guessed_format()
        .map_err(|e| SheetError::io(path, e))?
        .decode()
        .map_err(|source| SheetError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })
}

/// Grid reconstruction and cell planning for one region. Independent of
/// every other region, so it runs on its own blocking task.
fn prepare_table(
    region: TableRegion,
    config: &ExtractionConfig,
    output: Option<&SheetOutput>,
    debug: Option<&DebugConfig>,
) -> Result<Option<PreparedTable>, SheetError> {
    let (masks, lines) = reconstruct_grid(&region.image, config);
    if let Some(debug) = debug {
        debug.save_masks("02_table_masks", &region.name, &masks, None)?;
    }

    let grid = lines.to_grid();
    let layout = Layout::recognize(&grid);
    let Some(header) = layout.header(&grid) else {
        info!(
            table = %region.name,
            rows = grid.row_boundaries().len(),
            columns = grid.column_boundaries().len(),
            "grid matches no known layout, skipping table"
        );
        return Ok(None);
    };
    info!(table = %region.name, title = %header.title, "recognized table layout");

    let mut cells = layout.plan_cells(&grid, &region.image);
    for cell in &mut cells {
        if let CellContent::Pending(image) = &mut cell.content {
            if let Some(out) = output {
                out.save_cell(&region.name, cell.row, cell.col, image)?;
            }
            *image = preprocessing::enhance_cell(image, &config.enhancement);
        }
    }

    Ok(Some(PreparedTable {
        index: region.rank,
        header,
        cells,
    }))
}

/// Wait for one region's preparation; a panicked task is a detection failure
async fn join_table(
    handle: JoinHandle<Result<Option<PreparedTable>, SheetError>>,
) -> Result<Option<PreparedTable>, SheetError> {
    handle.await.map_err(|e| SheetError::Task(e.to_string()))?
}

/// End-to-end extraction of the answer-sheet tables in one image
pub struct SheetPipeline {
    config: Arc<ExtractionConfig>,
    recognizer: Arc<dyn TextRecognizer>,
    dispatcher: Dispatcher,
    debug: Option<DebugConfig>,
}

impl SheetPipeline {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        let config = ExtractionConfig::default();
        Self {
            dispatcher: Dispatcher::new(recognizer.clone(), config.recognition.clone()),
            config: Arc::new(config),
            recognizer,
            debug: None,
        }
    }

    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.dispatcher = Dispatcher::new(self.recognizer.clone(), config.recognition.clone());
        self.config = Arc::new(config);
        self
    }

    /// Enable debug mode with output directory
    /// The directory must be empty or non-existent
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self, SheetError> {
        if output_dir.exists() {
            let mut entries = std::fs::read_dir(&output_dir).map_err(|e| SheetError::io(&output_dir, e))?;
            if entries.next().is_some() {
                return Err(SheetError::DebugDirNotEmpty(output_dir));
            }
        } else {
            std::fs::create_dir_all(&output_dir).map_err(|e| SheetError::io(&output_dir, e))?;
        }
        self.debug = Some(DebugConfig { output_dir });
        Ok(self)
    }

    pub fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    /// Decode `input`, stage it under the workspace's `data/input/`, lay out
    /// its output directories and run the pipeline. Only decode and
    /// filesystem failures are errors.
    pub async fn process_file(&self, input: &Path, workspace: &Workspace) -> Result<PipelineResponse, SheetError> {
        info!(input = %input.display(), "processing image");
        let image = load_image(input)?;
        let staged = workspace.stage_input(input)?;
        let output = workspace.prepare(&staged)?;
        self.process_image(&image, &output.stem, Some(&output)).await
    }

    /// Locate the tables of the page: line isolation on the (optionally
    /// resized) working page, then area-based region classification.
    pub fn detect_tables(&self, image: &DynamicImage, source_stem: &str) -> Result<Vec<TableRegion>, SheetError> {
        let page = match self.config.working_height {
            Some(height) => preprocessing::resize_to_height(image, height),
            None => image.clone(),
        };
        let masks = preprocessing::isolate_lines(&page, &self.config);
        let combined = preprocessing::combine_masks(&masks);
        if let Some(debug) = &self.debug {
            debug.save_masks("01_page_masks", source_stem, &masks, Some(&combined))?;
        }

        let regions = classify_tables(&page, &combined, &self.config, source_stem);
        info!(tables = regions.len(), source = source_stem, "detected table regions");
        Ok(regions)
    }

    /// Run every stage on an already decoded image. Table and cell crops are
    /// written under `output` when one is given.
    pub async fn process_image(
        &self,
        image: &DynamicImage,
        source_stem: &str,
        output: Option<&SheetOutput>,
    ) -> Result<PipelineResponse, SheetError> {
        let regions = self.detect_tables(image, source_stem)?;
        if let Some(out) = output {
            for region in &regions {
                out.save_table(&region.name, &region.image)?;
            }
        }

        let mut handles = Vec::with_capacity(regions.len());
        for region in regions {
            let config = self.config.clone();
            let output = output.cloned();
            let debug = self.debug.clone();
            handles.push(tokio::task::spawn_blocking(move || {
                prepare_table(region, &config, output.as_ref(), debug.as_ref())
            }));
        }

        let mut prepared = Vec::new();
        for handle in handles {
            prepared.extend(join_table(handle).await?);
        }

        if prepared.len() > MAX_TABLES {
            info!(tables = prepared.len(), "too many tables, skipping recognition");
            return Ok(PipelineResponse::new(ResponseKind::TooManyTables, Vec::new()));
        }

        let requests: Vec<RecognitionRequest> = prepared.iter().flat_map(|t| t.requests()).collect();
        let mut recognized = self.dispatcher.run(requests).await;

        let tables: Vec<TableResult> = prepared.into_iter().map(|t| t.resolve(&mut recognized)).collect();
        let unresolved = tables
            .iter()
            .flat_map(|t| &t.data)
            .filter(|cell| !cell.is_resolved())
            .count();
        if unresolved > 0 {
            warn!(unresolved, "some cells could not be recognized");
        }
        let response = aggregate(tables);
        info!(code = response.status.code, tables = response.response.len(), "image processed");
        Ok(response)
    }

    /// Cut character crops out of a single box image into the `letters/`
    /// directory the workspace keeps for it. Auxiliary output for an
    /// external character classifier.
    pub fn extract_letters(&self, box_image: &Path, workspace: &Workspace) -> Result<Vec<PathBuf>, SheetError> {
        let image = load_image(box_image)?;
        let output = workspace.prepare(box_image)?;
        let crops = letters::extract_letters(&image, &self.config.letters);
        info!(letters = crops.len(), source = %box_image.display(), "extracted letters");
        output.save_letters(&output.stem, &crops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn panicking_region_is_a_task_error() {
        let handle = tokio::task::spawn_blocking(|| -> Result<Option<PreparedTable>, SheetError> {
            panic!("grid reconstruction blew up")
        });
        let result = join_table(handle).await;
        assert!(matches!(result, Err(SheetError::Task(_))));
    }
}
