//! On-disk layout for one workspace:
//!
//! ```text
//! <root>/data/input/<image>
//! <root>/data/output/<stem>/tables/<rank>_<stem>.jpg
//! <root>/data/output/<stem>/boxes/<table>/<row>_<col>_<table>.jpg
//! <root>/data/output/<stem>/letters/*.jpg
//! ```

use std::path::{Path, PathBuf};

use image::{DynamicImage, GrayImage};
use tracing::debug;

use crate::error::SheetError;

const DATA_DIR: &str = "data";
const INPUT_DIR: &str = "input";
const OUTPUT_DIR: &str = "output";
const TABLES_DIR: &str = "tables";
const BOXES_DIR: &str = "boxes";
const LETTERS_DIR: &str = "letters";

/// File stem of a path, or "image" when it has none
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string())
}

fn create_dir(path: &Path) -> Result<(), SheetError> {
    std::fs::create_dir_all(path).map_err(|e| SheetError::io(path, e))
}

/// Write an image as JPEG; colour crops are flattened to RGB first
pub fn save_jpeg(image: &DynamicImage, path: &Path) -> Result<(), SheetError> {
    let flattened = match image {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageRgb8(_) => image.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    flattened
        .save_with_format(path, image::ImageFormat::Jpeg)
        .map_err(|source| SheetError::ImageEncode {
            path: path.to_path_buf(),
            source,
        })
}

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn input_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR).join(INPUT_DIR)
    }

    pub fn input_path(&self, file_name: &str) -> PathBuf {
        self.input_dir().join(file_name)
    }

    /// Copy a source image into `data/input/`, leaving it alone when it
    /// already lives there. Returns the staged path.
    pub fn stage_input(&self, source: &Path) -> Result<PathBuf, SheetError> {
        let file_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.jpg", file_stem(source)));
        create_dir(&self.input_dir())?;
        let target = self.input_path(&file_name);

        let already_staged = target.exists()
            && std::fs::canonicalize(source).ok() == std::fs::canonicalize(&target).ok();
        if !already_staged {
            std::fs::copy(source, &target).map_err(|e| SheetError::io(source, e))?;
            debug!(target = %target.display(), "staged input image");
        }
        Ok(target)
    }

    /// Create the output directories for one source image
    pub fn prepare(&self, source: &Path) -> Result<SheetOutput, SheetError> {
        let stem = file_stem(source);
        let base = self.root.join(DATA_DIR).join(OUTPUT_DIR).join(&stem);
        let output = SheetOutput {
            tables_dir: base.join(TABLES_DIR),
            boxes_dir: base.join(BOXES_DIR),
            letters_dir: base.join(LETTERS_DIR),
            base,
            stem,
        };
        for dir in [&output.tables_dir, &output.boxes_dir, &output.letters_dir] {
            create_dir(dir)?;
        }
        debug!(dir = %output.base.display(), "prepared output directories");
        Ok(output)
    }
}

/// Output directories of one processed source image
#[derive(Debug, Clone)]
pub struct SheetOutput {
    pub stem: String,
    pub base: PathBuf,
    pub tables_dir: PathBuf,
    pub boxes_dir: PathBuf,
    pub letters_dir: PathBuf,
}

impl SheetOutput {
    pub fn table_path(&self, table_name: &str) -> PathBuf {
        self.tables_dir.join(format!("{}.jpg", table_name))
    }

    pub fn save_table(&self, table_name: &str, image: &DynamicImage) -> Result<PathBuf, SheetError> {
        let path = self.table_path(table_name);
        save_jpeg(image, &path)?;
        Ok(path)
    }

    /// Directory holding the cell crops of one table, created on demand
    pub fn table_boxes_dir(&self, table_name: &str) -> Result<PathBuf, SheetError> {
        let dir = self.boxes_dir.join(table_name);
        create_dir(&dir)?;
        Ok(dir)
    }

    pub fn cell_path(&self, table_name: &str, row: usize, col: usize) -> PathBuf {
        self.boxes_dir
            .join(table_name)
            .join(format!("{}_{}_{}.jpg", row, col, table_name))
    }

    pub fn save_cell(
        &self,
        table_name: &str,
        row: usize,
        col: usize,
        image: &DynamicImage,
    ) -> Result<PathBuf, SheetError> {
        self.table_boxes_dir(table_name)?;
        let path = self.cell_path(table_name, row, col);
        save_jpeg(image, &path)?;
        Ok(path)
    }

    /// Write character crops as `<index>_<name>.jpg` under `letters/`
    pub fn save_letters(&self, name: &str, letters: &[GrayImage]) -> Result<Vec<PathBuf>, SheetError> {
        create_dir(&self.letters_dir)?;
        letters
            .iter()
            .enumerate()
            .map(|(i, letter)| {
                let path = self.letters_dir.join(format!("{:03}_{}.jpg", i, name));
                save_jpeg(&DynamicImage::ImageLuma8(letter.clone()), &path)?;
                Ok(path)
            })
            .collect()
    }
}
