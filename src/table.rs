//! Reading rectangular blocks of numbers and text from workbooks.
//!
//! A workbook is a directory containing one CSV file per sheet, named `<sheet>.csv`. Sheets are read
//! without headers and rows may have different lengths; cells beyond the end of a row are empty.
//! Rows and columns are indexed from zero.
use crate::cache::{Context, RequestCache};
use crate::error::EioError;
use anyhow::{Context as _, Result, ensure};
use log::info;
use ndarray::Array2;
use std::collections::HashMap;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// The file extension for sheets within a workbook
const SHEET_EXTENSION: &str = "csv";

/// The default number of workbooks kept in memory
pub const DEFAULT_WORKBOOK_CACHE_SIZE: usize = 1000;

/// A single sheet of string cells
#[derive(Debug, Default, PartialEq)]
pub struct Sheet {
    rows: Vec<Vec<String>>,
}

impl Sheet {
    /// Read a sheet from CSV data
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(|cell| cell.trim().to_string()).collect()))
            .collect::<Result<_>>()?;
        Ok(Self { rows })
    }

    /// The contents of a cell, or an empty string if the cell is outside the sheet
    pub fn cell(&self, row: usize, col: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(col))
            .map_or("", String::as_str)
    }

    /// The cells of a row, which is empty if the row is outside the sheet
    pub fn row(&self, row: usize) -> &[String] {
        self.rows.get(row).map_or(&[], Vec::as_slice)
    }

    /// The number of rows in the sheet
    pub fn height(&self) -> usize {
        self.rows.len()
    }
}

/// A named collection of sheets
#[derive(Debug)]
pub struct Workbook {
    sheets: HashMap<String, Sheet>,
}

impl Workbook {
    /// Read every sheet in the workbook directory at `path`
    pub fn load(path: &Path) -> Result<Self> {
        let mut sheets = HashMap::new();
        let entries =
            fs::read_dir(path).with_context(|| format!("Could not open workbook {}", path.display()))?;
        for entry in entries {
            let sheet_path = entry?.path();
            if sheet_path.extension().is_none_or(|ext| ext != SHEET_EXTENSION) {
                continue;
            }
            let Some(name) = sheet_path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let file = fs::File::open(&sheet_path)
                .with_context(|| format!("Could not open {}", sheet_path.display()))?;
            let sheet = Sheet::from_reader(file)
                .with_context(|| format!("Could not read {}", sheet_path.display()))?;
            sheets.insert(name.to_string(), sheet);
        }
        info!("Loaded workbook {} ({} sheets)", path.display(), sheets.len());

        Ok(Self { sheets })
    }

    /// Get a sheet by name
    pub fn sheet(&self, name: &str) -> Result<&Sheet, EioError> {
        self.sheets
            .get(name)
            .ok_or_else(|| EioError::not_found("sheet", name))
    }
}

/// Parse a numeric cell. Placeholders (`...` and blank cells) are zero.
pub fn parse_cell(value: &str) -> Result<f64, EioError> {
    if value.is_empty() || value == "..." {
        return Ok(0.0);
    }
    value.parse().map_err(|err: std::num::ParseFloatError| EioError::Parse {
        value: value.to_string(),
        reason: err.to_string(),
    })
}

/// Reads blocks of cells from workbooks, keeping parsed workbooks in memory.
///
/// Concurrent requests for the same workbook only parse it once.
pub struct TableLoader {
    workbooks: RequestCache<PathBuf, Arc<Workbook>>,
}

impl Default for TableLoader {
    fn default() -> Self {
        Self::new(DEFAULT_WORKBOOK_CACHE_SIZE)
    }
}

impl TableLoader {
    /// Create a loader which keeps up to `capacity` workbooks in memory
    pub fn new(capacity: usize) -> Self {
        let workers = thread::available_parallelism().map_or(1, usize::from);
        Self {
            workbooks: RequestCache::new(
                "workbooks",
                |_ctx: &Context, path: &PathBuf| Workbook::load(path).map(Arc::new),
                workers,
                capacity,
                None,
            ),
        }
    }

    /// Get the workbook at `file`, loading it if necessary
    pub fn workbook(&self, file: &Path) -> Result<Arc<Workbook>> {
        let key = file.to_string_lossy().into_owned();
        self.workbooks
            .new_request(&Context::background(), file.to_path_buf(), key)
            .result()
    }

    /// Read the numbers in rows `start_row..end_row` and columns `start_col..end_col` of a sheet
    pub fn matrix(
        &self,
        file: &Path,
        sheet: &str,
        (start_row, end_row): (usize, usize),
        (start_col, end_col): (usize, usize),
    ) -> Result<Array2<f64>> {
        ensure!(
            start_row <= end_row && start_col <= end_col,
            "Invalid block {start_row}..{end_row} x {start_col}..{end_col}"
        );
        let workbook = self.workbook(file)?;
        let sheet_data = workbook
            .sheet(sheet)
            .with_context(|| format!("Reading matrix from {}", file.display()))?;

        let mut out = Array2::zeros((end_row - start_row, end_col - start_col));
        for row in start_row..end_row {
            for col in start_col..end_col {
                out[[row - start_row, col - start_col]] = parse_cell(sheet_data.cell(row, col))
                    .with_context(|| {
                        format!(
                            "Reading row {row}, column {col} of sheet {sheet} in {}",
                            file.display()
                        )
                    })?;
            }
        }

        Ok(out)
    }

    /// Read the text in one column of a sheet, for rows `start_row..end_row`
    pub fn text_column(
        &self,
        file: &Path,
        sheet: &str,
        col: usize,
        (start_row, end_row): (usize, usize),
    ) -> Result<Vec<String>> {
        let workbook = self.workbook(file)?;
        let sheet_data = workbook
            .sheet(sheet)
            .with_context(|| format!("Reading text column from {}", file.display()))?;
        Ok((start_row..end_row)
            .map(|row| sheet_data.cell(row, col).to_string())
            .collect())
    }

    /// Read the text in one row of a sheet, for columns `start_col..end_col`
    pub fn text_row(
        &self,
        file: &Path,
        sheet: &str,
        row: usize,
        (start_col, end_col): (usize, usize),
    ) -> Result<Vec<String>> {
        let workbook = self.workbook(file)?;
        let sheet_data = workbook
            .sheet(sheet)
            .with_context(|| format!("Reading text row from {}", file.display()))?;
        Ok((start_col..end_col)
            .map(|col| sheet_data.cell(row, col).to_string())
            .collect())
    }
}
