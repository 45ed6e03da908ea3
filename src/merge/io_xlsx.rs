// Primitives for reading and writing the Excel workbooks.

use std::fs;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, DataType, Reader, Xlsx};
use log::{debug, warn};
use rust_xlsxwriter::Workbook;
use snafu::prelude::*;

use review_merging::{CellValue, SheetGrid, SubmissionSource};

use crate::merge::{MergeResult, MissingWorksheetSnafu, OpeningWorkbookSnafu, SavingWorkbookSnafu};

pub const EXCEL_EXTENSION: &str = ".xlsx";

/// Reads one worksheet of a workbook into an addressable grid.
pub fn load_sheet(path: &str, sheet_name: &str) -> MergeResult<SheetGrid> {
    let mut workbook: Xlsx<_> = open_workbook(path).context(OpeningWorkbookSnafu { path })?;
    let wrange = workbook
        .worksheet_range(sheet_name)
        .context(MissingWorksheetSnafu {
            name: sheet_name,
            path,
        })?
        .context(OpeningWorkbookSnafu { path })?;
    Ok(range_to_grid(&wrange))
}

fn range_to_grid(wrange: &calamine::Range<DataType>) -> SheetGrid {
    let mut grid = SheetGrid::new();
    // The range is anchored at the top-left non-empty cell, 0-based.
    let (start_row, start_column) = wrange.start().unwrap_or((0, 0));
    for (i, row) in wrange.rows().enumerate() {
        for (j, cell) in row.iter().enumerate() {
            if let Some(value) = cell_to_value(cell) {
                grid.set(start_row + i as u32 + 1, start_column + j as u32 + 1, value);
            }
        }
    }
    grid
}

fn cell_to_value(cell: &DataType) -> Option<CellValue> {
    match cell {
        DataType::Int(x) => Some(CellValue::Number(*x as f64)),
        DataType::Float(x) => Some(CellValue::Number(*x)),
        DataType::DateTime(x) => Some(CellValue::Number(*x)),
        DataType::String(s) if s.is_empty() => None,
        DataType::String(s) => Some(CellValue::Text(s.clone())),
        DataType::Empty => None,
        _ => None,
    }
}

/// The submissions on disk: one subfolder per username inside the input
/// folder, holding that reviewer's workbook.
pub struct FolderSubmissions {
    input_folder: PathBuf,
    feedback_sheet_name: String,
}

impl FolderSubmissions {
    pub fn new(input_folder: &Path, feedback_sheet_name: &str) -> FolderSubmissions {
        FolderSubmissions {
            input_folder: input_folder.to_path_buf(),
            feedback_sheet_name: feedback_sheet_name.to_string(),
        }
    }
}

impl SubmissionSource for FolderSubmissions {
    fn feedback_sheet(&self, username: &str) -> Option<SheetGrid> {
        let folder = self.input_folder.join(username);
        let path = find_single_workbook(&folder)?;
        debug!("feedback_sheet: {}: reading {:?}", username, path);
        match load_sheet(path.to_string_lossy().as_ref(), &self.feedback_sheet_name) {
            Ok(grid) => Some(grid),
            Err(e) => {
                // An unreadable submission counts as not submitted.
                warn!("Cannot read the submission of {}: {}", username, e);
                None
            }
        }
    }
}

/// Locates the single workbook file inside a reviewer's folder. Zero or
/// multiple matches mean there is no usable submission.
fn find_single_workbook(folder: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(folder).ok()?;
    let workbooks: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map_or(false, |name| name.ends_with(EXCEL_EXTENSION))
        })
        .collect();
    match workbooks.as_slice() {
        [single] => Some(single.clone()),
        [] => None,
        _ => {
            warn!(
                "Found {} workbook files in {:?}, expected exactly one",
                workbooks.len(),
                folder
            );
            None
        }
    }
}

/// Writes the given grids as worksheets of a new workbook.
pub fn save_workbook(path: &Path, sheets: &[(&str, &SheetGrid)]) -> MergeResult<()> {
    let path_s = path.to_string_lossy().to_string();
    let mut workbook = Workbook::new();
    for (name, grid) in sheets.iter() {
        let worksheet = workbook.add_worksheet();
        worksheet
            .set_name(*name)
            .context(SavingWorkbookSnafu { path: path_s.clone() })?;
        for (row, column, value) in grid.cells() {
            match value {
                CellValue::Number(x) => worksheet.write_number(row - 1, (column - 1) as u16, *x),
                CellValue::Text(s) => worksheet.write_string(row - 1, (column - 1) as u16, s.as_str()),
            }
            .context(SavingWorkbookSnafu { path: path_s.clone() })?;
        }
    }
    workbook.save(path).context(SavingWorkbookSnafu { path: path_s })?;
    Ok(())
}
