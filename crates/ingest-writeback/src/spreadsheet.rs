//! Workbook write-back.
//!
//! `.xlsx` and `.xlsm` workbooks are read in full with calamine, the target
//! cells are patched, and every sheet is written out again with
//! rust_xlsxwriter. Cell values survive the rebuild; styling and formulas do
//! not. Formats that cannot be rebuilt (`.xls`, `.ods`) are written to a
//! companion file instead, see [`crate::companion`].

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};
use rust_xlsxwriter::{Format, Workbook};
use tracing::debug;

use crate::atomic::replace_file;
use crate::{Error, Result};

const DATETIME_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Whether the workbook at `path` can be rebuilt in place.
pub fn supports_in_place(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| ext == "xlsx" || ext == "xlsm")
}

struct Sheet {
    name: String,
    /// Absolute (row, column, value) triples.
    cells: Vec<(u32, u32, Data)>,
}

impl Sheet {
    fn set(&mut self, row: u32, col: u32, value: Data) {
        match self.cells.iter_mut().find(|(r, c, _)| *r == row && *c == col) {
            Some(cell) => cell.2 = value,
            None => self.cells.push((row, col, value)),
        }
    }

    fn header(&self) -> Vec<(u32, String)> {
        let mut header: Vec<(u32, String)> = self
            .cells
            .iter()
            .filter(|(row, _, data)| *row == 0 && !matches!(data, Data::Empty))
            .map(|(_, col, data)| (*col, data.to_string().trim().to_string()))
            .collect();
        header.sort_by_key(|(col, _)| *col);
        header
    }
}

fn read_workbook(path: &Path) -> Result<Vec<Sheet>> {
    let mut workbook = open_workbook_auto(path)?;
    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = workbook.worksheet_range(&name)?;
        let (row0, col0) = range.start().unwrap_or((0, 0));
        let cells = range
            .used_cells()
            .map(|(row, col, data)| {
                (
                    row0 + u32::try_from(row).unwrap_or(u32::MAX),
                    col0 + u32::try_from(col).unwrap_or(u32::MAX),
                    data.clone(),
                )
            })
            .collect();
        sheets.push(Sheet { name, cells });
    }
    Ok(sheets)
}

fn column_index(col: u32) -> Result<u16> {
    u16::try_from(col).map_err(|_| Error::conflict(format!("column {col} is outside the sheet")))
}

fn render(sheets: &[Sheet]) -> Result<Vec<u8>> {
    let mut workbook = Workbook::new();
    let datetime = Format::new().set_num_format(DATETIME_FORMAT);
    for sheet in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(&sheet.name)?;
        for (row, col, data) in &sheet.cells {
            let col = column_index(*col)?;
            match data {
                Data::Int(i) => {
                    #[allow(clippy::cast_precision_loss)]
                    worksheet.write_number(*row, col, *i as f64)?;
                }
                Data::Float(f) => {
                    worksheet.write_number(*row, col, *f)?;
                }
                Data::Bool(b) => {
                    worksheet.write_boolean(*row, col, *b)?;
                }
                Data::DateTime(excel) => {
                    worksheet.write_number_with_format(*row, col, excel.as_f64(), &datetime)?;
                }
                Data::String(text) | Data::DateTimeIso(text) | Data::DurationIso(text) => {
                    worksheet.write_string(*row, col, text)?;
                }
                Data::Error(_) | Data::Empty => {}
            }
        }
    }
    Ok(workbook.save_to_buffer()?)
}

/// Write `outcome` into data row `row_number` of `sheet` (the first sheet
/// when `None`). Returns the header columns that had to be added.
pub fn write_workbook(
    path: &Path,
    sheet: Option<&str>,
    row_number: u64,
    outcome: &[(String, String)],
) -> Result<Vec<String>> {
    if !path.is_file() {
        return Err(Error::not_found(format!("File '{}'", path.display())));
    }
    let mut sheets = read_workbook(path)?;
    let target = match sheet {
        Some(name) => sheets
            .iter_mut()
            .find(|candidate| candidate.name == name)
            .ok_or_else(|| Error::not_found(format!("Sheet '{name}'")))?,
        None => sheets
            .first_mut()
            .ok_or_else(|| Error::conflict("workbook has no sheets"))?,
    };

    let row = u32::try_from(row_number)
        .ok()
        .filter(|row| *row >= 1)
        .ok_or_else(|| Error::not_found(format!("Row {row_number}")))?;
    let occupied = target
        .cells
        .iter()
        .any(|(r, _, data)| *r == row && !matches!(data, Data::Empty));
    if !occupied {
        return Err(Error::not_found(format!("Row {row_number} in sheet '{}'", target.name)));
    }

    let mut header = target.header();
    let mut next_col = header.last().map_or(0, |(col, _)| col + 1);
    let mut added = Vec::new();
    for (column, value) in outcome {
        let col = match header.iter().find(|(_, name)| name == column) {
            Some((col, _)) => *col,
            None => {
                let col = next_col;
                next_col += 1;
                target.set(0, col, Data::String(column.clone()));
                header.push((col, column.clone()));
                added.push(column.clone());
                col
            }
        };
        target.set(row, col, Data::String(value.clone()));
    }

    let buffer = render(&sheets)?;
    replace_file(path, &buffer)?;
    debug!(path = %path.display(), row = row_number, added = added.len(), "Workbook write-back");
    Ok(added)
}
