use std::path::Path;

use anyhow::{bail, Context, Result};
use rust_xlsxwriter::{Format, Workbook};

use super::{Cell, Table};

const DATETIME_NUM_FORMAT: &str = "yyyy-mm-dd hh:mm:ss";

/// Write `table` as `.xlsx` or `.csv`, by extension.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "xlsx" => write_xlsx(table, path),
        "csv" => write_csv(table, path),
        other => bail!("Unsupported output type {other:?}: {}", path.display()),
    }
}

/// Single-sheet workbook with a bold header row.
pub fn write_xlsx(table: &Table, path: &Path) -> Result<()> {
    let mut workbook = Workbook::new();
    let header_format = Format::new().set_bold();
    let datetime_format = Format::new().set_num_format(DATETIME_NUM_FORMAT);

    let sheet = workbook.add_worksheet();
    for (col, name) in table.columns().iter().enumerate() {
        sheet.write_string_with_format(0, column_index(col)?, name, &header_format)?;
    }

    for (i, row) in table.rows().iter().enumerate() {
        let row_index = u32::try_from(i + 1).context("Too many rows for a worksheet")?;
        for (col, cell) in row.iter().enumerate() {
            let col = column_index(col)?;
            match cell {
                Cell::Empty => {}
                Cell::Text(text) => {
                    sheet.write_string(row_index, col, text)?;
                }
                Cell::Int(value) => {
                    sheet.write_number(row_index, col, *value as f64)?;
                }
                Cell::Float(value) => {
                    sheet.write_number(row_index, col, *value)?;
                }
                Cell::Bool(value) => {
                    sheet.write_boolean(row_index, col, *value)?;
                }
                Cell::DateTime(dt) => {
                    sheet.write_datetime_with_format(row_index, col, dt, &datetime_format)?;
                }
            }
        }
    }

    workbook
        .save(path)
        .with_context(|| format!("Failed to write workbook: {}", path.display()))?;
    Ok(())
}

fn column_index(col: usize) -> Result<u16> {
    u16::try_from(col).context("Too many columns for a worksheet")
}

/// CSV with a header row; timestamps as `YYYY-mm-dd HH:MM:SS`.
pub fn write_csv(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create CSV: {}", path.display()))?;
    writer.write_record(table.columns())?;
    for row in table.rows() {
        writer.write_record(row.iter().map(Cell::to_string))?;
    }
    writer
        .flush()
        .with_context(|| format!("Failed to write CSV: {}", path.display()))?;
    Ok(())
}
