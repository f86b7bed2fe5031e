use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use calamine::{open_workbook_auto, Data, Reader};

use super::{Cell, Table};

/// Read a table from `.xlsx`/`.xls`/`.xlsm`/`.ods` or `.csv`, by extension.
pub fn read_table(path: &Path) -> Result<Table> {
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => read_csv(path),
        "xlsx" | "xlsm" | "xls" | "ods" => read_spreadsheet(path),
        other => bail!("Unsupported file type {other:?}: {}", path.display()),
    }
}

/// Read the first worksheet, using its first row as the header.
pub fn read_spreadsheet(path: &Path) -> Result<Table> {
    let mut workbook = open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))?;
    let range = workbook
        .worksheet_range_at(0)
        .with_context(|| format!("Workbook has no sheets: {}", path.display()))?
        .with_context(|| format!("Failed to read first sheet: {}", path.display()))?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let mut table = Table::new(header_names(header.iter().map(header_text)));
    for row in rows {
        table.push_row(row.iter().map(cell_from_data).collect());
    }
    Ok(table)
}

/// Read a CSV file with a header row.
///
/// Short rows are padded; a row with more fields than the header is an error.
pub fn read_csv(path: &Path) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV: {}", path.display()))?;

    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read CSV header: {}", path.display()))?
        .clone();
    let mut table = Table::new(header_names(headers.iter().map(str::to_string)));

    for (line, record) in reader.records().enumerate() {
        let record =
            record.with_context(|| format!("Malformed CSV record in {}", path.display()))?;
        if record.len() > headers.len() {
            bail!(
                "Row {} of {} has {} fields but the header has {}",
                line + 2,
                path.display(),
                record.len(),
                headers.len()
            );
        }
        table.push_row(record.iter().map(Cell::from_text).collect());
    }
    Ok(table)
}

/// Name blank headers `Unnamed: {i}` and suffix repeats as `{name}.{n}`.
fn header_names(raw: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    raw.enumerate()
        .map(|(i, name)| {
            let name = name.trim().to_string();
            let name = if name.is_empty() {
                format!("Unnamed: {i}")
            } else {
                name
            };
            let count = seen.entry(name.clone()).or_insert(0);
            let unique = if *count == 0 {
                name
            } else {
                format!("{name}.{count}")
            };
            *count += 1;
            unique
        })
        .collect()
}

fn header_text(data: &Data) -> String {
    match data {
        Data::Empty => String::new(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        other => other.to_string(),
    }
}

fn cell_from_data(data: &Data) -> Cell {
    match data {
        Data::Empty => Cell::Empty,
        Data::String(s) => Cell::from_text(s.clone()),
        Data::Int(i) => Cell::Int(*i),
        Data::Float(f) => Cell::Float(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(naive) => Cell::DateTime(naive),
            None => Cell::Float(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::from_text(s.clone()),
        Data::Error(err) => Cell::Text(format!("#{err:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn header_names_are_unique() {
        let names = header_names(
            ["A", "", "A", "B", "A"].into_iter().map(str::to_string),
        );
        assert_eq!(names, ["A", "Unnamed: 1", "A.1", "B", "A.2"]);
    }

    #[test]
    fn csv_pads_short_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("acc_1.csv");
        std::fs::write(&path, "a,b,c\n1,2,3\n4\n")?;

        let table = read_csv(&path)?;
        assert_eq!(table.len(), 2);
        assert_eq!(table.get(1, "a"), Some(&Cell::Text("4".into())));
        assert_eq!(table.get(1, "c"), Some(&Cell::Empty));
        Ok(())
    }

    #[test]
    fn csv_rejects_long_rows() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "a,b\n1,2,3\n")?;

        assert!(read_csv(&path).is_err());
        Ok(())
    }

    #[test]
    fn unknown_extension_is_rejected() {
        assert!(read_table(Path::new("report.pdf")).is_err());
    }
}
