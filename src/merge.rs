//! Combining downloaded exports into a single file.
//!
//! Three variants share [`combine_files`]: the download merge (timestamped
//! workbook in the download directory), the folder merge (one fixed-name
//! workbook) and the batch CSV merge (one file per name prefix).

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::MergeConfig;
use crate::table::{read_table, write_table, SortOutcome, Table};

pub const DOWNLOAD_PROVENANCE_COLUMN: &str = "Periodo_Archivo";
pub const FILE_PROVENANCE_COLUMN: &str = "archivo_origen";

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xls", "ods"];

/// What goes in the provenance column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvenanceLabel {
    /// File name without extension.
    FileStem,
    /// File name with extension.
    FileName,
}

impl ProvenanceLabel {
    fn label(self, path: &Path) -> String {
        let part = match self {
            ProvenanceLabel::FileStem => path.file_stem(),
            ProvenanceLabel::FileName => path.file_name(),
        };
        part.map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MergeSpec {
    pub provenance_column: String,
    pub provenance: ProvenanceLabel,
    pub date_columns: Vec<String>,
}

/// A file that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergeFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Inputs stacked into one table.
#[derive(Debug)]
pub struct Combined {
    pub table: Table,
    pub files_read: usize,
    pub failures: Vec<MergeFailure>,
    pub sort: SortOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum MergeOutcome {
    Written {
        path: PathBuf,
        files_read: usize,
        rows: usize,
        sort: SortOutcome,
        failures: Vec<MergeFailure>,
    },
    /// No input files matched.
    NoInputs,
    /// Inputs existed but none could be read.
    NothingReadable { failures: Vec<MergeFailure> },
}

impl MergeOutcome {
    pub fn is_written(&self) -> bool {
        matches!(self, MergeOutcome::Written { .. })
    }

    pub fn path(&self) -> Option<&Path> {
        match self {
            MergeOutcome::Written { path, .. } => Some(path),
            _ => None,
        }
    }
}

/// Read, tag and stack `files`, then sort by date if possible.
///
/// Unreadable files are logged and listed in the result; `files_read` is
/// zero when nothing could be read.
pub fn combine_files(files: &[PathBuf], spec: &MergeSpec) -> Combined {
    let mut tables = Vec::with_capacity(files.len());
    let mut failures = Vec::new();

    for path in files {
        match read_table(path) {
            Ok(table) => {
                let label = spec.provenance.label(path);
                info!(file = %path.display(), rows = table.len(), "Read input");
                tables.push(table.with_constant_column(&spec.provenance_column, &label));
            }
            Err(err) => {
                warn!(file = %path.display(), error = %format!("{err:#}"), "Skipping unreadable file");
                failures.push(MergeFailure {
                    path: path.clone(),
                    error: format!("{err:#}"),
                });
            }
        }
    }

    let files_read = tables.len();
    let mut table = Table::stack(tables);
    let sort = table.sort_by_date(&spec.date_columns);
    match &sort {
        SortOutcome::Sorted { column } => info!(column = %column, "Sorted rows by date"),
        SortOutcome::NoDateColumn => info!("No date column; keeping input order"),
        SortOutcome::Unparseable { column, row, value } => warn!(
            column = %column,
            row,
            value = %value,
            "Unparseable date; keeping input order"
        ),
    }

    Combined {
        table,
        files_read,
        failures,
        sort,
    }
}

/// Combine `files` and write the result to `output`.
pub fn merge_into(files: &[PathBuf], output: &Path, spec: &MergeSpec) -> Result<MergeOutcome> {
    if files.is_empty() {
        warn!("No files to merge");
        return Ok(MergeOutcome::NoInputs);
    }

    let combined = combine_files(files, spec);
    if combined.files_read == 0 {
        warn!(failed = combined.failures.len(), "No input file could be read");
        return Ok(MergeOutcome::NothingReadable {
            failures: combined.failures,
        });
    }

    write_table(&combined.table, output)
        .with_context(|| format!("Failed to write merged file: {}", output.display()))?;
    info!(
        file = %output.display(),
        files = combined.files_read,
        rows = combined.table.len(),
        "Merged file written"
    );

    Ok(MergeOutcome::Written {
        path: output.to_path_buf(),
        files_read: combined.files_read,
        rows: combined.table.len(),
        sort: combined.sort,
        failures: combined.failures,
    })
}

fn sorted_files(dir: &Path, keep: impl Fn(&str) -> bool) -> Result<Vec<PathBuf>> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        // Office lock files.
        if name.starts_with("~$") {
            continue;
        }
        if keep(&name) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(extension))
}

/// Downloaded workbooks in `dir`: every `.xlsx`, or every `.xls` if there is
/// no `.xlsx`. Files named with `exclude_prefix` (earlier merges) are skipped.
pub fn collect_downloads(dir: &Path, exclude_prefix: &str) -> Result<Vec<PathBuf>> {
    let fresh = |name: &str| exclude_prefix.is_empty() || !name.starts_with(exclude_prefix);
    let xlsx = sorted_files(dir, |name| has_extension(name, "xlsx") && fresh(name))?;
    if !xlsx.is_empty() {
        return Ok(xlsx);
    }
    sorted_files(dir, |name| has_extension(name, "xls") && fresh(name))
}

/// Merge the downloads in `dir` into `{output_prefix}_{timestamp}.xlsx`.
pub fn merge_downloads(dir: &Path, merge: &MergeConfig, clock: &dyn Clock) -> Result<MergeOutcome> {
    let files = collect_downloads(dir, &merge.output_prefix)?;
    info!(dir = %dir.display(), files = files.len(), "Merging downloads");

    let output = dir.join(format!(
        "{}_{}.xlsx",
        merge.output_prefix,
        clock.timestamp_slug()
    ));
    let spec = MergeSpec {
        provenance_column: DOWNLOAD_PROVENANCE_COLUMN.to_string(),
        provenance: ProvenanceLabel::FileStem,
        date_columns: merge.date_columns.clone(),
    };
    merge_into(&files, &output, &spec)
}

/// Merge every spreadsheet in `dir` into `output`, tagging rows with the file name.
pub fn merge_folder(dir: &Path, output: &Path, merge: &MergeConfig) -> Result<MergeOutcome> {
    let output_name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let files = sorted_files(dir, |name| {
        name != output_name
            && SPREADSHEET_EXTENSIONS
                .iter()
                .any(|ext| has_extension(name, ext))
    })?;
    info!(dir = %dir.display(), files = files.len(), "Merging folder");

    let spec = MergeSpec {
        provenance_column: FILE_PROVENANCE_COLUMN.to_string(),
        provenance: ProvenanceLabel::FileName,
        date_columns: merge.date_columns.clone(),
    };
    merge_into(&files, output, &spec)
}

/// `{prefix}*.csv` in `dir`, excluding a previous `{prefix}_merged.csv`.
pub fn collect_prefixed_csv(dir: &Path, prefix: &str) -> Result<Vec<PathBuf>> {
    let merged = merged_csv_name(prefix);
    sorted_files(dir, |name| {
        name.starts_with(prefix) && has_extension(name, "csv") && name != merged
    })
}

pub fn merged_csv_name(prefix: &str) -> String {
    format!("{prefix}_merged.csv")
}

/// Batch CSV merge: one `{prefix}_merged.csv` in `output_dir` per prefix.
///
/// Prefixes are independent; an error for one does not stop the others.
/// `output_dir` must already exist.
pub fn merge_prefixed_csv(
    input_dir: &Path,
    output_dir: &Path,
    merge: &MergeConfig,
) -> Vec<(String, Result<MergeOutcome>)> {
    merge
        .csv_prefixes
        .iter()
        .map(|prefix| {
            let outcome = collect_prefixed_csv(input_dir, prefix).and_then(|files| {
                info!(prefix = %prefix, files = files.len(), "Merging CSV files");
                let spec = MergeSpec {
                    provenance_column: FILE_PROVENANCE_COLUMN.to_string(),
                    provenance: ProvenanceLabel::FileName,
                    date_columns: merge.date_columns.clone(),
                };
                merge_into(&files, &output_dir.join(merged_csv_name(prefix)), &spec)
            });
            if let Err(err) = &outcome {
                warn!(prefix = %prefix, error = %format!("{err:#}"), "CSV merge failed");
            }
            (prefix.clone(), outcome)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn provenance_labels() {
        let path = Path::new("/tmp/20210101_20210331.xlsx");
        assert_eq!(ProvenanceLabel::FileStem.label(path), "20210101_20210331");
        assert_eq!(
            ProvenanceLabel::FileName.label(path),
            "20210101_20210331.xlsx"
        );
    }

    #[test]
    fn downloads_prefer_xlsx_and_skip_merged() -> Result<()> {
        let dir = TempDir::new()?;
        for name in [
            "b.xlsx",
            "a.xlsx",
            "old.xls",
            "~$a.xlsx",
            "Ventas_Combinadas_2021_2025_20250101_000000.xlsx",
            "b.xlsx.crdownload",
        ] {
            std::fs::write(dir.path().join(name), b"")?;
        }

        let files = collect_downloads(dir.path(), "Ventas_Combinadas_2021_2025")?;
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.xlsx", "b.xlsx"]);
        Ok(())
    }

    #[test]
    fn downloads_fall_back_to_xls() -> Result<()> {
        let dir = TempDir::new()?;
        std::fs::write(dir.path().join("old.xls"), b"")?;
        let files = collect_downloads(dir.path(), "Ventas")?;
        assert_eq!(files, vec![dir.path().join("old.xls")]);
        Ok(())
    }

    #[test]
    fn prefixed_csv_excludes_previous_output() -> Result<()> {
        let dir = TempDir::new()?;
        for name in ["acc_2021.csv", "acc_merged.csv", "accidents.txt", "pers_1.csv"] {
            std::fs::write(dir.path().join(name), b"a\n1\n")?;
        }
        let files = collect_prefixed_csv(dir.path(), "acc")?;
        assert_eq!(files, vec![dir.path().join("acc_2021.csv")]);
        Ok(())
    }
}
