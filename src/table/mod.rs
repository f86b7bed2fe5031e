//! In-memory tabular data for the merge step.
//!
//! Spreadsheets and CSV files are read into a [`Table`] of loosely typed
//! [`Cell`]s, stacked, optionally sorted by a date column and written back out.

mod read;
mod write;

pub use read::{read_csv, read_spreadsheet, read_table};
pub use write::{write_csv, write_table, write_xlsx};

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Textual date formats accepted when sorting, tried in order. Day-first
/// formats come before month-first ones since the portal writes `dd/mm/YYYY`.
/// `%.f` takes an optional fractional second.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
    "%d/%m/%Y %H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
];
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y"];

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

impl Cell {
    /// A text cell, or [`Cell::Empty`] for an empty string.
    pub fn from_text(text: impl Into<String>) -> Self {
        let text = text.into();
        if text.is_empty() {
            Cell::Empty
        } else {
            Cell::Text(text)
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Cell::Empty)
    }

    /// Interpret the cell as a timestamp.
    ///
    /// Numbers are never treated as dates.
    pub fn as_datetime(&self) -> Option<NaiveDateTime> {
        match self {
            Cell::DateTime(dt) => Some(*dt),
            Cell::Text(text) => parse_datetime(text.trim()),
            _ => None,
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(text) => f.write_str(text),
            Cell::Int(value) => write!(f, "{value}"),
            Cell::Float(value) => write!(f, "{value}"),
            Cell::Bool(value) => write!(f, "{value}"),
            Cell::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    if text.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|format| NaiveDate::parse_from_str(text, format).ok())
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
        .or_else(|| {
            DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.naive_local())
        })
}

/// Result of [`Table::sort_by_date`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum SortOutcome {
    /// None of the candidate columns exist; rows keep their order.
    NoDateColumn,
    Sorted { column: String },
    /// A non-empty value could not be read as a date; rows keep their order.
    Unparseable {
        column: String,
        row: usize,
        value: String,
    },
}

/// Rows under a header. Every row has exactly one cell per column.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the column count.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        let index = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(index))
    }

    /// Set `column` to `value` on every row, adding the column if needed.
    pub fn with_constant_column(mut self, column: &str, value: &str) -> Self {
        let cell = Cell::from_text(value);
        match self.column_index(column) {
            Some(index) => {
                for row in &mut self.rows {
                    row[index] = cell.clone();
                }
            }
            None => {
                self.columns.push(column.to_string());
                for row in &mut self.rows {
                    row.push(cell.clone());
                }
            }
        }
        self
    }

    /// Concatenate tables row-wise.
    ///
    /// The result has the union of all columns in first-seen order; cells a
    /// source table lacks are empty.
    pub fn stack(tables: Vec<Table>) -> Table {
        let mut columns: Vec<String> = Vec::new();
        let mut positions: HashMap<String, usize> = HashMap::new();
        for table in &tables {
            for column in &table.columns {
                if !positions.contains_key(column) {
                    positions.insert(column.clone(), columns.len());
                    columns.push(column.clone());
                }
            }
        }

        let mut stacked = Table::new(columns);
        for table in tables {
            let mapping: Vec<usize> = table
                .columns
                .iter()
                .filter_map(|column| positions.get(column).copied())
                .collect();
            for row in table.rows {
                let mut out = vec![Cell::Empty; stacked.columns.len()];
                for (cell, &target) in row.into_iter().zip(&mapping) {
                    out[target] = cell;
                }
                stacked.rows.push(out);
            }
        }
        stacked
    }

    /// The first of `candidates` present in the header.
    pub fn find_column<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        candidates
            .iter()
            .map(AsRef::as_ref)
            .find(|name| self.column_index(name).is_some())
            .map(str::to_string)
    }

    /// Sort rows ascending by the first candidate column that exists.
    ///
    /// The sort is stable and empty cells go last. On success the column's
    /// values are stored as timestamps. If any non-empty value cannot be
    /// read as a date, nothing changes.
    pub fn sort_by_date<S: AsRef<str>>(&mut self, candidates: &[S]) -> SortOutcome {
        let Some(column) = self.find_column(candidates) else {
            return SortOutcome::NoDateColumn;
        };
        let Some(index) = self.column_index(&column) else {
            return SortOutcome::NoDateColumn;
        };

        let mut keys: Vec<Option<NaiveDateTime>> = Vec::with_capacity(self.rows.len());
        for (row_number, row) in self.rows.iter().enumerate() {
            let cell = &row[index];
            if cell.is_empty() {
                keys.push(None);
                continue;
            }
            match cell.as_datetime() {
                Some(dt) => keys.push(Some(dt)),
                None => {
                    return SortOutcome::Unparseable {
                        column,
                        row: row_number,
                        value: cell.to_string(),
                    }
                }
            }
        }

        let mut keyed: Vec<(Option<NaiveDateTime>, Vec<Cell>)> =
            keys.into_iter().zip(self.rows.drain(..)).collect();
        keyed.sort_by(|(a, _), (b, _)| match (a, b) {
            (Some(a), Some(b)) => a.cmp(b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        });
        self.rows = keyed
            .into_iter()
            .map(|(key, mut row)| {
                if let Some(dt) = key {
                    row[index] = Cell::DateTime(dt);
                }
                row
            })
            .collect();

        SortOutcome::Sorted { column }
    }
}
