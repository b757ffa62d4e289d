//! Per-ROI results table.
//!
//! One row per ROI in collection order. The measurement step creates the rows;
//! classification columns are added afterwards and always hold a value for
//! every row. Columns keep their insertion order on export.

use std::fmt;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use thiserror::Error;

use crate::calibration::Calibration;
use crate::measure::{Morphometry, MEASUREMENT_COLUMNS};
use crate::roi::RoiSet;
use crate::selection::Selection;

pub const ROI_COLUMN: &str = "ROI";

#[derive(Clone, Debug, PartialEq)]
pub enum Cell {
    Number(f64),
    Text(String),
    Flag(bool),
}

impl Cell {
    pub const YES: Cell = Cell::Flag(true);
    pub const NO: Cell = Cell::Flag(false);
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Number(value) => write!(f, "{value:.4}"),
            Cell::Text(text) => f.write_str(text),
            Cell::Flag(true) => f.write_str("YES"),
            Cell::Flag(false) => f.write_str("NO"),
        }
    }
}

#[derive(Debug, Error)]
pub enum TableError {
    #[error("Column \"{0}\" does not exist")]
    UnknownColumn(String),
    #[error("Row {row} of column \"{column}\" is out of range, the table has {rows} row(s)")]
    RowOutOfRange {
        column: String,
        row: usize,
        rows: usize,
    },
    #[error("Column \"{column}\" needs {expected} value(s), got {actual}")]
    LengthMismatch {
        column: String,
        expected: usize,
        actual: usize,
    },
    #[error("Measurements were already added to this table")]
    AlreadyMeasured,
    #[error("CSV export failed: {0}")]
    Csv(#[from] csv::Error),
    #[error("Failed to write {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type TableResult<T> = Result<T, TableError>;

#[derive(Clone, Debug)]
struct Column {
    name: String,
    cells: Vec<Cell>,
}

#[derive(Clone, Debug, Default)]
pub struct ResultsTable {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl ResultsTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn row_count(&self) -> usize {
        self.rows
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.columns.iter().map(|column| column.name.as_str())
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Option<&[Cell]> {
        self.index
            .get(name)
            .map(|&idx| self.columns[idx].cells.as_slice())
    }

    pub fn cell(&self, name: &str, row: usize) -> Option<&Cell> {
        self.column(name)?.get(row)
    }

    /// Creates one row per ROI with its name and shape descriptors.
    pub fn add_measurements(&mut self, rois: &RoiSet, calibration: &Calibration) -> TableResult<()> {
        if !self.columns.is_empty() {
            return Err(TableError::AlreadyMeasured);
        }

        let measurements: Vec<Morphometry> = rois
            .iter()
            .map(|roi| Morphometry::measure(&roi.outline, calibration))
            .collect();

        self.rows = rois.len();
        self.insert_column(
            ROI_COLUMN,
            rois.iter().map(|roi| Cell::Text(roi.name.clone())).collect(),
        );
        for (col, name) in MEASUREMENT_COLUMNS.iter().enumerate() {
            self.insert_column(
                name,
                measurements
                    .iter()
                    .map(|m| Cell::Number(m.values()[col]))
                    .collect(),
            );
        }

        Ok(())
    }

    /// Adds `name` filled with `default` unless it already exists.
    pub fn ensure_column(&mut self, name: &str, default: Cell) {
        if self.has_column(name) {
            return;
        }
        self.insert_column(name, vec![default; self.rows]);
    }

    pub fn set_values(&mut self, name: &str, rows: &Selection, value: Cell) -> TableResult<()> {
        let row_count = self.rows;
        let idx = *self
            .index
            .get(name)
            .ok_or_else(|| TableError::UnknownColumn(name.to_string()))?;

        if let Some(row) = rows.max().filter(|&row| row >= row_count) {
            return Err(TableError::RowOutOfRange {
                column: name.to_string(),
                row,
                rows: row_count,
            });
        }

        let cells = &mut self.columns[idx].cells;
        for row in rows.iter() {
            cells[row] = value.clone();
        }
        Ok(())
    }

    /// Writes a whole column, creating it when missing.
    pub fn set_column(&mut self, name: &str, values: Vec<Cell>) -> TableResult<()> {
        if values.len() != self.rows {
            return Err(TableError::LengthMismatch {
                column: name.to_string(),
                expected: self.rows,
                actual: values.len(),
            });
        }

        match self.index.get(name) {
            Some(&idx) => self.columns[idx].cells = values,
            None => self.insert_column(name, values),
        }
        Ok(())
    }

    pub fn write_csv<W: Write>(&self, writer: W) -> TableResult<()> {
        let mut csv = csv::Writer::from_writer(writer);
        csv.write_record(self.column_names())?;
        for row in 0..self.rows {
            csv.write_record(
                self.columns
                    .iter()
                    .map(|column| column.cells[row].to_string()),
            )?;
        }
        csv.flush().map_err(csv::Error::from)?;
        Ok(())
    }

    pub fn save_csv(&self, path: &Path) -> TableResult<()> {
        let file = File::create(path).map_err(|source| TableError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.write_csv(file)
    }

    fn insert_column(&mut self, name: &str, cells: Vec<Cell>) {
        debug_assert_eq!(cells.len(), self.rows);
        self.index.insert(name.to_string(), self.columns.len());
        self.columns.push(Column {
            name: name.to_string(),
            cells,
        });
    }
}
