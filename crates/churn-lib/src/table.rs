//! In-memory tabular data for bulk scoring
//!
//! An ordered set of named columns with rows addressable by index. Cells
//! are kept as the original text so the table can be written back out
//! unchanged apart from appended columns.

use crate::error::TableError;
use crate::models::RawInput;
use serde_json::Value;
use std::io;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    /// Empty table with the given header
    pub fn new(columns: Vec<String>) -> Result<Self, TableError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].contains(column) {
                return Err(TableError::DuplicateColumn(column.clone()));
            }
        }
        Ok(Self {
            columns,
            rows: Vec::new(),
        })
    }

    /// Parse CSV with a header row
    pub fn from_csv_reader<R: io::Read>(reader: R) -> Result<Self, TableError> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(reader);
        let columns = reader.headers()?.iter().map(str::to_string).collect();
        let mut table = Self::new(columns)?;
        for record in reader.records() {
            let record = record?;
            table.push_row(record.iter().map(str::to_string).collect())?;
        }
        Ok(table)
    }

    pub fn from_csv_str(csv: &str) -> Result<Self, TableError> {
        Self::from_csv_reader(csv.as_bytes())
    }

    pub fn to_csv_string(&self) -> Result<String, TableError> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| TableError::Csv(csv::Error::from(e.into_error())))?;
        String::from_utf8(bytes).map_err(|_| TableError::Encoding)
    }

    pub fn push_row(&mut self, row: Vec<String>) -> Result<(), TableError> {
        if row.len() != self.columns.len() {
            return Err(TableError::RaggedRow {
                row: self.rows.len(),
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    /// Append a trailing column; needs exactly one value per row
    pub fn append_column(
        &mut self,
        name: impl Into<String>,
        values: Vec<String>,
    ) -> Result<(), TableError> {
        let name = name.into();
        if self.columns.contains(&name) {
            return Err(TableError::DuplicateColumn(name));
        }
        if values.len() != self.rows.len() {
            return Err(TableError::ColumnLength {
                column: name,
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        self.columns.push(name);
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Remove a column by name; returns whether it was present
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(i) = self.columns.iter().position(|c| c == name) else {
            return false;
        };
        self.columns.remove(i);
        for row in &mut self.rows {
            row.remove(i);
        }
        true
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, index: usize) -> Option<&[String]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let i = self.columns.iter().position(|c| c == name)?;
        Some(self.rows.iter().map(|row| row[i].as_str()).collect())
    }

    /// One raw input per row, cells as strings; empty cells are left out so
    /// they read as missing fields
    pub fn to_raw_inputs(&self) -> Vec<RawInput> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .zip(row)
                    .filter(|(_, cell)| !cell.trim().is_empty())
                    .map(|(column, cell)| (column.clone(), Value::String(cell.trim().to_string())))
                    .collect()
            })
            .collect()
    }
}
