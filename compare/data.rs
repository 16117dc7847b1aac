//! # Data Loading and Validation Module
//!
//! This module is the exclusive entry point for user-provided data. It reads
//! a delimited text file with a header row, validates every column, and
//! converts the table into the in-memory `Dataset` the statistical core
//! works on.
//!
//! - Columns are typed at load time: string columns become categorical with
//!   an explicit level table, everything else is cast to `f64`.
//! - Categorical codes are reproducible by construction: levels are the
//!   distinct labels sorted lexicographically, and a value's code is its
//!   index into that table. The table is part of the `Dataset` and survives
//!   row subsetting, so train/test/fold encodings always agree.
//! - Failures are assumed to be user-input errors. `DataError` is designed
//!   to give clear, actionable feedback.

use ndarray::Array1;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use thiserror::Error;

/// A single named column of a [`Dataset`].
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

/// The typed payload of a column.
#[derive(Debug, Clone)]
pub enum ColumnValues {
    Numeric(Array1<f64>),
    Categorical(CategoricalColumn),
}

/// A categorical column with a fixed label-to-code mapping.
///
/// `levels` holds the distinct labels in lexicographic order; `codes[i]` is
/// the index of row `i`'s label in `levels`.
#[derive(Debug, Clone)]
pub struct CategoricalColumn {
    pub levels: Vec<String>,
    pub codes: Vec<u32>,
}

impl CategoricalColumn {
    /// Builds the level table and codes from raw labels.
    pub fn from_labels(labels: &[String]) -> Self {
        let mut levels: Vec<String> = labels.to_vec();
        levels.sort_unstable();
        levels.dedup();
        let codes = labels
            .iter()
            .map(|label| {
                levels
                    .binary_search(label)
                    .map(|idx| idx as u32)
                    .unwrap_or(0)
            })
            .collect();
        Self { levels, codes }
    }

    pub fn label_of(&self, code: u32) -> &str {
        &self.levels[code as usize]
    }
}

/// An immutable table of equally long, named columns.
///
/// A `Dataset` is loaded (or constructed) once and never mutated; partitions
/// and folds are derived row subsets.
#[derive(Debug, Clone)]
pub struct Dataset {
    columns: Vec<Column>,
    n_rows: usize,
}

/// A comprehensive error type for all data loading and validation failures.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(
        "Missing or null values were found in column '{0}'. This tool requires complete data with no missing values."
    )]
    MissingValuesFound(String),
    #[error(
        "Non-finite values (NaN or Infinity) were found in the numeric column '{0}'. All numeric data must be finite."
    )]
    NonFiniteValuesFound(String),
    #[error(
        "Column '{column_name}' has unsupported type '{found_type}'. Columns must be numeric or text."
    )]
    UnsupportedColumnType {
        column_name: String,
        found_type: String,
    },
    #[error("The input file contains a header but no data rows.")]
    EmptyTable,
    #[error("Duplicate column name '{0}' in the input.")]
    DuplicateColumn(String),
    #[error(
        "Column '{column_name}' has {found} rows, but the first column has {expected}. All columns must be equally long."
    )]
    MismatchedColumnLengths {
        column_name: String,
        expected: usize,
        found: usize,
    },
}

impl Dataset {
    /// Constructs a dataset from already-typed columns, validating that all
    /// columns are equally long and uniquely named.
    pub fn new(columns: Vec<Column>) -> Result<Self, DataError> {
        let n_rows = columns.first().map(Column::len).unwrap_or(0);
        if n_rows == 0 {
            return Err(DataError::EmptyTable);
        }
        for column in &columns {
            if column.len() != n_rows {
                return Err(DataError::MismatchedColumnLengths {
                    column_name: column.name.clone(),
                    expected: n_rows,
                    found: column.len(),
                });
            }
        }
        let mut seen: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
        seen.sort_unstable();
        for pair in seen.windows(2) {
            if pair[0] == pair[1] {
                return Err(DataError::DuplicateColumn(pair[0].to_string()));
            }
        }
        Ok(Self { columns, n_rows })
    }

    /// Loads a comma-delimited file with a header row.
    pub fn from_csv(path: &Path) -> Result<Self, DataError> {
        let df = CsvReader::new(File::open(path)?)
            .with_options(
                CsvReadOptions::default()
                    .with_has_header(true)
                    .with_parse_options(CsvParseOptions::default().with_separator(b',')),
            )
            .finish()?;
        log::info!("loaded {} rows from {}", df.height(), path.display());

        if df.height() == 0 {
            return Err(DataError::EmptyTable);
        }

        let mut columns = Vec::with_capacity(df.width());
        for name in df.get_column_names() {
            let series = df.column(name.as_str())?;
            if series.null_count() > 0 {
                return Err(DataError::MissingValuesFound(name.to_string()));
            }
            let values = if series.dtype() == &DataType::String {
                let labels: Vec<String> = series
                    .str()?
                    .into_iter()
                    .flatten()
                    .map(str::to_string)
                    .collect();
                ColumnValues::Categorical(CategoricalColumn::from_labels(&labels))
            } else {
                let casted = match series.cast(&DataType::Float64) {
                    Ok(casted) => casted,
                    Err(_) => {
                        return Err(DataError::UnsupportedColumnType {
                            column_name: name.to_string(),
                            found_type: format!("{:?}", series.dtype()),
                        });
                    }
                };
                if casted.null_count() > 0 {
                    return Err(DataError::UnsupportedColumnType {
                        column_name: name.to_string(),
                        found_type: format!("{:?}", series.dtype()),
                    });
                }
                let chunked = casted.f64()?.rechunk();
                let values: Vec<f64> = chunked.into_no_null_iter().collect();
                if values.iter().any(|v| !v.is_finite()) {
                    return Err(DataError::NonFiniteValuesFound(name.to_string()));
                }
                ColumnValues::Numeric(Array1::from_vec(values))
            };
            columns.push(Column {
                name: name.to_string(),
                values,
            });
        }

        Self::new(columns)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Materializes the given rows as a new dataset.
    ///
    /// Level tables are carried over unchanged, so categorical codes in the
    /// subset mean the same thing they meant in the parent.
    pub fn subset(&self, rows: &[usize]) -> Dataset {
        let columns = self
            .columns
            .iter()
            .map(|column| {
                let values = match &column.values {
                    ColumnValues::Numeric(values) => {
                        ColumnValues::Numeric(rows.iter().map(|&r| values[r]).collect())
                    }
                    ColumnValues::Categorical(cat) => {
                        ColumnValues::Categorical(CategoricalColumn {
                            levels: cat.levels.clone(),
                            codes: rows.iter().map(|&r| cat.codes[r]).collect(),
                        })
                    }
                };
                Column {
                    name: column.name.clone(),
                    values,
                }
            })
            .collect();
        Dataset {
            columns,
            n_rows: rows.len(),
        }
    }
}

impl Column {
    pub fn len(&self) -> usize {
        match &self.values {
            ColumnValues::Numeric(values) => values.len(),
            ColumnValues::Categorical(cat) => cat.codes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn numeric(name: &str, values: Vec<f64>) -> Self {
        Self {
            name: name.to_string(),
            values: ColumnValues::Numeric(Array1::from_vec(values)),
        }
    }

    pub fn categorical(name: &str, labels: &[&str]) -> Self {
        let owned: Vec<String> = labels.iter().map(|s| s.to_string()).collect();
        Self {
            name: name.to_string(),
            values: ColumnValues::Categorical(CategoricalColumn::from_labels(&owned)),
        }
    }
}
