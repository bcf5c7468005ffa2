//! Error taxonomy for loading, filtering and charting.
//!
//! Application plumbing uses `color_eyre::Result`; these typed errors exist where callers
//! branch on the failure (a parse error keeps the previous table, a chart error is shown
//! inline while the rest of the screen keeps working).

use thiserror::Error;

/// Failure to turn uploaded bytes into a table.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("file is empty")]
    Empty,

    #[error("file is not valid UTF-8 text (first invalid byte at offset {offset})")]
    Encoding { offset: usize },

    #[error("could not decompress gzip input: {0}")]
    Decompress(#[from] std::io::Error),

    #[error("file has no columns")]
    NoColumns,

    #[error("malformed CSV: {0}")]
    Malformed(#[from] polars::error::PolarsError),
}

/// Failure to apply a user selection to a filter control.
#[derive(Error, Debug, PartialEq)]
pub enum FilterError {
    #[error("no filter for column '{0}'")]
    UnknownColumn(String),

    #[error("column '{column}' takes a {expected} selection")]
    KindMismatch {
        column: String,
        expected: &'static str,
    },

    #[error("'{value}' is not one of the values of column '{column}'")]
    UnknownValue { column: String, value: String },
}

/// Failure to build or render a chart for a column/kind combination.
#[derive(Error, Debug)]
pub enum ChartConstructionError {
    #[error("column '{0}' does not exist")]
    UnknownColumn(String),

    #[error("{kind} chart needs a numeric y column, '{column}' is {found}")]
    NonNumeric {
        kind: &'static str,
        column: String,
        found: &'static str,
    },

    #[error("pie chart values must be non-negative, '{column}' has {value}")]
    NegativePieValue { column: String, value: f64 },

    #[error("no rows to plot for '{0}' after dropping missing values")]
    NoData(String),

    #[error("chart rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Polars(#[from] polars::error::PolarsError),
}
