//! Loaded dataset: CSV parsing, column-kind inference and temporal coercion.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use flate2::read::GzDecoder;
use polars::datatypes::{DataType, TimeUnit};
use polars::prelude::*;
use std::io::{Cursor, Read};

use crate::error::ParseError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Datetime formats accepted when deciding whether a text column is temporal.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d.%m.%Y"];

/// Kind of a column, which decides the filter control built for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Temporal,
    Categorical,
}

impl ColumnKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Numeric => "numeric",
            Self::Temporal => "temporal",
            Self::Categorical => "categorical",
        }
    }
}

/// Options for reading CSV input.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadOptions {
    pub delimiter: u8,
    pub has_header: bool,
    pub skip_rows: usize,
    /// Let the reader infer Date/Datetime columns from ISO-8601 text.
    pub parse_dates: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            has_header: true,
            skip_rows: 0,
            parse_dates: true,
        }
    }
}

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_has_header(mut self, has_header: bool) -> Self {
        self.has_header = has_header;
        self
    }

    pub fn with_skip_rows(mut self, skip_rows: usize) -> Self {
        self.skip_rows = skip_rows;
        self
    }

    pub fn with_parse_dates(mut self, parse_dates: bool) -> Self {
        self.parse_dates = parse_dates;
        self
    }
}

/// In-memory dataset with one inferred kind per column (same order as the frame's columns).
#[derive(Debug, Clone)]
pub struct Table {
    df: DataFrame,
    kinds: Vec<ColumnKind>,
}

impl Table {
    /// Wraps an existing frame, inferring column kinds.
    pub fn new(df: DataFrame) -> Self {
        let kinds = df.get_columns().iter().map(infer_kind).collect();
        Self { df, kinds }
    }

    /// Parses raw uploaded bytes (optionally gzip-compressed) into a table.
    pub fn from_csv_bytes(bytes: &[u8], options: &LoadOptions) -> Result<Self, ParseError> {
        let decompressed;
        let bytes = if bytes.starts_with(&GZIP_MAGIC) {
            let mut out = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut out)?;
            decompressed = out;
            decompressed.as_slice()
        } else {
            bytes
        };

        if bytes.iter().all(|b| b.is_ascii_whitespace()) {
            return Err(ParseError::Empty);
        }
        if let Err(e) = std::str::from_utf8(bytes) {
            return Err(ParseError::Encoding {
                offset: e.valid_up_to(),
            });
        }

        let read_options = CsvReadOptions::default()
            .with_has_header(options.has_header)
            .with_skip_rows(options.skip_rows)
            .map_parse_options(|opts| {
                opts.with_separator(options.delimiter)
                    .with_try_parse_dates(options.parse_dates)
            });
        let df = CsvReader::new(Cursor::new(bytes.to_vec()))
            .with_options(read_options)
            .finish()?;

        if df.width() == 0 {
            return Err(ParseError::NoColumns);
        }
        Ok(Self::new(df))
    }

    pub fn df(&self) -> &DataFrame {
        &self.df
    }

    pub fn height(&self) -> usize {
        self.df.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.df
            .get_column_names()
            .into_iter()
            .map(|n| n.to_string())
            .collect()
    }

    /// Column names paired with their inferred kinds.
    pub fn columns(&self) -> impl Iterator<Item = (&str, ColumnKind)> + '_ {
        self.df
            .get_columns()
            .iter()
            .zip(self.kinds.iter().copied())
            .map(|(c, k)| (c.name().as_str(), k))
    }

    pub fn kind(&self, name: &str) -> Option<ColumnKind> {
        let idx = self.df.get_column_index(name)?;
        self.kinds.get(idx).copied()
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> DataFrame {
        self.df.head(Some(n))
    }

    /// Replaces the column's values with `Datetime[ms]`. Text that fails to parse becomes null.
    /// No-op for non-temporal columns or columns that are already `Datetime[ms]`.
    pub fn coerce_temporal(&mut self, name: &str) -> PolarsResult<()> {
        if self.kind(name) != Some(ColumnKind::Temporal) {
            return Ok(());
        }
        let column = self.df.column(name)?;
        let target = DataType::Datetime(TimeUnit::Milliseconds, None);
        if column.dtype() == &target {
            return Ok(());
        }
        let coerced = match column.dtype() {
            DataType::Date | DataType::Datetime(_, _) => {
                column.as_materialized_series().cast(&target)?
            }
            _ => {
                let text = column.as_materialized_series().cast(&DataType::String)?;
                let millis: Vec<Option<i64>> = text
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(parse_datetime_millis))
                    .collect();
                Series::new(name.into(), millis).cast(&target)?
            }
        };
        self.df.with_column(coerced)?;
        Ok(())
    }
}

/// Classifies a column by dtype; text columns whose every non-null value parses as a
/// date/time are temporal.
pub fn infer_kind(column: &Column) -> ColumnKind {
    match column.dtype() {
        dtype if is_numeric_dtype(dtype) => ColumnKind::Numeric,
        DataType::Date | DataType::Datetime(_, _) => ColumnKind::Temporal,
        DataType::String => {
            let Ok(values) = column.as_materialized_series().str() else {
                return ColumnKind::Categorical;
            };
            let mut seen = false;
            for v in values.into_iter().flatten() {
                if parse_datetime_millis(v).is_none() {
                    return ColumnKind::Categorical;
                }
                seen = true;
            }
            if seen {
                ColumnKind::Temporal
            } else {
                ColumnKind::Categorical
            }
        }
        _ => ColumnKind::Categorical,
    }
}

pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Parses a date or date-time string into milliseconds since the Unix epoch (UTC-naive).
pub fn parse_datetime_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return d
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }
    None
}

/// Converts epoch milliseconds back to a calendar date.
pub fn millis_to_date(ms: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.date_naive())
}
