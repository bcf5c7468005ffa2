//! Per-column filter controls and the AND-combined predicate that yields the filtered subset.

use chrono::{Days, NaiveDate};
use polars::datatypes::{DataType, TimeUnit};
use polars::prelude::*;
use std::collections::HashSet;

use crate::error::FilterError;
use crate::table::{millis_to_date, ColumnKind, Table};

/// Selection state of one control. Bounds are `None` when the column has no non-null values.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterState {
    Numeric {
        bounds: Option<(f64, f64)>,
        selected: Option<(f64, f64)>,
    },
    Temporal {
        bounds: Option<(NaiveDate, NaiveDate)>,
        selected: Option<(NaiveDate, NaiveDate)>,
    },
    /// An empty selection means no restriction, not "select nothing".
    Categorical {
        options: Vec<String>,
        selected: Vec<String>,
    },
}

/// A filter control bound to one column.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterControl {
    pub column: String,
    pub state: FilterState,
}

/// A user interaction with a control.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterSelection {
    Range(f64, f64),
    DateRange(NaiveDate, NaiveDate),
    Values(Vec<String>),
    Reset,
}

/// Boolean condition over one column.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterPredicate {
    Identity,
    /// Inclusive at both ends.
    NumericRange { column: String, lo: f64, hi: f64 },
    /// Inclusive whole days: `start 00:00 <= v < (end + 1 day) 00:00`.
    DateRange {
        column: String,
        start: NaiveDate,
        end: NaiveDate,
    },
    Membership { column: String, values: Vec<String> },
}

/// Builds one control per column, in column order. Temporal columns are coerced to
/// `Datetime[ms]` in the table as a side effect.
pub fn build_filter_controls(table: &mut Table) -> PolarsResult<Vec<FilterControl>> {
    let columns: Vec<(String, ColumnKind)> = table
        .columns()
        .map(|(name, kind)| (name.to_string(), kind))
        .collect();

    let mut controls = Vec::with_capacity(columns.len());
    for (name, kind) in columns {
        let control = match kind {
            ColumnKind::Numeric => numeric_control(table, &name)?,
            ColumnKind::Temporal => temporal_control(table, &name)?,
            ColumnKind::Categorical => categorical_control(table, &name)?,
        };
        controls.push(control);
    }
    Ok(controls)
}

fn numeric_control(table: &Table, name: &str) -> PolarsResult<FilterControl> {
    let values = table
        .df()
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Float64)?;
    let values = values.f64()?;
    let bounds = match (values.min(), values.max()) {
        (Some(lo), Some(hi)) if lo.is_finite() && hi.is_finite() => Some((lo, hi)),
        _ => None,
    };
    Ok(FilterControl {
        column: name.to_string(),
        state: FilterState::Numeric {
            bounds,
            selected: None,
        },
    })
}

fn temporal_control(table: &mut Table, name: &str) -> PolarsResult<FilterControl> {
    table.coerce_temporal(name)?;
    let millis = table
        .df()
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::Int64)?;
    let millis = millis.i64()?;
    let bounds = match (
        millis.min().and_then(millis_to_date),
        millis.max().and_then(millis_to_date),
    ) {
        (Some(lo), Some(hi)) => Some((lo, hi)),
        _ => None,
    };
    Ok(FilterControl {
        column: name.to_string(),
        state: FilterState::Temporal {
            bounds,
            selected: None,
        },
    })
}

fn categorical_control(table: &Table, name: &str) -> PolarsResult<FilterControl> {
    let text = table
        .df()
        .column(name)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let mut seen = HashSet::new();
    let mut options = Vec::new();
    for v in text.str()?.into_iter().flatten() {
        if seen.insert(v) {
            options.push(v.to_string());
        }
    }
    Ok(FilterControl {
        column: name.to_string(),
        state: FilterState::Categorical {
            options,
            selected: Vec::new(),
        },
    })
}

impl FilterControl {
    pub fn kind(&self) -> ColumnKind {
        match self.state {
            FilterState::Numeric { .. } => ColumnKind::Numeric,
            FilterState::Temporal { .. } => ColumnKind::Temporal,
            FilterState::Categorical { .. } => ColumnKind::Categorical,
        }
    }

    /// Applies a selection. Ranges are reordered and clamped into the column bounds; a range
    /// equal to the bounds is stored as "no selection".
    pub fn select(&mut self, selection: FilterSelection) -> Result<(), FilterError> {
        let column = self.column.clone();
        match (&mut self.state, selection) {
            (FilterState::Numeric { selected, .. }, FilterSelection::Reset)
            | (
                FilterState::Numeric {
                    bounds: None,
                    selected,
                },
                FilterSelection::Range(..),
            ) => *selected = None,
            (
                FilterState::Numeric {
                    bounds: Some((min, max)),
                    selected,
                },
                FilterSelection::Range(a, b),
            ) => {
                let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
                let lo = lo.clamp(*min, *max);
                let hi = hi.clamp(*min, *max);
                *selected = if lo == *min && hi == *max {
                    None
                } else {
                    Some((lo, hi))
                };
            }
            (FilterState::Temporal { selected, .. }, FilterSelection::Reset)
            | (
                FilterState::Temporal {
                    bounds: None,
                    selected,
                },
                FilterSelection::DateRange(..),
            ) => *selected = None,
            (
                FilterState::Temporal {
                    bounds: Some((min, max)),
                    selected,
                },
                FilterSelection::DateRange(a, b),
            ) => {
                let (start, end) = if a <= b { (a, b) } else { (b, a) };
                let start = start.clamp(*min, *max);
                let end = end.clamp(*min, *max);
                *selected = if start == *min && end == *max {
                    None
                } else {
                    Some((start, end))
                };
            }
            (FilterState::Categorical { selected, .. }, FilterSelection::Reset) => {
                selected.clear()
            }
            (FilterState::Categorical { options, selected }, FilterSelection::Values(values)) => {
                let mut chosen: Vec<String> = Vec::with_capacity(values.len());
                for value in values {
                    if !options.contains(&value) {
                        return Err(FilterError::UnknownValue { column, value });
                    }
                    if !chosen.contains(&value) {
                        chosen.push(value);
                    }
                }
                *selected = chosen;
            }
            (state, _) => {
                let expected = match state {
                    FilterState::Numeric { .. } => "numeric range",
                    FilterState::Temporal { .. } => "date range",
                    FilterState::Categorical { .. } => "set of values",
                };
                return Err(FilterError::KindMismatch { column, expected });
            }
        }
        Ok(())
    }

    /// Adds or removes one categorical value. No-op for range controls.
    pub fn toggle_value(&mut self, value: &str) {
        if let FilterState::Categorical { options, selected } = &mut self.state {
            if let Some(pos) = selected.iter().position(|v| v == value) {
                selected.remove(pos);
            } else if options.iter().any(|o| o == value) {
                selected.push(value.to_string());
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.predicate() != FilterPredicate::Identity
    }

    /// The predicate this control currently contributes.
    pub fn predicate(&self) -> FilterPredicate {
        match &self.state {
            FilterState::Numeric {
                selected: Some((lo, hi)),
                ..
            } => FilterPredicate::NumericRange {
                column: self.column.clone(),
                lo: *lo,
                hi: *hi,
            },
            FilterState::Temporal {
                selected: Some((start, end)),
                ..
            } => FilterPredicate::DateRange {
                column: self.column.clone(),
                start: *start,
                end: *end,
            },
            FilterState::Categorical { selected, .. } if !selected.is_empty() => {
                FilterPredicate::Membership {
                    column: self.column.clone(),
                    values: selected.clone(),
                }
            }
            _ => FilterPredicate::Identity,
        }
    }

    /// Short human-readable description of the current selection.
    pub fn summary(&self) -> String {
        match &self.state {
            FilterState::Numeric { bounds: None, .. } | FilterState::Temporal { bounds: None, .. } => {
                "no values".to_string()
            }
            FilterState::Numeric {
                bounds: Some((min, max)),
                selected,
            } => {
                let (lo, hi) = selected.unwrap_or((*min, *max));
                format!("{} – {}", format_number(lo), format_number(hi))
            }
            FilterState::Temporal {
                bounds: Some((min, max)),
                selected,
            } => {
                let (start, end) = selected.unwrap_or((*min, *max));
                format!("{} – {}", start, end)
            }
            FilterState::Categorical { selected, .. } if selected.is_empty() => "any".to_string(),
            FilterState::Categorical { selected, .. } => {
                let shown: Vec<&str> = selected.iter().take(2).map(String::as_str).collect();
                if selected.len() > 2 {
                    format!("{} (+{})", shown.join(", "), selected.len() - 2)
                } else {
                    shown.join(", ")
                }
            }
        }
    }
}

impl FilterPredicate {
    /// Polars expression for the predicate; `None` for the identity.
    pub fn to_expr(&self) -> Option<Expr> {
        match self {
            Self::Identity => None,
            Self::NumericRange { column, lo, hi } => {
                let v = col(column.as_str()).cast(DataType::Float64);
                Some(v.clone().gt_eq(lit(*lo)).and(v.lt_eq(lit(*hi))))
            }
            Self::DateRange { column, start, end } => {
                let ms = col(column.as_str())
                    .cast(DataType::Datetime(TimeUnit::Milliseconds, None))
                    .cast(DataType::Int64);
                let start_ms = day_start_millis(*start);
                let end_ms = end
                    .checked_add_days(Days::new(1))
                    .map(day_start_millis)
                    .unwrap_or(i64::MAX);
                Some(ms.clone().gt_eq(lit(start_ms)).and(ms.lt(lit(end_ms))))
            }
            Self::Membership { column, values } => values
                .iter()
                .map(|v| col(column.as_str()).cast(DataType::String).eq(lit(v.as_str())))
                .reduce(|acc, e| acc.or(e)),
        }
    }
}

fn day_start_millis(d: NaiveDate) -> i64 {
    d.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp_millis())
        .unwrap_or_default()
}

/// Restricts `df` to rows satisfying every predicate (logical AND).
pub fn apply_filters(df: &DataFrame, predicates: &[FilterPredicate]) -> PolarsResult<DataFrame> {
    let combined = predicates
        .iter()
        .filter_map(FilterPredicate::to_expr)
        .reduce(|acc, e| acc.and(e));
    match combined {
        Some(expr) => df.clone().lazy().filter(expr).collect(),
        None => Ok(df.clone()),
    }
}

/// Filtered subset for a set of controls.
pub fn filtered_subset(df: &DataFrame, controls: &[FilterControl]) -> PolarsResult<DataFrame> {
    let predicates: Vec<FilterPredicate> = controls.iter().map(FilterControl::predicate).collect();
    apply_filters(df, &predicates)
}

pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{:.0}", v)
    } else {
        format!("{}", v)
    }
}
