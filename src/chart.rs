//! Chart dispatch: turns a (x, y, kind) request over the filtered subset into a plotted data model.

use chrono::{DateTime, Timelike};
use polars::datatypes::{DataType, TimeUnit};
use polars::prelude::*;
use std::collections::HashMap;

use crate::error::ChartConstructionError;
use crate::filter::format_number;
use crate::statistics::quantile;
use crate::table::{infer_kind, is_numeric_dtype};

/// Chart kinds offered by the plot controls.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    #[default]
    Line,
    Bar,
    Scatter,
    Histogram,
    Box,
    Pie,
}

impl ChartKind {
    pub const ALL: [Self; 6] = [
        Self::Line,
        Self::Bar,
        Self::Scatter,
        Self::Histogram,
        Self::Box,
        Self::Pie,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Line => "Line",
            Self::Bar => "Bar",
            Self::Scatter => "Scatter",
            Self::Histogram => "Histogram",
            Self::Box => "Box",
            Self::Pie => "Pie",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Self::Line => "Line Chart",
            Self::Bar => "Bar Chart",
            Self::Scatter => "Scatter Plot",
            Self::Histogram => "Histogram",
            Self::Box => "Box Plot",
            Self::Pie => "Pie Chart",
        }
    }

    /// Whether the x column takes part in the chart (Histogram and Box only use y).
    pub fn uses_x(self) -> bool {
        !matches!(self, Self::Histogram | Self::Box)
    }

    pub fn next(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        let idx = Self::ALL.iter().position(|k| *k == self).unwrap_or(0);
        Self::ALL[(idx + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

/// Explicit request to draw a chart. A new request replaces the previous chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartRequest {
    pub x_column: String,
    pub y_column: String,
    pub kind: ChartKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChartOptions {
    /// Fixed histogram bin count; `None` uses Sturges' rule.
    pub histogram_bins: Option<usize>,
}

/// How x values map to axis labels.
#[derive(Debug, Clone, PartialEq)]
pub enum XAxis {
    Numeric,
    /// x = milliseconds since the Unix epoch.
    Temporal,
    /// x = index into the labels, in first-seen order.
    Categorical(Vec<String>),
}

impl XAxis {
    pub fn format(&self, v: f64) -> String {
        match self {
            Self::Numeric => format_number(v),
            Self::Temporal => format_millis(v),
            Self::Categorical(labels) => {
                let idx = v.round();
                if idx >= 0.0 && (idx as usize) < labels.len() && (v - idx).abs() < 1e-9 {
                    labels[idx as usize].clone()
                } else {
                    String::new()
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub start: f64,
    pub end: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BoxStats {
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
    /// Most extreme values within 1.5·IQR of the quartiles.
    pub lower_whisker: f64,
    pub upper_whisker: f64,
    pub outliers: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PieSlice {
    pub label: String,
    pub value: f64,
    /// Share of the total, in `[0, 1]`.
    pub fraction: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChartData {
    /// Line, Bar and Scatter: (x, y) pairs in data order.
    Points {
        points: Vec<(f64, f64)>,
        x_axis: XAxis,
    },
    Histogram(Vec<HistogramBin>),
    Box(BoxStats),
    Pie(Vec<PieSlice>),
}

/// A constructed chart, ready to be drawn on the terminal or exported.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartArtifact {
    pub kind: ChartKind,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub data: ChartData,
}

impl ChartArtifact {
    /// Data-space bounds `(x_min, x_max, y_min, y_max)` for cartesian kinds, padded so that
    /// degenerate ranges still have extent. `None` for Pie.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let (x_min, x_max, y_min, y_max) = match &self.data {
            ChartData::Points { points, x_axis } => {
                let (mut x_min, mut x_max) = min_max(points.iter().map(|p| p.0))?;
                let (mut y_min, mut y_max) = min_max(points.iter().map(|p| p.1))?;
                if matches!(x_axis, XAxis::Categorical(_)) {
                    x_min -= 0.5;
                    x_max += 0.5;
                }
                if self.kind == ChartKind::Bar {
                    y_min = y_min.min(0.0);
                    y_max = y_max.max(0.0);
                }
                (x_min, x_max, y_min, y_max)
            }
            ChartData::Histogram(bins) => {
                let first = bins.first()?;
                let last = bins.last()?;
                let top = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64;
                (first.start, last.end, 0.0, top)
            }
            ChartData::Box(stats) => (-0.5, 0.5, stats.min, stats.max),
            ChartData::Pie(_) => return None,
        };
        let (x_min, x_max) = pad_range(x_min, x_max);
        let (y_min, y_max) = pad_range(y_min, y_max);
        Some((x_min, x_max, y_min, y_max))
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

fn pad_range(lo: f64, hi: f64) -> (f64, f64) {
    if hi > lo {
        (lo, hi)
    } else if lo == 0.0 {
        (-1.0, 1.0)
    } else {
        let pad = lo.abs() * 0.1;
        (lo - pad, hi + pad)
    }
}

/// Formats epoch milliseconds as a date, or date and time when not at midnight.
pub fn format_millis(v: f64) -> String {
    match DateTime::from_timestamp_millis(v as i64) {
        Some(dt) => {
            let naive = dt.naive_utc();
            if naive.num_seconds_from_midnight() == 0 {
                naive.date().to_string()
            } else {
                naive.format("%Y-%m-%d %H:%M").to_string()
            }
        }
        None => format_number(v),
    }
}

/// Builds the chart for `request` over `df`.
pub fn build_chart(
    df: &DataFrame,
    request: &ChartRequest,
    options: &ChartOptions,
) -> Result<ChartArtifact, ChartConstructionError> {
    for name in [&request.x_column, &request.y_column] {
        if df.get_column_index(name).is_none() {
            return Err(ChartConstructionError::UnknownColumn(name.clone()));
        }
    }

    let data = match request.kind {
        ChartKind::Line | ChartKind::Scatter => xy_chart(df, request, false)?,
        ChartKind::Bar => xy_chart(df, request, true)?,
        ChartKind::Histogram => histogram(df, request, options)?,
        ChartKind::Box => box_plot(df, request)?,
        ChartKind::Pie => pie_chart(df, request)?,
    };

    let x_label = match request.kind {
        ChartKind::Histogram => request.y_column.clone(),
        ChartKind::Box => String::new(),
        _ => request.x_column.clone(),
    };
    let y_label = match request.kind {
        ChartKind::Histogram => "count".to_string(),
        _ => request.y_column.clone(),
    };

    tracing::debug!(
        kind = request.kind.as_str(),
        x = %request.x_column,
        y = %request.y_column,
        "built chart"
    );

    Ok(ChartArtifact {
        kind: request.kind,
        title: request.kind.title().to_string(),
        x_label,
        y_label,
        data,
    })
}

/// Numeric y values (nulls and NaN kept as `None`) or an error naming the offending column.
fn numeric_y(
    df: &DataFrame,
    request: &ChartRequest,
) -> Result<Vec<Option<f64>>, ChartConstructionError> {
    let column = df.column(&request.y_column)?;
    if !is_numeric_dtype(column.dtype()) {
        return Err(ChartConstructionError::NonNumeric {
            kind: request.kind.as_str(),
            column: request.y_column.clone(),
            found: infer_kind(column).as_str(),
        });
    }
    let values = column.as_materialized_series().cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| x.is_finite()))
        .collect())
}

fn x_values(
    df: &DataFrame,
    name: &str,
) -> Result<(Vec<Option<f64>>, XAxis), ChartConstructionError> {
    let series = df.column(name)?.as_materialized_series();
    match series.dtype() {
        dtype if is_numeric_dtype(dtype) => {
            let values = series.cast(&DataType::Float64)?;
            Ok((
                values
                    .f64()?
                    .into_iter()
                    .map(|v| v.filter(|x| x.is_finite()))
                    .collect(),
                XAxis::Numeric,
            ))
        }
        DataType::Date | DataType::Datetime(_, _) => {
            let millis = series
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                .cast(&DataType::Int64)?;
            Ok((
                millis.i64()?.into_iter().map(|v| v.map(|ms| ms as f64)).collect(),
                XAxis::Temporal,
            ))
        }
        _ => {
            let (codes, labels) = category_codes(series)?;
            Ok((
                codes.into_iter().map(|c| c.map(|i| i as f64)).collect(),
                XAxis::Categorical(labels),
            ))
        }
    }
}

/// Per-row category index plus labels in first-seen order.
fn category_codes(series: &Series) -> PolarsResult<(Vec<Option<usize>>, Vec<String>)> {
    let text = series.cast(&DataType::String)?;
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut labels = Vec::new();
    let mut codes = Vec::with_capacity(text.len());
    for v in text.str()?.into_iter() {
        codes.push(v.map(|s| {
            *index.entry(s.to_string()).or_insert_with(|| {
                labels.push(s.to_string());
                labels.len() - 1
            })
        }));
    }
    Ok((codes, labels))
}

fn xy_chart(
    df: &DataFrame,
    request: &ChartRequest,
    sum_per_x: bool,
) -> Result<ChartData, ChartConstructionError> {
    let ys = numeric_y(df, request)?;
    let (xs, x_axis) = x_values(df, &request.x_column)?;
    let pairs = xs
        .into_iter()
        .zip(ys)
        .filter_map(|(x, y)| Some((x?, y?)));

    let mut points: Vec<(f64, f64)> = if sum_per_x {
        // Bars sharing an x stack, so their heights add up.
        let mut order: Vec<f64> = Vec::new();
        let mut sums: HashMap<u64, f64> = HashMap::new();
        for (x, y) in pairs {
            let entry = sums.entry(x.to_bits()).or_insert_with(|| {
                order.push(x);
                0.0
            });
            *entry += y;
        }
        order.into_iter().map(|x| (x, sums[&x.to_bits()])).collect()
    } else {
        pairs.collect()
    };

    if points.is_empty() {
        return Err(ChartConstructionError::NoData(request.y_column.clone()));
    }
    if request.kind == ChartKind::Line && !matches!(x_axis, XAxis::Categorical(_)) {
        points.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    Ok(ChartData::Points { points, x_axis })
}

fn sorted_finite_y(
    df: &DataFrame,
    request: &ChartRequest,
) -> Result<Vec<f64>, ChartConstructionError> {
    let mut values: Vec<f64> = numeric_y(df, request)?.into_iter().flatten().collect();
    if values.is_empty() {
        return Err(ChartConstructionError::NoData(request.y_column.clone()));
    }
    values.sort_by(|a, b| a.total_cmp(b));
    Ok(values)
}

fn histogram(
    df: &DataFrame,
    request: &ChartRequest,
    options: &ChartOptions,
) -> Result<ChartData, ChartConstructionError> {
    let values = sorted_finite_y(df, request)?;
    let n = values.len();
    let min = values[0];
    let max = values[n - 1];

    if max <= min {
        return Ok(ChartData::Histogram(vec![HistogramBin {
            start: min - 0.5,
            end: max + 0.5,
            count: n,
        }]));
    }

    let bins = options
        .histogram_bins
        .filter(|b| *b > 0)
        .unwrap_or_else(|| sturges_bins(n));
    let width = (max - min) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in &values {
        let idx = (((v - min) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }
    Ok(ChartData::Histogram(
        counts
            .into_iter()
            .enumerate()
            .map(|(i, count)| HistogramBin {
                start: min + width * i as f64,
                end: min + width * (i + 1) as f64,
                count,
            })
            .collect(),
    ))
}

fn sturges_bins(n: usize) -> usize {
    ((n as f64).log2().ceil() as usize + 1).max(1)
}

fn box_plot(df: &DataFrame, request: &ChartRequest) -> Result<ChartData, ChartConstructionError> {
    let values = sorted_finite_y(df, request)?;
    let q = |p: f64| quantile(&values, p).unwrap_or(f64::NAN);
    let (q1, median, q3) = (q(0.25), q(0.5), q(0.75));
    let iqr = q3 - q1;
    let lower_fence = q1 - 1.5 * iqr;
    let upper_fence = q3 + 1.5 * iqr;

    let inside = values
        .iter()
        .copied()
        .filter(|v| *v >= lower_fence && *v <= upper_fence);
    let (lower_whisker, upper_whisker) = min_max(inside).unwrap_or((q1, q3));
    let outliers = values
        .iter()
        .copied()
        .filter(|v| *v < lower_fence || *v > upper_fence)
        .collect();

    Ok(ChartData::Box(BoxStats {
        count: values.len(),
        min: values[0],
        q1,
        median,
        q3,
        max: values[values.len() - 1],
        lower_whisker,
        upper_whisker,
        outliers,
    }))
}

fn pie_chart(df: &DataFrame, request: &ChartRequest) -> Result<ChartData, ChartConstructionError> {
    let ys = numeric_y(df, request)?;
    let names = df
        .column(&request.x_column)?
        .as_materialized_series()
        .cast(&DataType::String)?;

    let mut order: Vec<String> = Vec::new();
    let mut sums: HashMap<String, f64> = HashMap::new();
    for (name, value) in names.str()?.into_iter().zip(ys) {
        let (Some(name), Some(value)) = (name, value) else {
            continue;
        };
        if value < 0.0 {
            return Err(ChartConstructionError::NegativePieValue {
                column: request.y_column.clone(),
                value,
            });
        }
        let entry = sums.entry(name.to_string()).or_insert_with(|| {
            order.push(name.to_string());
            0.0
        });
        *entry += value;
    }

    let total: f64 = sums.values().sum();
    if total <= 0.0 {
        return Err(ChartConstructionError::NoData(request.y_column.clone()));
    }
    Ok(ChartData::Pie(
        order
            .into_iter()
            .map(|label| {
                let value = sums[&label];
                PieSlice {
                    label,
                    value,
                    fraction: value / total,
                }
            })
            .collect(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(x: &str, y: &str, kind: ChartKind) -> ChartRequest {
        ChartRequest {
            x_column: x.to_string(),
            y_column: y.to_string(),
            kind,
        }
    }

    fn sales() -> DataFrame {
        df!(
            "category" => &["A", "B", "C"],
            "amount" => &[10_i64, 20, 30]
        )
        .unwrap()
    }

    #[test]
    fn pie_slices_are_proportional() {
        let chart = build_chart(
            &sales(),
            &request("category", "amount", ChartKind::Pie),
            &ChartOptions::default(),
        )
        .unwrap();
        let ChartData::Pie(slices) = chart.data else {
            panic!("expected pie data");
        };
        assert_eq!(slices.len(), 3);
        let labels: Vec<&str> = slices.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(labels, vec!["A", "B", "C"]);
        assert!((slices[0].fraction - 1.0 / 6.0).abs() < 1e-12);
        assert!((slices[1].fraction - 2.0 / 6.0).abs() < 1e-12);
        assert!((slices[2].fraction - 3.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn pie_sums_repeated_categories() {
        let df = df!("k" => &["A", "B", "A"], "v" => &[1.0_f64, 2.0, 3.0]).unwrap();
        let chart = build_chart(&df, &request("k", "v", ChartKind::Pie), &ChartOptions::default())
            .unwrap();
        let ChartData::Pie(slices) = chart.data else {
            panic!("expected pie data");
        };
        assert_eq!(slices.len(), 2);
        assert_eq!(slices[0].value, 4.0);
    }

    #[test]
    fn pie_rejects_negative_values() {
        let df = df!("k" => &["A", "B"], "v" => &[1.0_f64, -2.0]).unwrap();
        let err = build_chart(&df, &request("k", "v", ChartKind::Pie), &ChartOptions::default())
            .unwrap_err();
        assert!(matches!(err, ChartConstructionError::NegativePieValue { .. }));
    }

    #[test]
    fn histogram_and_box_need_numeric_y() {
        for kind in [ChartKind::Histogram, ChartKind::Box] {
            let err = build_chart(
                &sales(),
                &request("amount", "category", kind),
                &ChartOptions::default(),
            )
            .unwrap_err();
            assert!(
                matches!(err, ChartConstructionError::NonNumeric { found: "categorical", .. }),
                "{kind:?}: {err}"
            );
        }
    }

    #[test]
    fn unknown_column_is_error() {
        let err = build_chart(
            &sales(),
            &request("nope", "amount", ChartKind::Line),
            &ChartOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ChartConstructionError::UnknownColumn(c) if c == "nope"));
    }

    #[test]
    fn line_with_categorical_x_uses_category_axis() {
        let chart = build_chart(
            &sales(),
            &request("category", "amount", ChartKind::Line),
            &ChartOptions::default(),
        )
        .unwrap();
        assert_eq!(chart.title, "Line Chart");
        let ChartData::Points { points, x_axis } = chart.data else {
            panic!("expected points");
        };
        assert_eq!(points, vec![(0.0, 10.0), (1.0, 20.0), (2.0, 30.0)]);
        assert_eq!(x_axis.format(1.0), "B");
        assert_eq!(x_axis.format(0.5), "");
    }

    #[test]
    fn scatter_drops_rows_with_missing_values() {
        let df = df!(
            "x" => &[Some(1.0_f64), None, Some(3.0), Some(4.0)],
            "y" => &[Some(10.0_f64), Some(20.0), None, Some(f64::NAN)]
        )
        .unwrap();
        let chart = build_chart(&df, &request("x", "y", ChartKind::Scatter), &ChartOptions::default())
            .unwrap();
        let ChartData::Points { points, .. } = chart.data else {
            panic!("expected points");
        };
        assert_eq!(points, vec![(1.0, 10.0)]);
    }

    #[test]
    fn line_points_follow_x_order() {
        let df = df!("x" => &[3.0_f64, 1.0, 2.0], "y" => &[30.0_f64, 10.0, 20.0]).unwrap();
        let chart = build_chart(&df, &request("x", "y", ChartKind::Line), &ChartOptions::default())
            .unwrap();
        let ChartData::Points { points, .. } = chart.data else {
            panic!("expected points");
        };
        assert_eq!(points, vec![(1.0, 10.0), (2.0, 20.0), (3.0, 30.0)]);
    }

    #[test]
    fn bar_sums_values_per_x() {
        let df = df!("x" => &["a", "b", "a"], "y" => &[1_i64, 2, 3]).unwrap();
        let chart = build_chart(&df, &request("x", "y", ChartKind::Bar), &ChartOptions::default())
            .unwrap();
        let ChartData::Points { points, .. } = chart.data else {
            panic!("expected points");
        };
        assert_eq!(points, vec![(0.0, 4.0), (1.0, 2.0)]);
    }

    #[test]
    fn histogram_counts_every_value() {
        let df = df!("v" => (0..100).map(|i| i as f64).collect::<Vec<_>>()).unwrap();
        let chart = build_chart(
            &df,
            &request("v", "v", ChartKind::Histogram),
            &ChartOptions {
                histogram_bins: Some(10),
            },
        )
        .unwrap();
        assert_eq!(chart.x_label, "v");
        assert_eq!(chart.y_label, "count");
        let ChartData::Histogram(bins) = chart.data else {
            panic!("expected histogram");
        };
        assert_eq!(bins.len(), 10);
        assert_eq!(bins.iter().map(|b| b.count).sum::<usize>(), 100);
        assert!(bins.iter().all(|b| b.count == 10));
    }

    #[test]
    fn histogram_of_constant_column_has_one_bin() {
        let df = df!("v" => &[2.0_f64, 2.0, 2.0]).unwrap();
        let chart = build_chart(&df, &request("v", "v", ChartKind::Histogram), &ChartOptions::default())
            .unwrap();
        assert_eq!(
            chart.data,
            ChartData::Histogram(vec![HistogramBin {
                start: 1.5,
                end: 2.5,
                count: 3
            }])
        );
    }

    #[test]
    fn box_plot_flags_outliers() {
        let df = df!("v" => &[1.0_f64, 2.0, 3.0, 4.0, 5.0, 100.0]).unwrap();
        let chart = build_chart(&df, &request("v", "v", ChartKind::Box), &ChartOptions::default())
            .unwrap();
        let ChartData::Box(stats) = chart.data else {
            panic!("expected box stats");
        };
        assert_eq!(stats.count, 6);
        assert_eq!(stats.median, 3.5);
        assert_eq!(stats.outliers, vec![100.0]);
        assert_eq!(stats.upper_whisker, 5.0);
        assert_eq!(stats.lower_whisker, 1.0);
    }

    #[test]
    fn empty_subset_is_no_data() {
        let df = sales().head(Some(0));
        let err = build_chart(&df, &request("category", "amount", ChartKind::Bar), &ChartOptions::default())
            .unwrap_err();
        assert!(matches!(err, ChartConstructionError::NoData(_)));
    }

    #[test]
    fn kind_cycles() {
        assert_eq!(ChartKind::Pie.next(), ChartKind::Line);
        assert_eq!(ChartKind::Line.prev(), ChartKind::Pie);
        assert!(!ChartKind::Box.uses_x());
    }

    #[test]
    fn temporal_labels() {
        assert_eq!(format_millis(0.0), "1970-01-01");
        assert_eq!(format_millis(90_000_000.0), "1970-01-02 01:00");
    }
}
