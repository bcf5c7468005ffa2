use color_eyre::Result;
use polars::prelude::*;
use std::collections::HashMap;

use crate::table::is_numeric_dtype;

/// Row labels of the numeric summary, in display order.
pub const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Row labels of the summary used when a table has no numeric columns.
pub const CATEGORICAL_STATS: [&str; 4] = ["count", "unique", "top", "freq"];

/// Descriptive statistics, one column per described table column.
#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    /// Row labels (`NUMERIC_STATS` or `CATEGORICAL_STATS`).
    pub stats: Vec<&'static str>,
    pub columns: Vec<SummaryColumn>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryColumn {
    pub name: String,
    /// One entry per stat row; `None` where the statistic is undefined (e.g. std of one value).
    pub values: Vec<Option<String>>,
}

pub struct NumericStatistics {
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub q25: Option<f64>,
    pub median: Option<f64>,
    pub q75: Option<f64>,
    pub max: Option<f64>,
}

pub struct CategoricalStatistics {
    pub count: usize,
    pub unique_count: usize,
    /// Most frequent value; ties go to the value seen first.
    pub mode: Option<String>,
    pub mode_freq: usize,
}

/// Describes numeric columns, or every column when there are none.
pub fn compute_summary(df: &DataFrame) -> Result<Summary> {
    let numeric: Vec<&Column> = df
        .get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .collect();

    if !numeric.is_empty() {
        let mut columns = Vec::with_capacity(numeric.len());
        for column in numeric {
            let stats = compute_numeric_stats(column.as_materialized_series())?;
            let values = [
                Some(stats.count as f64),
                stats.mean,
                stats.std,
                stats.min,
                stats.q25,
                stats.median,
                stats.q75,
                stats.max,
            ]
            .into_iter()
            .map(|v| v.map(format_stat))
            .collect();
            columns.push(SummaryColumn {
                name: column.name().to_string(),
                values,
            });
        }
        return Ok(Summary {
            stats: NUMERIC_STATS.to_vec(),
            columns,
        });
    }

    let mut columns = Vec::with_capacity(df.width());
    for column in df.get_columns() {
        let stats = compute_categorical_stats(column.as_materialized_series())?;
        let values = vec![
            Some(stats.count.to_string()),
            Some(stats.unique_count.to_string()),
            stats.mode.clone(),
            stats.mode.as_ref().map(|_| stats.mode_freq.to_string()),
        ];
        columns.push(SummaryColumn {
            name: column.name().to_string(),
            values,
        });
    }
    Ok(Summary {
        stats: CATEGORICAL_STATS.to_vec(),
        columns,
    })
}

fn get_numeric_values_as_f64(series: &Series) -> Result<Vec<f64>> {
    let cast = series.cast(&DataType::Float64)?;
    Ok(cast
        .f64()?
        .into_iter()
        .flatten()
        .filter(|v| !v.is_nan())
        .collect())
}

pub fn compute_numeric_stats(series: &Series) -> Result<NumericStatistics> {
    let mut values = get_numeric_values_as_f64(series)?;
    let count = values.len();
    let clean = Series::new(series.name().clone(), values.as_slice());
    let mean = clean.mean();
    let std = if count > 1 { clean.std(1) } else { None }; // Sample std (ddof=1)

    // Sorted copy only feeds the quantiles
    values.sort_by(|a, b| a.total_cmp(b));

    Ok(NumericStatistics {
        count,
        mean,
        std,
        min: values.first().copied(),
        q25: quantile(&values, 0.25),
        median: quantile(&values, 0.5),
        q75: quantile(&values, 0.75),
        max: values.last().copied(),
    })
}

/// Linear-interpolated quantile of already sorted values.
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

pub fn compute_categorical_stats(series: &Series) -> Result<CategoricalStatistics> {
    let text = series.cast(&DataType::String)?;
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();
    let mut count = 0;
    for v in text.str()?.into_iter().flatten() {
        count += 1;
        let entry = counts.entry(v).or_insert(0);
        if *entry == 0 {
            order.push(v);
        }
        *entry += 1;
    }

    let mut mode: Option<&str> = None;
    let mut mode_freq = 0;
    for &v in &order {
        let c = counts[v];
        if c > mode_freq {
            mode = Some(v);
            mode_freq = c;
        }
    }

    Ok(CategoricalStatistics {
        count,
        unique_count: order.len(),
        mode: mode.map(str::to_string),
        mode_freq,
    })
}

/// Formats a statistic the way a summary table shows it (six significant decimals at most).
pub fn format_stat(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        return format!("{:.1}", v);
    }
    let s = format!("{:.6}", v);
    let s = s.trim_end_matches('0');
    s.strip_suffix('.').unwrap_or(s).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_summary_matches_describe() {
        let df = df!(
            "a" => &[1.0_f64, 2.0, 3.0, 4.0],
            "label" => &["x", "y", "x", "z"]
        )
        .unwrap();
        let summary = compute_summary(&df).unwrap();
        assert_eq!(summary.stats, NUMERIC_STATS.to_vec());
        assert_eq!(summary.columns.len(), 1);
        let a = &summary.columns[0];
        assert_eq!(a.name, "a");
        let shown: Vec<&str> = a.values.iter().map(|v| v.as_deref().unwrap()).collect();
        assert_eq!(
            shown,
            vec!["4.0", "2.5", "1.290994", "1.0", "1.75", "2.5", "3.25", "4.0"]
        );
    }

    #[test]
    fn single_value_has_no_std() {
        let df = df!("a" => &[5_i64]).unwrap();
        let summary = compute_summary(&df).unwrap();
        assert_eq!(summary.columns[0].values[2], None);
        assert_eq!(summary.columns[0].values[5], Some("5.0".to_string()));
    }

    #[test]
    fn nulls_are_excluded_from_count() {
        let df = df!("a" => &[Some(1_i64), None, Some(3)]).unwrap();
        let stats = compute_numeric_stats(df.column("a").unwrap().as_materialized_series()).unwrap();
        assert_eq!(stats.count, 2);
        assert_eq!(stats.mean, Some(2.0));
    }

    #[test]
    fn nan_is_excluded_from_mean_and_std() {
        let df = df!("a" => &[Some(1.0_f64), Some(f64::NAN), None, Some(3.0), Some(5.0)]).unwrap();
        let stats = compute_numeric_stats(df.column("a").unwrap().as_materialized_series()).unwrap();
        assert_eq!(stats.count, 3);
        assert_eq!(stats.mean, Some(3.0));
        assert!((stats.std.unwrap() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn text_only_table_uses_categorical_summary() {
        let df = df!("city" => &[Some("Oslo"), Some("Rome"), Some("Oslo"), None]).unwrap();
        let summary = compute_summary(&df).unwrap();
        assert_eq!(summary.stats, CATEGORICAL_STATS.to_vec());
        assert_eq!(
            summary.columns[0].values,
            vec![
                Some("3".to_string()),
                Some("2".to_string()),
                Some("Oslo".to_string()),
                Some("2".to_string())
            ]
        );
    }

    #[test]
    fn quantile_interpolates() {
        let v = [0.0, 10.0];
        assert_eq!(quantile(&v, 0.25), Some(2.5));
        assert_eq!(quantile(&[], 0.5), None);
        assert_eq!(quantile(&[7.0], 0.75), Some(7.0));
    }
}
