//! Session state: the loaded table, its filter controls, the filtered subset with its CSV
//! download, the chart controls and the outcome of the last chart request.
//!
//! Every mutation recomputes the filtered subset from scratch; any change to a control also
//! discards the rendered chart so that a chart on screen always matches the current controls.

use color_eyre::eyre::eyre;
use color_eyre::Result;
use polars::prelude::*;
use std::path::{Path, PathBuf};

use crate::chart::{build_chart, ChartArtifact, ChartKind, ChartOptions, ChartRequest};
use crate::chart_export::{render_chart, ChartExports, DEFAULT_EXPORT_SIZE};
use crate::config::AppConfig;
use crate::error::{ChartConstructionError, FilterError, ParseError};
use crate::export::{filtered_data_download, Download};
use crate::filter::{build_filter_controls, filtered_subset, FilterControl, FilterSelection};
use crate::statistics::{compute_summary, Summary};
use crate::table::{ColumnKind, LoadOptions, Table};
use crate::Args;

/// Settings resolved from defaults, the config file and the command line.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub load: LoadOptions,
    pub preview_rows: usize,
    pub export_dir: PathBuf,
    pub chart: ChartOptions,
    pub export_size: (u32, u32),
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            load: LoadOptions::default(),
            preview_rows: 5,
            export_dir: PathBuf::from("."),
            chart: ChartOptions::default(),
            export_size: DEFAULT_EXPORT_SIZE,
        }
    }
}

impl SessionSettings {
    /// CLI arguments override config values, which override defaults.
    pub fn from_args_and_config(args: &Args, config: &AppConfig) -> Self {
        let mut load = LoadOptions::default();
        if let Some(delimiter) = args.delimiter.or(config.file_loading.delimiter) {
            load = load.with_delimiter(delimiter);
        }
        if args.no_header {
            load = load.with_has_header(false);
        } else if let Some(has_header) = config.file_loading.has_header {
            load = load.with_has_header(has_header);
        }
        if let Some(skip_rows) = args.skip_rows.or(config.file_loading.skip_rows) {
            load = load.with_skip_rows(skip_rows);
        }
        if let Some(parse_dates) = config.file_loading.parse_dates {
            load = load.with_parse_dates(parse_dates);
        }

        Self {
            load,
            preview_rows: args.preview_rows.unwrap_or(config.display.preview_rows),
            export_dir: args
                .export_dir
                .clone()
                .or_else(|| config.export.directory.clone())
                .unwrap_or_else(|| PathBuf::from(".")),
            chart: ChartOptions {
                histogram_bins: config.chart.histogram_bins,
            },
            export_size: (config.chart.width, config.chart.height),
        }
    }
}

/// Current x/y/kind selection of the plot controls.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChartControls {
    pub x: Option<String>,
    pub y: Option<String>,
    pub kind: ChartKind,
}

/// The three downloads a session can offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadKind {
    FilteredData,
    PlotHtml,
    PlotPng,
}

impl DownloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::FilteredData => "filtered data",
            Self::PlotHtml => "interactive plot",
            Self::PlotPng => "plot image",
        }
    }
}

pub struct Session {
    settings: SessionSettings,
    source: Option<String>,
    table: Option<Table>,
    summary: Option<Summary>,
    controls: Vec<FilterControl>,
    filtered: DataFrame,
    data_download: Option<Download>,
    chart_controls: ChartControls,
    chart: Option<std::result::Result<ChartArtifact, ChartConstructionError>>,
    exports: Option<std::result::Result<ChartExports, ChartConstructionError>>,
}

impl Session {
    pub fn new(settings: SessionSettings) -> Self {
        Self {
            settings,
            source: None,
            table: None,
            summary: None,
            controls: Vec::new(),
            filtered: DataFrame::empty(),
            data_download: None,
            chart_controls: ChartControls::default(),
            chart: None,
            exports: None,
        }
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    /// Replaces the loaded table with one parsed from `bytes`. On failure the previous table,
    /// controls and chart are kept untouched.
    pub fn upload(&mut self, name: &str, bytes: &[u8]) -> std::result::Result<(), ParseError> {
        let mut table = match Table::from_csv_bytes(bytes, &self.settings.load) {
            Ok(table) => table,
            Err(e) => {
                tracing::warn!(file = name, error = %e, "upload rejected");
                return Err(e);
            }
        };
        let controls = build_filter_controls(&mut table)?;
        let summary = match compute_summary(table.df()) {
            Ok(summary) => Some(summary),
            Err(e) => {
                tracing::warn!(file = name, error = %e, "could not compute summary");
                None
            }
        };

        tracing::info!(
            file = name,
            rows = table.height(),
            columns = controls.len(),
            "loaded table"
        );

        let (filtered, data_download) = derive_subset(&table, &controls)?;

        self.chart_controls = default_chart_controls(&table);
        self.source = Some(name.to_string());
        self.table = Some(table);
        self.summary = summary;
        self.controls = controls;
        self.filtered = filtered;
        self.data_download = Some(data_download);
        self.discard_chart();
        Ok(())
    }

    /// Reads `path` and uploads its contents.
    pub fn open_path(&mut self, path: &Path) -> Result<()> {
        let bytes = std::fs::read(path)
            .map_err(|e| eyre!("Could not read {}: {}", path.display(), e))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        self.upload(&name, &bytes)?;
        Ok(())
    }

    /// Re-derives the filtered subset and its CSV download from the current controls.
    fn recompute(&mut self) -> PolarsResult<()> {
        let Some(table) = &self.table else {
            self.filtered = DataFrame::empty();
            self.data_download = None;
            return Ok(());
        };
        let (filtered, data_download) = derive_subset(table, &self.controls)?;
        self.filtered = filtered;
        self.data_download = Some(data_download);
        Ok(())
    }

    fn discard_chart(&mut self) {
        self.chart = None;
        self.exports = None;
    }

    fn control_mut(&mut self, column: &str) -> std::result::Result<&mut FilterControl, FilterError> {
        self.controls
            .iter_mut()
            .find(|c| c.column == column)
            .ok_or_else(|| FilterError::UnknownColumn(column.to_string()))
    }

    /// Applies a selection to the control of `column`.
    pub fn set_filter(&mut self, column: &str, selection: FilterSelection) -> Result<()> {
        self.control_mut(column)?.select(selection)?;
        self.discard_chart();
        self.recompute()?;
        Ok(())
    }

    /// Adds or removes one value of a categorical control.
    pub fn toggle_filter_value(&mut self, column: &str, value: &str) -> Result<()> {
        let control = self.control_mut(column)?;
        let expected = match control.kind() {
            ColumnKind::Categorical => None,
            ColumnKind::Numeric => Some("numeric range"),
            ColumnKind::Temporal => Some("date range"),
        };
        if let Some(expected) = expected {
            return Err(FilterError::KindMismatch {
                column: column.to_string(),
                expected,
            }
            .into());
        }
        control.toggle_value(value);
        self.discard_chart();
        self.recompute()?;
        Ok(())
    }

    pub fn reset_filters(&mut self) -> Result<()> {
        for control in &mut self.controls {
            control.select(FilterSelection::Reset)?;
        }
        self.discard_chart();
        self.recompute()?;
        Ok(())
    }

    pub fn set_chart_x(&mut self, column: &str) {
        self.chart_controls.x = Some(column.to_string());
        self.discard_chart();
    }

    pub fn set_chart_y(&mut self, column: &str) {
        self.chart_controls.y = Some(column.to_string());
        self.discard_chart();
    }

    pub fn set_chart_kind(&mut self, kind: ChartKind) {
        self.chart_controls.kind = kind;
        self.discard_chart();
    }

    /// Builds the chart for the current plot controls over the filtered subset, then renders its
    /// two downloads. The outcome replaces any previous chart. A construction failure is kept as
    /// the outcome and leaves the rest of the session usable; a render failure only affects the
    /// downloads.
    pub fn generate_chart(&mut self) {
        if self.table.is_none() {
            return;
        }
        let (Some(x), Some(y)) = (&self.chart_controls.x, &self.chart_controls.y) else {
            return;
        };
        let request = ChartRequest {
            x_column: x.clone(),
            y_column: y.clone(),
            kind: self.chart_controls.kind,
        };

        match build_chart(&self.filtered, &request, &self.settings.chart) {
            Ok(artifact) => {
                tracing::info!(
                    kind = request.kind.as_str(),
                    x = %request.x_column,
                    y = %request.y_column,
                    rows = self.filtered.height(),
                    "generated chart"
                );
                let exports = render_chart(&artifact, self.settings.export_size);
                if let Err(e) = &exports {
                    tracing::warn!(kind = request.kind.as_str(), error = %e, "chart export failed");
                }
                self.chart = Some(Ok(artifact));
                self.exports = Some(exports);
            }
            Err(e) => {
                tracing::warn!(
                    kind = request.kind.as_str(),
                    x = %request.x_column,
                    y = %request.y_column,
                    error = %e,
                    "chart construction failed"
                );
                self.chart = Some(Err(e));
                self.exports = None;
            }
        }
    }

    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn table(&self) -> Option<&Table> {
        self.table.as_ref()
    }

    pub fn controls(&self) -> &[FilterControl] {
        &self.controls
    }

    pub fn control(&self, column: &str) -> Option<&FilterControl> {
        self.controls.iter().find(|c| c.column == column)
    }

    pub fn filtered(&self) -> &DataFrame {
        &self.filtered
    }

    /// `(filtered rows, total rows)`.
    pub fn row_counts(&self) -> (usize, usize) {
        (
            self.filtered.height(),
            self.table.as_ref().map(Table::height).unwrap_or(0),
        )
    }

    /// First `preview_rows` rows of the loaded table.
    pub fn preview(&self) -> Option<DataFrame> {
        self.table
            .as_ref()
            .map(|t| t.head(self.settings.preview_rows))
    }

    pub fn summary(&self) -> Option<&Summary> {
        self.summary.as_ref()
    }

    pub fn chart_controls(&self) -> &ChartControls {
        &self.chart_controls
    }

    pub fn chart(&self) -> Option<&ChartArtifact> {
        self.chart.as_ref().and_then(|c| c.as_ref().ok())
    }

    pub fn chart_error(&self) -> Option<&ChartConstructionError> {
        self.chart.as_ref().and_then(|c| c.as_ref().err())
    }

    pub fn download(&self, kind: DownloadKind) -> Option<&Download> {
        match kind {
            DownloadKind::FilteredData => self.data_download.as_ref(),
            DownloadKind::PlotHtml => self.chart_exports().map(|e| &e.html),
            DownloadKind::PlotPng => self.chart_exports().map(|e| &e.png),
        }
    }

    fn chart_exports(&self) -> Option<&ChartExports> {
        self.exports.as_ref().and_then(|e| e.as_ref().ok())
    }

    /// Why the current chart could not be exported, if it could not.
    pub fn export_error(&self) -> Option<&ChartConstructionError> {
        self.exports.as_ref().and_then(|e| e.as_ref().err())
    }

    /// Writes a download into the export directory and returns the written path.
    pub fn save_download(&self, kind: DownloadKind) -> Result<PathBuf> {
        let download = self.download(kind).ok_or_else(|| match (kind, self.export_error()) {
            (DownloadKind::FilteredData, _) => eyre!("No data loaded"),
            (_, Some(e)) => eyre!("Could not export chart: {}", e),
            (_, None) => eyre!("No chart to export; generate one first"),
        })?;
        download.save_to(&self.settings.export_dir)
    }
}

/// Filtered subset of `table` under `controls`, with its CSV download.
fn derive_subset(
    table: &Table,
    controls: &[FilterControl],
) -> PolarsResult<(DataFrame, Download)> {
    let filtered = filtered_subset(table.df(), controls)?;
    let download = filtered_data_download(&filtered)?;
    tracing::debug!(
        rows = filtered.height(),
        total = table.height(),
        active_filters = controls.iter().filter(|c| c.is_active()).count(),
        "recomputed filtered subset"
    );
    Ok((filtered, download))
}

/// x = first column, y = first numeric column (falling back to the first column).
fn default_chart_controls(table: &Table) -> ChartControls {
    let names = table.column_names();
    let x = names.first().cloned();
    let y = table
        .columns()
        .find(|(_, kind)| *kind == ColumnKind::Numeric)
        .map(|(name, _)| name.to_string())
        .or_else(|| x.clone());
    ChartControls {
        x,
        y,
        kind: ChartKind::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chart::ChartData;

    const CSV: &str = "category,amount,when\nA,10,2024-01-01\nB,20,2024-01-02\nC,30,2024-01-03\n";

    fn session() -> Session {
        let mut session = Session::new(SessionSettings::default());
        session.upload("sales.csv", CSV.as_bytes()).unwrap();
        session
    }

    #[test]
    fn upload_builds_controls_and_defaults() {
        let session = session();
        assert_eq!(session.source(), Some("sales.csv"));
        assert_eq!(session.row_counts(), (3, 3));
        let kinds: Vec<ColumnKind> = session.controls().iter().map(|c| c.kind()).collect();
        assert_eq!(
            kinds,
            vec![ColumnKind::Categorical, ColumnKind::Numeric, ColumnKind::Temporal]
        );
        assert_eq!(session.chart_controls().x.as_deref(), Some("category"));
        assert_eq!(session.chart_controls().y.as_deref(), Some("amount"));
        assert!(session.download(DownloadKind::FilteredData).is_some());
        assert!(session.download(DownloadKind::PlotPng).is_none());
    }

    #[test]
    fn failed_upload_keeps_previous_table() {
        let mut session = session();
        let err = session.upload("empty.csv", b"").unwrap_err();
        assert!(matches!(err, ParseError::Empty));
        assert_eq!(session.source(), Some("sales.csv"));
        assert_eq!(session.row_counts(), (3, 3));
    }

    #[test]
    fn upload_replaces_table_and_subset_together() {
        let mut session = session();
        let before = session.download(DownloadKind::FilteredData).unwrap().bytes.clone();
        assert!(session.upload("bad.csv", &[b'a', 0xff]).is_err());
        assert_eq!(session.download(DownloadKind::FilteredData).unwrap().bytes, before);

        session.upload("pets.csv", b"pet,age\ncat,3\ndog,5\n").unwrap();
        assert_eq!(session.row_counts(), (2, 2));
        let text =
            String::from_utf8(session.download(DownloadKind::FilteredData).unwrap().bytes.clone())
                .unwrap();
        assert_eq!(text.lines().next(), Some("pet,age"));
        assert_eq!(text.lines().count(), 3);
    }

    #[test]
    fn export_failure_keeps_chart() {
        let mut settings = SessionSettings::default();
        settings.export_size = (0, 0);
        let mut session = Session::new(settings);
        session.upload("sales.csv", CSV.as_bytes()).unwrap();
        session.set_chart_kind(ChartKind::Pie);
        session.generate_chart();

        let chart = session.chart().expect("chart survives a failed export");
        let ChartData::Pie(slices) = &chart.data else {
            panic!("expected pie data");
        };
        assert_eq!(slices.len(), 3);
        assert!(session.chart_error().is_none());
        assert!(matches!(
            session.export_error(),
            Some(ChartConstructionError::Render(_))
        ));

        assert!(session.download(DownloadKind::PlotPng).is_none());
        let err = session.save_download(DownloadKind::PlotHtml).unwrap_err();
        assert!(err.to_string().starts_with("Could not export chart"), "{err}");
        assert!(session.download(DownloadKind::FilteredData).is_some());

        session.set_chart_kind(ChartKind::Bar);
        assert!(session.chart().is_none());
        assert!(session.export_error().is_none());
    }

    #[test]
    fn filter_change_discards_chart() {
        let mut session = session();
        session.set_chart_kind(ChartKind::Bar);
        session.generate_chart();
        assert!(session.chart().is_some() || session.chart_error().is_some());

        session
            .set_filter("amount", FilterSelection::Range(15.0, 30.0))
            .unwrap();
        assert!(session.chart().is_none());
        assert!(session.chart_error().is_none());
        assert_eq!(session.row_counts(), (2, 3));
    }

    #[test]
    fn unknown_filter_column_is_filter_error() {
        let mut session = session();
        let err = session
            .set_filter("missing", FilterSelection::Reset)
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<FilterError>(),
            Some(&FilterError::UnknownColumn("missing".to_string()))
        );
    }

    #[test]
    fn toggle_on_range_control_is_rejected() {
        let mut session = session();
        let err = session.toggle_filter_value("amount", "10").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<FilterError>(),
            Some(FilterError::KindMismatch { .. })
        ));
    }

    #[test]
    fn preview_uses_configured_row_count() {
        let mut settings = SessionSettings::default();
        settings.preview_rows = 2;
        let mut session = Session::new(settings);
        assert!(session.preview().is_none());
        session.upload("sales.csv", CSV.as_bytes()).unwrap();
        assert_eq!(session.preview().unwrap().height(), 2);
    }

    #[test]
    fn settings_prefer_cli_over_config() {
        use clap::Parser;
        let mut config = AppConfig::default();
        config.display.preview_rows = 9;
        config.file_loading.delimiter = Some(b';');
        config.chart.histogram_bins = Some(12);
        config.export.directory = Some(PathBuf::from("/from/config"));

        let args = Args::parse_from(["csvdash", "--preview-rows", "3", "--no-header"]);
        let settings = SessionSettings::from_args_and_config(&args, &config);
        assert_eq!(settings.preview_rows, 3);
        assert_eq!(settings.load.delimiter, b';');
        assert!(!settings.load.has_header);
        assert_eq!(settings.chart.histogram_bins, Some(12));
        assert_eq!(settings.export_dir, PathBuf::from("/from/config"));
        assert_eq!(settings.export_size, (700, 500));

        let args = Args::parse_from(["csvdash", "--export-dir", "/from/cli"]);
        let settings = SessionSettings::from_args_and_config(&args, &config);
        assert_eq!(settings.export_dir, PathBuf::from("/from/cli"));
        assert_eq!(settings.preview_rows, 9);
    }
}
