use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    symbols,
    text::{Line, Span},
    widgets::{
        Axis, Bar, BarChart, BarGroup, Block, Borders, Chart, Dataset, GraphType, Paragraph,
        Widget, Wrap,
    },
};

use crate::chart::{BoxStats, ChartArtifact, ChartData, ChartKind, HistogramBin, PieSlice, XAxis};
use crate::error::ChartConstructionError;
use crate::filter::format_number;

/// Terminal rendering of the last chart outcome.
pub struct ChartView<'a> {
    artifact: Option<&'a ChartArtifact>,
    error: Option<&'a ChartConstructionError>,
    series_color: Color,
    text_color: Color,
    error_color: Color,
}

impl<'a> ChartView<'a> {
    pub fn new(
        artifact: Option<&'a ChartArtifact>,
        error: Option<&'a ChartConstructionError>,
    ) -> Self {
        Self {
            artifact,
            error,
            series_color: Color::Cyan,
            text_color: Color::White,
            error_color: Color::Red,
        }
    }

    pub fn with_colors(mut self, series: Color, text: Color, error: Color) -> Self {
        self.series_color = series;
        self.text_color = text;
        self.error_color = error;
        self
    }
}

impl Widget for ChartView<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let title = self
            .artifact
            .map(|a| format!(" {} ", a.title))
            .unwrap_or_else(|| " Chart ".to_string());
        let block = Block::default().borders(Borders::ALL).title(title);
        let inner = block.inner(area);
        block.render(area, buf);

        if let Some(error) = self.error {
            Paragraph::new(format!("Could not build chart: {}", error))
                .style(Style::default().fg(self.error_color))
                .wrap(Wrap { trim: true })
                .centered()
                .render(inner, buf);
            return;
        }
        let Some(artifact) = self.artifact else {
            Paragraph::new("Choose X, Y and a chart kind in the sidebar, then press g")
                .style(Style::default().fg(Color::DarkGray))
                .wrap(Wrap { trim: true })
                .centered()
                .render(inner, buf);
            return;
        };

        match &artifact.data {
            ChartData::Points { points, x_axis } => {
                self.render_points(artifact, points, x_axis, inner, buf)
            }
            ChartData::Histogram(bins) => self.render_histogram(bins, inner, buf),
            ChartData::Box(stats) => self.render_box(artifact, stats, inner, buf),
            ChartData::Pie(slices) => self.render_pie(slices, inner, buf),
        }
    }
}

impl ChartView<'_> {
    fn render_points(
        &self,
        artifact: &ChartArtifact,
        points: &[(f64, f64)],
        x_axis: &XAxis,
        area: Rect,
        buf: &mut Buffer,
    ) {
        let Some((x_min, x_max, y_min, y_max)) = artifact.bounds() else {
            return;
        };
        let (graph_type, marker) = match artifact.kind {
            ChartKind::Scatter => (GraphType::Scatter, symbols::Marker::Dot),
            ChartKind::Bar => (GraphType::Bar, symbols::Marker::HalfBlock),
            _ => (GraphType::Line, symbols::Marker::Braille),
        };
        let dataset = Dataset::default()
            .name(artifact.y_label.as_str())
            .marker(marker)
            .graph_type(graph_type)
            .style(Style::default().fg(self.series_color))
            .data(points);

        let label_style = Style::default().fg(self.text_color);
        let x_labels: Vec<Span> = [x_min, (x_min + x_max) / 2.0, x_max]
            .into_iter()
            .map(|v| Span::styled(x_label(x_axis, v), label_style))
            .collect();
        let y_labels: Vec<Span> = [y_min, (y_min + y_max) / 2.0, y_max]
            .into_iter()
            .map(|v| Span::styled(format_axis_label(v), label_style))
            .collect();

        Chart::new(vec![dataset])
            .x_axis(
                Axis::default()
                    .title(artifact.x_label.as_str())
                    .bounds([x_min, x_max])
                    .style(label_style)
                    .labels(x_labels),
            )
            .y_axis(
                Axis::default()
                    .title(artifact.y_label.as_str())
                    .bounds([y_min, y_max])
                    .style(label_style)
                    .labels(y_labels),
            )
            .legend_position(None)
            .render(area, buf);
    }

    fn render_histogram(&self, bins: &[HistogramBin], area: Rect, buf: &mut Buffer) {
        let bars: Vec<Bar> = bins
            .iter()
            .map(|bin| {
                Bar::default()
                    .value(bin.count as u64)
                    .label(Line::from(format_axis_label(bin.start)))
            })
            .collect();
        let slots = bins.len().max(1) as u16;
        let bar_width = (area.width / slots).saturating_sub(1).max(1);
        BarChart::default()
            .data(BarGroup::default().bars(&bars))
            .bar_width(bar_width)
            .bar_gap(1)
            .bar_style(Style::default().fg(self.series_color))
            .value_style(Style::default().fg(Color::Black).bg(self.series_color))
            .label_style(Style::default().fg(self.text_color))
            .render(area, buf);
    }

    fn render_box(&self, artifact: &ChartArtifact, stats: &BoxStats, area: Rect, buf: &mut Buffer) {
        let layout = Layout::new(
            Direction::Vertical,
            [Constraint::Length(3), Constraint::Fill(1)],
        )
        .split(area);

        let line = box_line(stats, layout[0].width as usize);
        Paragraph::new(vec![
            Line::from(""),
            Line::from(Span::styled(line, Style::default().fg(self.series_color))),
        ])
        .render(layout[0], buf);

        let rows = [
            ("count", stats.count.to_string()),
            ("min", format_number(stats.min)),
            ("lower whisker", format_number(stats.lower_whisker)),
            ("q1", format_number(stats.q1)),
            ("median", format_number(stats.median)),
            ("q3", format_number(stats.q3)),
            ("upper whisker", format_number(stats.upper_whisker)),
            ("max", format_number(stats.max)),
            ("outliers", stats.outliers.len().to_string()),
        ];
        let mut lines = vec![Line::from(Span::styled(
            artifact.y_label.clone(),
            Style::default().fg(self.text_color).bold(),
        ))];
        lines.extend(rows.into_iter().map(|(label, value)| {
            Line::from(vec![
                Span::styled(format!("{:<14}", label), Style::default().fg(Color::DarkGray)),
                Span::styled(value, Style::default().fg(self.text_color)),
            ])
        }));
        Paragraph::new(lines).render(layout[1], buf);
    }

    fn render_pie(&self, slices: &[PieSlice], area: Rect, buf: &mut Buffer) {
        let bars: Vec<Bar> = slices
            .iter()
            .map(|slice| {
                Bar::default()
                    .value((slice.fraction * 1000.0).round() as u64)
                    .text_value(format!("{:.1}%", slice.fraction * 100.0))
                    .label(Line::from(slice.label.clone()))
            })
            .collect();
        BarChart::default()
            .direction(Direction::Horizontal)
            .data(BarGroup::default().bars(&bars))
            .bar_width(1)
            .bar_gap(0)
            .max(1000)
            .bar_style(Style::default().fg(self.series_color))
            .value_style(Style::default().fg(Color::Black).bg(self.series_color))
            .label_style(Style::default().fg(self.text_color))
            .render(area, buf);
    }
}

/// Numeric axis label; scientific notation for very large or very small magnitudes.
fn format_axis_label(v: f64) -> String {
    if v.abs() >= 1e6 || (v.abs() < 1e-2 && v != 0.0) {
        format!("{:.2e}", v)
    } else if v.fract() == 0.0 {
        format!("{:.0}", v)
    } else {
        format!("{:.2}", v)
    }
}

/// Terminal axis labels sit at evenly spaced positions, so categorical labels use the nearest
/// category rather than requiring an exact index.
fn x_label(x_axis: &XAxis, v: f64) -> String {
    match x_axis {
        XAxis::Numeric => format_axis_label(v),
        XAxis::Categorical(labels) if !labels.is_empty() => {
            let idx = v.round().clamp(0.0, (labels.len() - 1) as f64);
            x_axis.format(idx)
        }
        _ => x_axis.format(v),
    }
}

/// One-line horizontal box plot scaled to `width` columns.
fn box_line(stats: &BoxStats, width: usize) -> String {
    if width == 0 {
        return String::new();
    }
    let (lo, hi) = (stats.min, stats.max);
    let span = hi - lo;
    let pos = |v: f64| -> usize {
        if span <= 0.0 {
            width / 2
        } else {
            (((v - lo) / span) * (width - 1) as f64).round() as usize
        }
    };

    let mut cells = vec![' '; width];
    let (lw, q1, med, q3, uw) = (
        pos(stats.lower_whisker),
        pos(stats.q1),
        pos(stats.median),
        pos(stats.q3),
        pos(stats.upper_whisker),
    );
    for cell in cells.iter_mut().take(q1).skip(lw) {
        *cell = '─';
    }
    for cell in cells.iter_mut().take(uw + 1).skip(q3) {
        *cell = '─';
    }
    for cell in cells.iter_mut().take(q3 + 1).skip(q1) {
        *cell = '█';
    }
    cells[lw] = '├';
    cells[uw] = '┤';
    cells[med] = '┃';
    for &outlier in &stats.outliers {
        cells[pos(outlier).min(width - 1)] = '•';
    }
    cells.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn shows_prompt_without_chart() {
        let area = Rect::new(0, 0, 80, 6);
        let mut buf = Buffer::empty(area);
        ChartView::new(None, None).render(area, &mut buf);
        assert!(buffer_text(&buf).contains("press g"));
    }

    #[test]
    fn shows_error_inline() {
        let area = Rect::new(0, 0, 80, 6);
        let mut buf = Buffer::empty(area);
        let error = ChartConstructionError::UnknownColumn("zzz".to_string());
        ChartView::new(None, Some(&error)).render(area, &mut buf);
        assert!(buffer_text(&buf).contains("zzz"));
    }

    #[test]
    fn box_line_marks_quartiles_and_outliers() {
        let stats = BoxStats {
            count: 6,
            min: 0.0,
            q1: 2.0,
            median: 5.0,
            q3: 7.0,
            max: 10.0,
            lower_whisker: 1.0,
            upper_whisker: 8.0,
            outliers: vec![10.0],
        };
        let line = box_line(&stats, 11);
        assert_eq!(line.chars().count(), 11);
        assert_eq!(line.chars().nth(5), Some('┃'));
        assert_eq!(line.chars().nth(1), Some('├'));
        assert_eq!(line.chars().nth(8), Some('┤'));
        assert_eq!(line.chars().nth(10), Some('•'));
    }

    #[test]
    fn categorical_labels_snap_to_nearest() {
        let axis = XAxis::Categorical(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(x_label(&axis, -0.5), "a");
        assert_eq!(x_label(&axis, 1.0), "b");
        assert_eq!(x_label(&axis, 2.5), "c");
    }
}
