use std::borrow::Cow;

use polars::prelude::*;
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Rect},
    style::{Color, Style, Stylize},
    text::Line,
    widgets::{Block, Borders, Cell, Paragraph, Row, StatefulWidget, Table, Widget},
};

use crate::statistics::Summary;

/// Scroll position of a data view. Offsets are clamped against the content on render.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DataViewState {
    pub row_offset: usize,
    pub col_offset: usize,
    /// Rows that fit on the last render; drives page scrolling.
    pub visible_rows: usize,
}

impl DataViewState {
    pub fn scroll_down(&mut self, rows: usize) {
        self.row_offset = self.row_offset.saturating_add(rows);
    }

    pub fn scroll_up(&mut self, rows: usize) {
        self.row_offset = self.row_offset.saturating_sub(rows);
    }

    pub fn page_down(&mut self) {
        self.scroll_down(self.visible_rows.max(1));
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.visible_rows.max(1));
    }

    pub fn scroll_right(&mut self) {
        self.col_offset = self.col_offset.saturating_add(1);
    }

    pub fn scroll_left(&mut self) {
        self.col_offset = self.col_offset.saturating_sub(1);
    }

    pub fn reset(&mut self) {
        self.row_offset = 0;
        self.col_offset = 0;
    }
}

enum Source<'a> {
    Frame(&'a DataFrame),
    Summary(&'a Summary),
}

impl Source<'_> {
    fn height(&self) -> usize {
        match self {
            Source::Frame(df) => df.height(),
            Source::Summary(summary) => summary.stats.len(),
        }
    }

    fn width(&self) -> usize {
        match self {
            Source::Frame(df) => df.width(),
            // leading column holds the stat labels
            Source::Summary(summary) => summary.columns.len() + 1,
        }
    }

    fn header(&self, col: usize) -> Cow<'_, str> {
        match self {
            Source::Frame(df) => df
                .get_column_names()
                .get(col)
                .map(|name| Cow::Owned(name.to_string()))
                .unwrap_or_default(),
            Source::Summary(_) if col == 0 => Cow::Borrowed(""),
            Source::Summary(summary) => summary
                .columns
                .get(col - 1)
                .map(|c| Cow::Borrowed(c.name.as_str()))
                .unwrap_or_default(),
        }
    }

    fn cell(&self, row: usize, col: usize) -> Cow<'_, str> {
        match self {
            Source::Frame(df) => match df.get_columns().get(col).map(|c| c.get(row)) {
                Some(Ok(AnyValue::Null)) | Some(Err(_)) | None => Cow::Borrowed(""),
                Some(Ok(AnyValue::String(s))) => Cow::Owned(s.to_string()),
                Some(Ok(AnyValue::StringOwned(s))) => Cow::Owned(s.to_string()),
                Some(Ok(value)) => Cow::Owned(value.str_value().into_owned()),
            },
            Source::Summary(summary) if col == 0 => summary
                .stats
                .get(row)
                .map(|s| Cow::Borrowed(*s))
                .unwrap_or_default(),
            Source::Summary(summary) => summary
                .columns
                .get(col - 1)
                .and_then(|c| c.values.get(row))
                .and_then(|v| v.as_deref())
                .map(Cow::Borrowed)
                .unwrap_or_default(),
        }
    }
}

/// Scrollable grid over a DataFrame or a summary table. Columns are as wide as their widest
/// visible value; columns that do not fit are reached by scrolling right.
pub struct DataView<'a> {
    source: Source<'a>,
    title: Option<String>,
    header_fg: Color,
    alternate_row_bg: Option<Color>,
    column_spacing: u16,
    empty_message: &'a str,
}

impl<'a> DataView<'a> {
    pub fn from_dataframe(df: &'a DataFrame) -> Self {
        Self::new(Source::Frame(df))
    }

    pub fn from_summary(summary: &'a Summary) -> Self {
        Self::new(Source::Summary(summary))
    }

    fn new(source: Source<'a>) -> Self {
        Self {
            source,
            title: None,
            header_fg: Color::White,
            alternate_row_bg: None,
            column_spacing: 2,
            empty_message: "No rows",
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_header_fg(mut self, color: Color) -> Self {
        self.header_fg = color;
        self
    }

    pub fn with_alternate_row_bg(mut self, color: Option<Color>) -> Self {
        self.alternate_row_bg = color;
        self
    }

    pub fn with_empty_message(mut self, message: &'a str) -> Self {
        self.empty_message = message;
        self
    }
}

impl StatefulWidget for DataView<'_> {
    type State = DataViewState;

    fn render(self, area: Rect, buf: &mut Buffer, state: &mut Self::State) {
        let block = match &self.title {
            Some(title) => Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", title)),
            None => Block::default(),
        };
        let inner = block.inner(area);
        block.render(area, buf);

        let height = self.source.height();
        let width = self.source.width();
        state.visible_rows = inner.height.saturating_sub(1) as usize;
        state.row_offset = state.row_offset.min(height.saturating_sub(1));
        state.col_offset = state.col_offset.min(width.saturating_sub(1));

        if width == 0 || height == 0 {
            Paragraph::new(self.empty_message)
                .centered()
                .style(Style::default().fg(Color::DarkGray))
                .render(inner, buf);
            return;
        }

        let row_end = (state.row_offset + state.visible_rows).min(height);
        let mut widths: Vec<u16> = Vec::new();
        let mut columns: Vec<usize> = Vec::new();
        let mut used_width: u16 = 0;
        for col in state.col_offset..width {
            let mut max_len = self.source.header(col).chars().count() as u16;
            for row in state.row_offset..row_end {
                max_len = max_len.max(self.source.cell(row, col).chars().count() as u16);
            }
            if !columns.is_empty() && used_width + max_len > inner.width {
                break;
            }
            let shown = max_len.min(inner.width.saturating_sub(used_width));
            widths.push(shown);
            columns.push(col);
            used_width = used_width.saturating_add(shown + self.column_spacing);
        }

        let rows: Vec<Row> = (state.row_offset..row_end)
            .enumerate()
            .map(|(i, row)| {
                let cells: Vec<Cell> = columns
                    .iter()
                    .map(|&col| Cell::from(Line::from(self.source.cell(row, col).into_owned())))
                    .collect();
                let style = if i % 2 == 1 {
                    self.alternate_row_bg
                        .map(|c| Style::default().bg(c))
                        .unwrap_or_default()
                } else {
                    Style::default()
                };
                Row::new(cells).style(style)
            })
            .collect();

        let headers: Vec<Cell> = columns
            .iter()
            .map(|&col| Cell::from(self.source.header(col).into_owned()))
            .collect();

        let constraints: Vec<Constraint> = widths.into_iter().map(Constraint::Length).collect();
        Widget::render(
            Table::new(rows, constraints)
                .column_spacing(self.column_spacing)
                .header(Row::new(headers).style(Style::default().fg(self.header_fg).bold())),
            inner,
            buf,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statistics::SummaryColumn;
    use ratatui::style::Modifier;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn renders_headers_and_values() {
        let df = df!("name" => ["ann", "bob"], "score" => [1.5, 2.0]).unwrap();
        let area = Rect::new(0, 0, 40, 5);
        let mut buf = Buffer::empty(area);
        let mut state = DataViewState::default();
        DataView::from_dataframe(&df).render(area, &mut buf, &mut state);
        let text = buffer_text(&buf);
        assert!(text.contains("name"));
        assert!(text.contains("score"));
        assert!(text.contains("bob"));
        assert!(!text.contains("\"bob\""));
        assert_eq!(state.visible_rows, 4);
    }

    #[test]
    fn header_row_is_bold() {
        let df = df!("name" => ["ann"]).unwrap();
        let area = Rect::new(0, 0, 20, 3);
        let mut buf = Buffer::empty(area);
        let mut state = DataViewState::default();
        DataView::from_dataframe(&df).render(area, &mut buf, &mut state);
        let idx = buf
            .content()
            .windows(4)
            .position(|w| w.iter().map(|c| c.symbol()).collect::<String>() == "name")
            .unwrap();
        assert!(buf.content()[idx].modifier.contains(Modifier::BOLD));
    }

    #[test]
    fn offsets_are_clamped_to_content() {
        let df = df!("a" => [1, 2, 3]).unwrap();
        let area = Rect::new(0, 0, 20, 4);
        let mut buf = Buffer::empty(area);
        let mut state = DataViewState {
            row_offset: 50,
            col_offset: 9,
            visible_rows: 0,
        };
        DataView::from_dataframe(&df).render(area, &mut buf, &mut state);
        assert_eq!(state.row_offset, 2);
        assert_eq!(state.col_offset, 0);
    }

    #[test]
    fn summary_has_label_column() {
        let summary = Summary {
            stats: vec!["count", "mean"],
            columns: vec![SummaryColumn {
                name: "price".to_string(),
                values: vec![Some("3".to_string()), None],
            }],
        };
        let area = Rect::new(0, 0, 30, 4);
        let mut buf = Buffer::empty(area);
        let mut state = DataViewState::default();
        DataView::from_summary(&summary).render(area, &mut buf, &mut state);
        let text = buffer_text(&buf);
        assert!(text.contains("price"));
        assert!(text.contains("count"));
        assert!(text.contains("mean"));
    }

    #[test]
    fn empty_frame_shows_message() {
        let df = DataFrame::empty();
        let area = Rect::new(0, 0, 20, 3);
        let mut buf = Buffer::empty(area);
        let mut state = DataViewState::default();
        DataView::from_dataframe(&df)
            .with_empty_message("Nothing")
            .render(area, &mut buf, &mut state);
        assert!(buffer_text(&buf).contains("Nothing"));
    }
}
