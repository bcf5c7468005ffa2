use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, StatefulWidget, Widget},
};

use crate::filter::FilterControl;
use crate::session::ChartControls;
use crate::table::ColumnKind;

/// A selectable row of the sidebar. Filters come first, then the plot controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SidebarItem {
    Filter(usize),
    ChartX,
    ChartY,
    ChartKind,
    Generate,
}

impl SidebarItem {
    const PLOT_ITEMS: [SidebarItem; 4] = [
        SidebarItem::ChartX,
        SidebarItem::ChartY,
        SidebarItem::ChartKind,
        SidebarItem::Generate,
    ];

    pub fn count(filters: usize) -> usize {
        filters + Self::PLOT_ITEMS.len()
    }

    /// Item at `index`; indices past the end clamp to the last item.
    pub fn at(index: usize, filters: usize) -> Self {
        if index < filters {
            return Self::Filter(index);
        }
        let plot = (index - filters).min(Self::PLOT_ITEMS.len() - 1);
        Self::PLOT_ITEMS[plot]
    }
}

pub struct Sidebar<'a> {
    controls: &'a [FilterControl],
    chart: &'a ChartControls,
    selected: usize,
    focused: bool,
    active_color: Color,
    text_color: Color,
    dimmed_color: Color,
}

impl<'a> Sidebar<'a> {
    pub fn new(controls: &'a [FilterControl], chart: &'a ChartControls, selected: usize) -> Self {
        Self {
            controls,
            chart,
            selected,
            focused: true,
            active_color: Color::Cyan,
            text_color: Color::White,
            dimmed_color: Color::DarkGray,
        }
    }

    pub fn with_focused(mut self, focused: bool) -> Self {
        self.focused = focused;
        self
    }

    pub fn with_colors(mut self, active: Color, text: Color, dimmed: Color) -> Self {
        self.active_color = active;
        self.text_color = text;
        self.dimmed_color = dimmed;
        self
    }

    fn highlight(&self) -> Style {
        if self.focused {
            Style::default()
                .fg(self.active_color)
                .add_modifier(Modifier::REVERSED)
        } else {
            Style::default().fg(self.active_color)
        }
    }

    fn filter_item(&self, control: &FilterControl, width: u16) -> ListItem<'a> {
        let kind = match control.kind() {
            ColumnKind::Numeric => "#",
            ColumnKind::Temporal => "@",
            ColumnKind::Categorical => "≡",
        };
        let marker = if control.is_active() { "●" } else { " " };
        let marker_style = Style::default().fg(self.active_color);
        let name_width = (width as usize).saturating_sub(4);
        let mut name = control.column.clone();
        if name.chars().count() > name_width {
            name = name.chars().take(name_width.saturating_sub(1)).collect();
            name.push('…');
        }
        ListItem::new(vec![
            Line::from(vec![
                Span::styled(marker, marker_style),
                Span::styled(format!("{} ", kind), Style::default().fg(self.dimmed_color)),
                Span::styled(name, Style::default().fg(self.text_color)),
            ]),
            Line::from(Span::styled(
                format!("    {}", control.summary()),
                Style::default().fg(self.dimmed_color),
            )),
        ])
    }
}

impl Widget for Sidebar<'_> {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::new(
            Direction::Vertical,
            [Constraint::Fill(1), Constraint::Length(6)],
        )
        .split(area);

        let filter_block = Block::default().borders(Borders::ALL).title(" Filters ");
        let filter_area = filter_block.inner(layout[0]);
        filter_block.render(layout[0], buf);

        if self.controls.is_empty() {
            Paragraph::new("Open a CSV file with o")
                .style(Style::default().fg(self.dimmed_color))
                .render(filter_area, buf);
        } else {
            let items: Vec<ListItem> = self
                .controls
                .iter()
                .map(|c| self.filter_item(c, filter_area.width))
                .collect();
            let mut state = ListState::default();
            if let SidebarItem::Filter(i) = SidebarItem::at(self.selected, self.controls.len()) {
                state.select(Some(i));
            }
            StatefulWidget::render(
                List::new(items).highlight_style(self.highlight()),
                filter_area,
                buf,
                &mut state,
            );
        }

        let plot_block = Block::default().borders(Borders::ALL).title(" Plot ");
        let plot_area = plot_block.inner(layout[1]);
        plot_block.render(layout[1], buf);

        let selected = SidebarItem::at(self.selected, self.controls.len());
        let row = |item: SidebarItem, label: &'static str, value: String| -> Line<'static> {
            let style = if selected == item {
                self.highlight()
            } else {
                Style::default().fg(self.text_color)
            };
            Line::from(vec![
                Span::styled(format!("{:<6}", label), Style::default().fg(self.dimmed_color)),
                Span::styled(value, style),
            ])
        };
        let none = || "-".to_string();
        let generate_style = if selected == SidebarItem::Generate {
            self.highlight()
        } else {
            Style::default().fg(self.active_color)
        };
        let lines = vec![
            row(
                SidebarItem::ChartX,
                "X",
                self.chart.x.clone().unwrap_or_else(none),
            ),
            row(
                SidebarItem::ChartY,
                "Y",
                self.chart.y.clone().unwrap_or_else(none),
            ),
            row(
                SidebarItem::ChartKind,
                "Kind",
                format!("◀ {} ▶", self.chart.kind.title()),
            ),
            Line::from(Span::styled("[ Generate ]", generate_style)),
        ];
        Paragraph::new(lines).render(plot_area, buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn items_put_filters_before_plot_controls() {
        assert_eq!(SidebarItem::count(2), 6);
        assert_eq!(SidebarItem::at(0, 2), SidebarItem::Filter(0));
        assert_eq!(SidebarItem::at(1, 2), SidebarItem::Filter(1));
        assert_eq!(SidebarItem::at(2, 2), SidebarItem::ChartX);
        assert_eq!(SidebarItem::at(5, 2), SidebarItem::Generate);
        assert_eq!(SidebarItem::at(99, 2), SidebarItem::Generate);
        assert_eq!(SidebarItem::at(0, 0), SidebarItem::ChartX);
    }
}
