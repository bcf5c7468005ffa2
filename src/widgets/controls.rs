use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Style, Stylize},
    widgets::{Paragraph, Widget},
};

use crate::config::Theme;

const CONTROLS: [(&str, &str); 9] = [
    ("o", "Open"),
    ("↵", "Edit"),
    ("r", "Reset"),
    ("g", "Plot"),
    ("e", "CSV"),
    ("h", "HTML"),
    ("p", "PNG"),
    ("Tab", "View"),
    ("q", "Quit"),
];

/// Bottom bar of key hints with the filtered row count on the right
#[derive(Default)]
pub struct Controls {
    pub row_counts: Option<(usize, usize)>,
    pub dimmed: bool,
    pub bar_color: Option<Color>,
    pub key_color: Option<Color>,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    /// `filtered` of `total` rows match the active filters
    pub fn with_row_counts(mut self, filtered: usize, total: usize) -> Self {
        self.row_counts = Some((filtered, total));
        self
    }

    pub fn with_dimmed(mut self, dimmed: bool) -> Self {
        self.dimmed = dimmed;
        self
    }

    pub fn with_theme(mut self, theme: &Theme) -> Self {
        self.bar_color = Some(theme.get("controls_bg"));
        self.key_color = Some(theme.get("keybind_hints"));
        self
    }
}

impl Widget for &Controls {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let mut constraints = CONTROLS.iter().fold(vec![], |mut acc, (key, action)| {
            acc.push(Constraint::Length(key.chars().count() as u16 + 2));
            acc.push(Constraint::Length(action.chars().count() as u16 + 1));
            acc
        });

        let row_text = self
            .row_counts
            .map(|(filtered, total)| format!("Rows: {} / {}", filtered, total));
        if let Some(text) = &row_text {
            constraints.push(Constraint::Length(text.chars().count() as u16 + 2));
        }
        constraints.push(Constraint::Fill(1));

        let layout = Layout::new(Direction::Horizontal, constraints).split(area);
        let bar = self.bar_color.unwrap_or(Color::DarkGray);

        let base_style = if self.dimmed {
            Style::default().fg(Color::DarkGray)
        } else {
            Style::default()
        };
        let key_style = match (self.dimmed, self.key_color) {
            (false, Some(color)) => base_style.fg(color).bold(),
            _ => base_style.bold(),
        };

        for (i, (key, action)) in CONTROLS.iter().enumerate() {
            let j = i * 2;
            Paragraph::new(*key)
                .style(key_style)
                .centered()
                .render(layout[j], buf);
            Paragraph::new(*action)
                .style(base_style.bg(bar))
                .render(layout[j + 1], buf);
        }

        let mut fill_start_idx = CONTROLS.len() * 2;
        if let Some(text) = row_text {
            Paragraph::new(text)
                .style(base_style.bg(bar).fg(if self.dimmed {
                    Color::DarkGray
                } else {
                    Color::White
                }))
                .right_aligned()
                .render(layout[fill_start_idx], buf);
            fill_start_idx += 1;
        }

        Paragraph::new("")
            .style(base_style.bg(bar))
            .render(layout[fill_start_idx], buf);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer_text(buf: &Buffer) -> String {
        buf.content().iter().map(|c| c.symbol()).collect()
    }

    #[test]
    fn renders_hints_and_row_counts() {
        let area = Rect::new(0, 0, 120, 1);
        let mut buf = Buffer::empty(area);
        let controls = Controls::new().with_row_counts(3, 10);
        (&controls).render(area, &mut buf);
        let text = buffer_text(&buf);
        assert!(text.contains("Open"));
        assert!(text.contains("Quit"));
        assert!(text.contains("Rows: 3 / 10"));
    }
}
