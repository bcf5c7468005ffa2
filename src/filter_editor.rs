//! Popup state for editing one filter control: two bound inputs for numeric and date ranges,
//! or a checklist for categorical values.

use chrono::NaiveDate;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::{
    buffer::Buffer,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Clear, List, ListItem, ListState, Paragraph, StatefulWidget, Widget},
};

use crate::config::Theme;
use crate::filter::{format_number, FilterControl, FilterSelection, FilterState};
use crate::table::{millis_to_date, parse_datetime_millis};
use crate::widgets::text_input::{TextInput, TextInputEvent};

/// Result of feeding a key to the editor.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorOutcome {
    Pending,
    Apply(FilterSelection),
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeFocus {
    Lower,
    Upper,
}

enum EditorBody {
    Range {
        temporal: bool,
        bounds: Option<(String, String)>,
        lower: TextInput,
        upper: TextInput,
        focus: RangeFocus,
    },
    Values {
        options: Vec<String>,
        checked: Vec<bool>,
        cursor: usize,
    },
}

pub struct FilterEditor {
    pub column: String,
    body: EditorBody,
    pub error: Option<String>,
}

impl FilterEditor {
    /// Opens an editor pre-filled with the control's current selection.
    pub fn open(control: &FilterControl, theme: &Theme) -> Self {
        let body = match &control.state {
            FilterState::Numeric { bounds, selected } => {
                let current = selected.or(*bounds);
                range_body(
                    false,
                    bounds.map(|(lo, hi)| (format_number(lo), format_number(hi))),
                    current.map(|(lo, hi)| (format_number(lo), format_number(hi))),
                    theme,
                )
            }
            FilterState::Temporal { bounds, selected } => {
                let current = selected.or(*bounds);
                range_body(
                    true,
                    bounds.map(|(lo, hi)| (lo.to_string(), hi.to_string())),
                    current.map(|(lo, hi)| (lo.to_string(), hi.to_string())),
                    theme,
                )
            }
            FilterState::Categorical { options, selected } => EditorBody::Values {
                options: options.clone(),
                checked: options.iter().map(|o| selected.contains(o)).collect(),
                cursor: 0,
            },
        };
        Self {
            column: control.column.clone(),
            body,
            error: None,
        }
    }

    pub fn handle_key(&mut self, event: &KeyEvent) -> EditorOutcome {
        if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('r') {
            return EditorOutcome::Apply(FilterSelection::Reset);
        }
        match &mut self.body {
            EditorBody::Range {
                lower,
                upper,
                focus,
                ..
            } => match event.code {
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                    *focus = match focus {
                        RangeFocus::Lower => RangeFocus::Upper,
                        RangeFocus::Upper => RangeFocus::Lower,
                    };
                    lower.set_focused(*focus == RangeFocus::Lower);
                    upper.set_focused(*focus == RangeFocus::Upper);
                    EditorOutcome::Pending
                }
                _ => {
                    let input = match focus {
                        RangeFocus::Lower => lower,
                        RangeFocus::Upper => upper,
                    };
                    match input.handle_key(event) {
                        TextInputEvent::Cancel => EditorOutcome::Cancel,
                        TextInputEvent::Submit => match self.selection() {
                            Ok(selection) => EditorOutcome::Apply(selection),
                            Err(message) => {
                                self.error = Some(message);
                                EditorOutcome::Pending
                            }
                        },
                        TextInputEvent::None => {
                            self.error = None;
                            EditorOutcome::Pending
                        }
                    }
                }
            },
            EditorBody::Values {
                options,
                checked,
                cursor,
            } => match event.code {
                KeyCode::Esc => EditorOutcome::Cancel,
                KeyCode::Up | KeyCode::Char('k') => {
                    *cursor = cursor.saturating_sub(1);
                    EditorOutcome::Pending
                }
                KeyCode::Down | KeyCode::Char('j') => {
                    if *cursor + 1 < options.len() {
                        *cursor += 1;
                    }
                    EditorOutcome::Pending
                }
                KeyCode::Char(' ') => {
                    if let Some(c) = checked.get_mut(*cursor) {
                        *c = !*c;
                    }
                    EditorOutcome::Pending
                }
                KeyCode::Char('a') => {
                    let all = checked.iter().all(|c| *c);
                    checked.iter_mut().for_each(|c| *c = !all);
                    EditorOutcome::Pending
                }
                KeyCode::Enter => match self.selection() {
                    Ok(selection) => EditorOutcome::Apply(selection),
                    Err(message) => {
                        self.error = Some(message);
                        EditorOutcome::Pending
                    }
                },
                _ => EditorOutcome::Pending,
            },
        }
    }

    /// Parses the current inputs. Empty range inputs fall back to the column bounds.
    pub fn selection(&self) -> Result<FilterSelection, String> {
        match &self.body {
            EditorBody::Range {
                temporal,
                bounds,
                lower,
                upper,
                ..
            } => {
                let Some((min, max)) = bounds else {
                    return Ok(FilterSelection::Reset);
                };
                let lo = if lower.is_empty() { min.as_str() } else { lower.value() };
                let hi = if upper.is_empty() { max.as_str() } else { upper.value() };
                if *temporal {
                    Ok(FilterSelection::DateRange(parse_date(lo)?, parse_date(hi)?))
                } else {
                    Ok(FilterSelection::Range(parse_number(lo)?, parse_number(hi)?))
                }
            }
            EditorBody::Values {
                options, checked, ..
            } => Ok(FilterSelection::Values(
                options
                    .iter()
                    .zip(checked)
                    .filter(|(_, c)| **c)
                    .map(|(o, _)| o.clone())
                    .collect(),
            )),
        }
    }

    /// Height the popup needs for its body, excluding borders.
    pub fn preferred_height(&self) -> u16 {
        match &self.body {
            EditorBody::Range { .. } => 7,
            EditorBody::Values { options, .. } => (options.len() as u16).clamp(1, 15) + 3,
        }
    }

    pub fn render(&self, area: Rect, buf: &mut Buffer, theme: &Theme) {
        Clear.render(area, buf);
        let border = if self.error.is_some() {
            theme.get("modal_border_error")
        } else {
            theme.get("modal_border_active")
        };
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(format!(" Filter: {} ", self.column));
        let inner = block.inner(area);
        block.render(area, buf);

        let layout = Layout::new(
            Direction::Vertical,
            [Constraint::Fill(1), Constraint::Length(1), Constraint::Length(1)],
        )
        .split(inner);
        let hint_style = Style::default().fg(theme.get("dimmed"));

        match &self.body {
            EditorBody::Range {
                temporal,
                bounds,
                lower,
                upper,
                ..
            } => {
                let rows = Layout::new(
                    Direction::Vertical,
                    [
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Length(1),
                        Constraint::Fill(1),
                    ],
                )
                .split(layout[0]);
                let range = match bounds {
                    Some((min, max)) => format!("Range: {} to {}", min, max),
                    None => "Column has no values".to_string(),
                };
                Paragraph::new(range).style(hint_style).render(rows[0], buf);
                let (lo_label, hi_label) = if *temporal {
                    ("From", "To")
                } else {
                    ("Min", "Max")
                };
                for (row, label, input) in [(rows[2], lo_label, lower), (rows[3], hi_label, upper)] {
                    let cols = Layout::new(
                        Direction::Horizontal,
                        [Constraint::Length(6), Constraint::Fill(1)],
                    )
                    .split(row);
                    let label_style = if input.is_focused() {
                        Style::default().fg(theme.get("primary"))
                    } else {
                        Style::default().fg(theme.get("text_secondary"))
                    };
                    Paragraph::new(label).style(label_style).render(cols[0], buf);
                    input.render(cols[1], buf);
                }
                Paragraph::new("Tab switch  Enter apply  Ctrl+R reset  Esc cancel")
                    .style(hint_style)
                    .render(layout[2], buf);
            }
            EditorBody::Values {
                options,
                checked,
                cursor,
            } => {
                let items: Vec<ListItem> = options
                    .iter()
                    .zip(checked)
                    .map(|(option, on)| {
                        let mark = if *on { "[x] " } else { "[ ] " };
                        ListItem::new(Line::from(vec![
                            Span::styled(mark, Style::default().fg(theme.get("primary"))),
                            Span::styled(option.clone(), Style::default().fg(theme.get("text_primary"))),
                        ]))
                    })
                    .collect();
                let mut state = ListState::default();
                if !options.is_empty() {
                    state.select(Some(*cursor));
                }
                StatefulWidget::render(
                    List::new(items).highlight_style(Style::default().add_modifier(Modifier::REVERSED)),
                    layout[0],
                    buf,
                    &mut state,
                );
                Paragraph::new("Space toggle  a all  Enter apply  Ctrl+R reset  Esc cancel")
                    .style(hint_style)
                    .render(layout[2], buf);
            }
        }

        if let Some(error) = &self.error {
            Paragraph::new(error.as_str())
                .style(Style::default().fg(theme.get("error")))
                .render(layout[1], buf);
        }
    }
}

fn range_body(
    temporal: bool,
    bounds: Option<(String, String)>,
    current: Option<(String, String)>,
    theme: &Theme,
) -> EditorBody {
    let mut lower = TextInput::new().with_theme(theme);
    let mut upper = TextInput::new().with_theme(theme);
    if let Some((lo, hi)) = current {
        lower.set_value(lo);
        upper.set_value(hi);
    }
    lower.set_focused(true);
    EditorBody::Range {
        temporal,
        bounds,
        lower,
        upper,
        focus: RangeFocus::Lower,
    }
}

fn parse_number(s: &str) -> Result<f64, String> {
    match s.trim().parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(format!("'{}' is not a number", s.trim())),
    }
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    parse_datetime_millis(s)
        .and_then(millis_to_date)
        .ok_or_else(|| format!("'{}' is not a date (expected YYYY-MM-DD)", s.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::build_filter_controls;
    use crate::table::{LoadOptions, Table};

    fn controls() -> Vec<FilterControl> {
        let csv = "city,price,day\nOslo,10,2024-01-01\nRome,25.5,2024-01-05\nOslo,40,2024-01-09\n";
        let mut table = Table::from_csv_bytes(csv.as_bytes(), &LoadOptions::default()).unwrap();
        build_filter_controls(&mut table).unwrap()
    }

    fn press(editor: &mut FilterEditor, code: KeyCode) -> EditorOutcome {
        editor.handle_key(&KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(editor: &mut FilterEditor, text: &str) {
        for c in text.chars() {
            press(editor, KeyCode::Char(c));
        }
    }

    fn clear_field(editor: &mut FilterEditor) {
        for _ in 0..20 {
            press(editor, KeyCode::Backspace);
        }
    }

    #[test]
    fn numeric_editor_starts_at_bounds() {
        let controls = controls();
        let editor = FilterEditor::open(&controls[1], &Theme::default());
        assert_eq!(editor.selection(), Ok(FilterSelection::Range(10.0, 40.0)));
    }

    #[test]
    fn numeric_editor_applies_typed_range() {
        let controls = controls();
        let mut editor = FilterEditor::open(&controls[1], &Theme::default());
        clear_field(&mut editor);
        type_text(&mut editor, "20");
        press(&mut editor, KeyCode::Tab);
        clear_field(&mut editor);
        type_text(&mut editor, "30");
        assert_eq!(
            press(&mut editor, KeyCode::Enter),
            EditorOutcome::Apply(FilterSelection::Range(20.0, 30.0))
        );
    }

    #[test]
    fn invalid_number_keeps_editor_open() {
        let controls = controls();
        let mut editor = FilterEditor::open(&controls[1], &Theme::default());
        clear_field(&mut editor);
        type_text(&mut editor, "abc");
        assert_eq!(press(&mut editor, KeyCode::Enter), EditorOutcome::Pending);
        assert!(editor.error.is_some());
    }

    #[test]
    fn date_editor_parses_dates() {
        let controls = controls();
        let mut editor = FilterEditor::open(&controls[2], &Theme::default());
        press(&mut editor, KeyCode::Tab);
        clear_field(&mut editor);
        type_text(&mut editor, "2024-01-05");
        let expected = FilterSelection::DateRange(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
        );
        assert_eq!(press(&mut editor, KeyCode::Enter), EditorOutcome::Apply(expected));
    }

    #[test]
    fn checklist_toggles_values() {
        let controls = controls();
        let mut editor = FilterEditor::open(&controls[0], &Theme::default());
        press(&mut editor, KeyCode::Down);
        press(&mut editor, KeyCode::Char(' '));
        assert_eq!(
            press(&mut editor, KeyCode::Enter),
            EditorOutcome::Apply(FilterSelection::Values(vec!["Rome".to_string()]))
        );
    }

    #[test]
    fn ctrl_r_resets_and_esc_cancels() {
        let controls = controls();
        let mut editor = FilterEditor::open(&controls[0], &Theme::default());
        assert_eq!(
            editor.handle_key(&KeyEvent::new(KeyCode::Char('r'), KeyModifiers::CONTROL)),
            EditorOutcome::Apply(FilterSelection::Reset)
        );
        assert_eq!(press(&mut editor, KeyCode::Esc), EditorOutcome::Cancel);
    }
}
