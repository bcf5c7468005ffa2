use color_eyre::Result;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::path::PathBuf;

use ratatui::layout::{Constraint, Direction, Layout};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};

use ratatui::widgets::{Block, BorderType, Borders, Clear, Paragraph, StatefulWidget, Tabs, Wrap};

pub mod cache;
pub mod chart;
pub mod chart_export;
pub mod config;
pub mod error;
pub mod export;
pub mod filter;
pub mod filter_editor;
pub mod logging;
pub mod session;
pub mod statistics;
pub mod table;
pub mod widgets;

pub use cache::CacheManager;
pub use chart::{build_chart, ChartArtifact, ChartData, ChartKind, ChartOptions, ChartRequest};
pub use chart_export::{render_chart, ChartExports};
pub use config::{
    rgb_to_256_color, rgb_to_basic_ansi, AppConfig, ColorParser, ConfigManager, Theme,
};
pub use csvdash_cli::Args;
pub use error::{ChartConstructionError, FilterError, ParseError};
pub use export::Download;
pub use filter::{
    apply_filters, filtered_subset, FilterControl, FilterPredicate, FilterSelection, FilterState,
};
pub use session::{ChartControls, DownloadKind, Session, SessionSettings};
pub use table::{ColumnKind, LoadOptions, Table};

use filter_editor::{EditorOutcome, FilterEditor};
use widgets::chart_view::ChartView;
use widgets::controls::Controls;
use widgets::data_view::{DataView, DataViewState};
use widgets::sidebar::{Sidebar, SidebarItem};
use widgets::text_input::{TextInput, TextInputEvent};

/// Application name used for cache directory and other app-specific paths
pub const APP_NAME: &str = "csvdash";

pub enum AppEvent {
    Key(KeyEvent),
    Open(PathBuf),
    Export(DownloadKind),
    GenerateChart,
    Exit,
    Crash(String),
    Resize(u16, u16), // resized (width, height)
}

#[derive(Debug, Default, PartialEq, Eq)]
pub enum InputMode {
    #[default]
    Normal,
    OpenFile,
    EditFilter,
}

/// Main view shown next to the sidebar.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Tab {
    #[default]
    Preview,
    Summary,
    Filtered,
    Chart,
}

impl Tab {
    pub const ALL: [Tab; 4] = [Tab::Preview, Tab::Summary, Tab::Filtered, Tab::Chart];

    pub fn title(self) -> &'static str {
        match self {
            Tab::Preview => "Preview",
            Tab::Summary => "Summary",
            Tab::Filtered => "Filtered Data",
            Tab::Chart => "Chart",
        }
    }

    fn index(self) -> usize {
        Self::ALL.iter().position(|t| *t == self).unwrap_or(0)
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }

    pub fn prev(self) -> Self {
        Self::ALL[(self.index() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

#[derive(Default)]
pub struct ErrorModal {
    pub active: bool,
    pub message: String,
}

impl ErrorModal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn show(&mut self, message: String) {
        self.active = true;
        self.message = message;
    }

    pub fn hide(&mut self) {
        self.active = false;
        self.message.clear();
    }
}

pub struct App {
    session: Session,
    theme: Theme,
    tab: Tab,
    selected: usize,
    sidebar_width: u16,
    input_mode: InputMode,
    open_input: TextInput,
    filter_editor: Option<FilterEditor>,
    error_modal: ErrorModal,
    status: Option<String>,
    preview_view: DataViewState,
    summary_view: DataViewState,
    filtered_view: DataViewState,
}

impl App {
    pub fn new(settings: SessionSettings) -> App {
        Self::new_with_theme(settings, Theme::default(), 36)
    }

    pub fn new_with_theme(settings: SessionSettings, theme: Theme, sidebar_width: u16) -> App {
        let open_input = TextInput::new().with_theme(&theme);
        App {
            session: Session::new(settings),
            theme,
            tab: Tab::default(),
            selected: 0,
            sidebar_width,
            input_mode: InputMode::Normal,
            open_input,
            filter_editor: None,
            error_modal: ErrorModal::new(),
            status: None,
            preview_view: DataViewState::default(),
            summary_view: DataViewState::default(),
            filtered_view: DataViewState::default(),
        }
    }

    /// Builds the app from a validated configuration and command-line arguments.
    pub fn from_config(args: &Args, config: &AppConfig) -> Result<App> {
        let theme = Theme::from_config(&config.theme)?;
        let settings = SessionSettings::from_args_and_config(args, config);
        Ok(Self::new_with_theme(
            settings,
            theme,
            config.display.sidebar_width,
        ))
    }

    fn color(&self, name: &str) -> Color {
        self.theme.get(name)
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn tab(&self) -> Tab {
        self.tab
    }

    pub fn input_mode(&self) -> &InputMode {
        &self.input_mode
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_modal
            .active
            .then_some(self.error_modal.message.as_str())
    }

    fn sidebar_item(&self) -> SidebarItem {
        SidebarItem::at(self.selected, self.session.controls().len())
    }

    pub fn event(&mut self, event: &AppEvent) -> Option<AppEvent> {
        match event {
            AppEvent::Key(key) => self.key(key),
            AppEvent::Open(path) => {
                match self.session.open_path(path) {
                    Ok(()) => {
                        let (rows, _) = self.session.row_counts();
                        let columns = self.session.controls().len();
                        self.status = Some(format!(
                            "Loaded {} ({} rows, {} columns)",
                            path.display(),
                            rows,
                            columns
                        ));
                        self.selected = 0;
                        self.tab = Tab::Preview;
                        self.preview_view.reset();
                        self.summary_view.reset();
                        self.filtered_view.reset();
                    }
                    Err(e) => self.error_modal.show(e.to_string()),
                }
                None
            }
            AppEvent::Export(kind) => {
                match self.session.save_download(*kind) {
                    Ok(path) => {
                        self.status = Some(format!("Saved {} to {}", kind.as_str(), path.display()))
                    }
                    Err(e) => self.error_modal.show(e.to_string()),
                }
                None
            }
            AppEvent::GenerateChart => {
                if self.session.table().is_none() {
                    self.error_modal
                        .show("Open a CSV file before generating a chart".to_string());
                    return None;
                }
                self.session.generate_chart();
                self.tab = Tab::Chart;
                self.status = match self.session.chart_error() {
                    Some(e) => Some(format!("Chart failed: {}", e)),
                    None => self.session.chart().map(|c| format!("Generated {}", c.title)),
                };
                None
            }
            AppEvent::Resize(_, _) | AppEvent::Exit | AppEvent::Crash(_) => None,
        }
    }

    fn key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        // Handle error modal first - it has highest priority
        if self.error_modal.active {
            if matches!(event.code, KeyCode::Esc | KeyCode::Enter) {
                self.error_modal.hide();
            }
            return None;
        }

        match self.input_mode {
            InputMode::OpenFile => return self.open_file_key(event),
            InputMode::EditFilter => {
                self.filter_editor_key(event);
                return None;
            }
            InputMode::Normal => {}
        }

        if event.modifiers.contains(KeyModifiers::CONTROL) && event.code == KeyCode::Char('c') {
            return Some(AppEvent::Exit);
        }

        match event.code {
            KeyCode::Char('q') => Some(AppEvent::Exit),
            KeyCode::Tab => {
                self.tab = self.tab.next();
                None
            }
            KeyCode::BackTab => {
                self.tab = self.tab.prev();
                None
            }
            KeyCode::Char(c @ '1'..='4') => {
                self.tab = Tab::ALL[(c as usize) - ('1' as usize)];
                None
            }
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
                None
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = SidebarItem::count(self.session.controls().len()) - 1;
                self.selected = (self.selected + 1).min(last);
                None
            }
            KeyCode::Enter => self.activate_sidebar_item(),
            KeyCode::Left => {
                self.cycle_chart_control(false);
                None
            }
            KeyCode::Right => {
                self.cycle_chart_control(true);
                None
            }
            KeyCode::Char('r') => {
                if let Err(e) = self.session.reset_filters() {
                    self.error_modal.show(e.to_string());
                } else {
                    self.filtered_view.reset();
                    self.status = Some("Filters reset".to_string());
                }
                None
            }
            KeyCode::Char('o') => {
                self.input_mode = InputMode::OpenFile;
                self.open_input.clear();
                self.open_input.set_focused(true);
                None
            }
            KeyCode::Char('g') => Some(AppEvent::GenerateChart),
            KeyCode::Char('e') => Some(AppEvent::Export(DownloadKind::FilteredData)),
            KeyCode::Char('h') => Some(AppEvent::Export(DownloadKind::PlotHtml)),
            KeyCode::Char('p') => Some(AppEvent::Export(DownloadKind::PlotPng)),
            KeyCode::PageDown => {
                if let Some(view) = self.active_view() {
                    view.page_down();
                }
                None
            }
            KeyCode::PageUp => {
                if let Some(view) = self.active_view() {
                    view.page_up();
                }
                None
            }
            KeyCode::Char('>') => {
                if let Some(view) = self.active_view() {
                    view.scroll_right();
                }
                None
            }
            KeyCode::Char('<') => {
                if let Some(view) = self.active_view() {
                    view.scroll_left();
                }
                None
            }
            _ => None,
        }
    }

    fn active_view(&mut self) -> Option<&mut DataViewState> {
        match self.tab {
            Tab::Preview => Some(&mut self.preview_view),
            Tab::Summary => Some(&mut self.summary_view),
            Tab::Filtered => Some(&mut self.filtered_view),
            Tab::Chart => None,
        }
    }

    fn open_file_key(&mut self, event: &KeyEvent) -> Option<AppEvent> {
        match self.open_input.handle_key(event) {
            TextInputEvent::Submit => {
                let path = self.open_input.value().trim().to_string();
                if path.is_empty() {
                    return None;
                }
                self.input_mode = InputMode::Normal;
                self.open_input.set_focused(false);
                Some(AppEvent::Open(PathBuf::from(path)))
            }
            TextInputEvent::Cancel => {
                self.input_mode = InputMode::Normal;
                self.open_input.set_focused(false);
                None
            }
            TextInputEvent::None => None,
        }
    }

    fn filter_editor_key(&mut self, event: &KeyEvent) {
        let Some(editor) = self.filter_editor.as_mut() else {
            self.input_mode = InputMode::Normal;
            return;
        };
        match editor.handle_key(event) {
            EditorOutcome::Pending => {}
            EditorOutcome::Cancel => self.close_filter_editor(),
            EditorOutcome::Apply(selection) => {
                let column = editor.column.clone();
                match self.session.set_filter(&column, selection) {
                    Ok(()) => {
                        let (rows, total) = self.session.row_counts();
                        self.status = Some(format!("{} of {} rows match", rows, total));
                        self.filtered_view.reset();
                        self.close_filter_editor();
                    }
                    Err(e) => {
                        if let Some(editor) = self.filter_editor.as_mut() {
                            editor.error = Some(e.to_string());
                        }
                    }
                }
            }
        }
    }

    fn close_filter_editor(&mut self) {
        self.filter_editor = None;
        self.input_mode = InputMode::Normal;
    }

    fn activate_sidebar_item(&mut self) -> Option<AppEvent> {
        match self.sidebar_item() {
            SidebarItem::Filter(i) => {
                if let Some(control) = self.session.controls().get(i) {
                    self.filter_editor = Some(FilterEditor::open(control, &self.theme));
                    self.input_mode = InputMode::EditFilter;
                }
                None
            }
            SidebarItem::ChartX | SidebarItem::ChartY | SidebarItem::ChartKind => {
                self.cycle_chart_control(true);
                None
            }
            SidebarItem::Generate => Some(AppEvent::GenerateChart),
        }
    }

    /// Steps the focused plot control to the next or previous choice, wrapping around.
    fn cycle_chart_control(&mut self, forward: bool) {
        let item = self.sidebar_item();
        if item == SidebarItem::ChartKind {
            let kind = self.session.chart_controls().kind;
            self.session
                .set_chart_kind(if forward { kind.next() } else { kind.prev() });
            return;
        }
        let current = match item {
            SidebarItem::ChartX => self.session.chart_controls().x.clone(),
            SidebarItem::ChartY => self.session.chart_controls().y.clone(),
            _ => return,
        };
        let Some(names) = self.session.table().map(|t| t.column_names()) else {
            return;
        };
        if names.is_empty() {
            return;
        }
        let position = current
            .and_then(|c| names.iter().position(|n| *n == c))
            .unwrap_or(0);
        let next = if forward {
            (position + 1) % names.len()
        } else {
            (position + names.len() - 1) % names.len()
        };
        match item {
            SidebarItem::ChartX => self.session.set_chart_x(&names[next]),
            _ => self.session.set_chart_y(&names[next]),
        }
    }

    fn render_main(&mut self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::new(
            Direction::Vertical,
            [Constraint::Length(1), Constraint::Fill(1)],
        )
        .split(area);

        let titles: Vec<Line> = Tab::ALL.iter().map(|t| Line::from(t.title())).collect();
        Tabs::new(titles)
            .select(self.tab.index())
            .style(Style::default().fg(self.color("text_secondary")))
            .highlight_style(
                Style::default()
                    .fg(self.color("primary"))
                    .add_modifier(Modifier::BOLD),
            )
            .render(layout[0], buf);

        let content = layout[1];
        if self.session.table().is_none() {
            Paragraph::new("No data loaded. Press o to open a CSV file.")
                .style(Style::default().fg(self.color("text_secondary")))
                .centered()
                .block(Block::default().borders(Borders::ALL))
                .render(content, buf);
            return;
        }

        let header_fg = self.color("table_header");
        let (rows, total) = self.session.row_counts();
        match self.tab {
            Tab::Preview => {
                if let Some(preview) = self.session.preview() {
                    let title = format!(
                        "First {} of {} rows",
                        preview.height(),
                        total
                    );
                    DataView::from_dataframe(&preview)
                        .with_title(title)
                        .with_header_fg(header_fg)
                        .render(content, buf, &mut self.preview_view);
                }
            }
            Tab::Summary => match self.session.summary() {
                Some(summary) => DataView::from_summary(summary)
                    .with_title("Summary statistics")
                    .with_header_fg(header_fg)
                    .render(content, buf, &mut self.summary_view),
                None => Paragraph::new("Summary unavailable for this table")
                    .centered()
                    .block(Block::default().borders(Borders::ALL))
                    .render(content, buf),
            },
            Tab::Filtered => {
                DataView::from_dataframe(self.session.filtered())
                    .with_title(format!("Filtered data: {} of {} rows", rows, total))
                    .with_header_fg(header_fg)
                    .with_empty_message("No rows match the current filters")
                    .render(content, buf, &mut self.filtered_view);
            }
            Tab::Chart => {
                ChartView::new(
                    self.session.chart(),
                    self.session.chart_error(),
                )
                .with_colors(
                    self.color("chart_series"),
                    self.color("text_primary"),
                    self.color("error"),
                )
                .render(content, buf);
            }
        }
    }

    fn render_open_prompt(&self, area: Rect, buf: &mut Buffer) {
        let popup = centered_rect_fixed(area, 70, 3);
        Clear.render(popup, buf);
        let block = Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(self.color("modal_border_active")))
            .title(" Open CSV file (Enter open, Esc cancel) ");
        let inner = block.inner(popup);
        block.render(popup, buf);
        (&self.open_input).render(inner, buf);
    }
}

impl Widget for &mut App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        let layout = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Fill(1),
                Constraint::Length(1), // Status
                Constraint::Length(1), // Controls
            ])
            .split(area);

        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Length(self.sidebar_width), Constraint::Fill(1)])
            .split(layout[0]);

        Sidebar::new(
            self.session.controls(),
            self.session.chart_controls(),
            self.selected,
        )
        .with_focused(self.input_mode == InputMode::Normal)
        .with_colors(
            self.color("primary"),
            self.color("text_primary"),
            self.color("text_secondary"),
        )
        .render(body[0], buf);

        self.render_main(body[1], buf);

        let status = match (&self.status, self.session.source()) {
            (Some(status), _) => status.clone(),
            (None, Some(source)) => source.to_string(),
            (None, None) => "csvdash".to_string(),
        };
        Paragraph::new(Line::from(Span::styled(
            status,
            Style::default().fg(self.color("text_secondary")),
        )))
        .render(layout[1], buf);

        let (rows, total) = self.session.row_counts();
        let mut controls = Controls::new()
            .with_theme(&self.theme)
            .with_dimmed(self.input_mode != InputMode::Normal || self.error_modal.active);
        if self.session.table().is_some() {
            controls = controls.with_row_counts(rows, total);
        }
        (&controls).render(layout[2], buf);

        match self.input_mode {
            InputMode::OpenFile => self.render_open_prompt(area, buf),
            InputMode::EditFilter => {
                if let Some(editor) = &self.filter_editor {
                    let popup = centered_rect_fixed(area, 60, editor.preferred_height() + 2);
                    editor.render(popup, buf, &self.theme);
                }
            }
            InputMode::Normal => {}
        }

        // Render error modal (has highest priority, shows on top of everything)
        if self.error_modal.active {
            let popup_area = centered_rect(area, 70, 40);
            Clear.render(popup_area, buf);
            let block = Block::default()
                .borders(Borders::ALL)
                .title("Error")
                .border_style(Style::default().fg(self.color("modal_border_error")));
            let inner_area = block.inner(popup_area);
            block.render(popup_area, buf);

            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Min(0), Constraint::Length(3)])
                .split(inner_area);

            Paragraph::new(self.error_modal.message.as_str())
                .style(Style::default().fg(self.color("error")))
                .wrap(Wrap { trim: true })
                .render(chunks[0], buf);

            let ok_style = Style::default().fg(self.color("modal_border_active"));
            Paragraph::new("[ OK ]")
                .centered()
                .block(
                    Block::default()
                        .borders(Borders::ALL)
                        .border_style(ok_style),
                )
                .render(chunks[1], buf);
        }
    }
}

fn centered_rect(r: Rect, percent_x: u16, percent_y: u16) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

/// Horizontally centered by percentage, vertically centered with a fixed height.
fn centered_rect_fixed(r: Rect, percent_x: u16, height: u16) -> Rect {
    let height = height.min(r.height);
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Fill(1),
            Constraint::Length(height),
            Constraint::Fill(1),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}
