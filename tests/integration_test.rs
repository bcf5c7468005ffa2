use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use csvdash::{App, AppEvent, ChartKind, InputMode, SessionSettings, Tab};
use ratatui::{buffer::Buffer, layout::Rect, widgets::Widget};
use tempfile::TempDir;

mod common;
use common::{write_csv, SALES_CSV};

fn press(app: &mut App, code: KeyCode) {
    let mut next = app.event(&AppEvent::Key(KeyEvent::new(code, KeyModifiers::NONE)));
    while let Some(event) = next {
        next = app.event(&event);
    }
}

fn screen(app: &mut App) -> String {
    let area = Rect::new(0, 0, 140, 40);
    let mut buf = Buffer::empty(area);
    app.render(area, &mut buf);
    buf.content().iter().map(|c| c.symbol()).collect()
}

#[test]
fn test_app_creation() {
    let mut app = App::new(SessionSettings::default());
    assert_eq!(app.input_mode(), &InputMode::Normal);
    assert_eq!(app.tab(), Tab::Preview);
    assert!(screen(&mut app).contains("No data loaded"));
}

#[test]
fn test_full_workflow() {
    let dir = TempDir::new().unwrap();
    let csv_path = write_csv(dir.path(), "sales.csv", SALES_CSV);
    let export_dir = dir.path().join("exports");
    let settings = SessionSettings {
        export_dir: export_dir.clone(),
        ..SessionSettings::default()
    };
    let mut app = App::new(settings);

    // 1. Open the file through the prompt
    press(&mut app, KeyCode::Char('o'));
    for c in csv_path.to_string_lossy().chars() {
        press(&mut app, KeyCode::Char(c));
    }
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.session().row_counts(), (12, 12));
    let text = screen(&mut app);
    assert!(text.contains("region"));
    assert!(text.contains("Rows: 12 / 12"));

    // 2. Summary tab
    press(&mut app, KeyCode::Tab);
    assert_eq!(app.tab(), Tab::Summary);
    assert!(screen(&mut app).contains("mean"));

    // 3. Restrict region to "north" through the checklist editor
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.input_mode(), &InputMode::EditFilter);
    press(&mut app, KeyCode::Char(' '));
    press(&mut app, KeyCode::Enter);
    assert_eq!(app.input_mode(), &InputMode::Normal);
    assert_eq!(app.session().row_counts(), (3, 12));

    // 4. Export the filtered rows
    press(&mut app, KeyCode::Char('e'));
    let exported = std::fs::read_to_string(export_dir.join("filtered_data.csv")).unwrap();
    assert_eq!(exported.lines().count(), 4);
    assert!(exported.lines().skip(1).all(|l| l.starts_with("north,")));

    // 5. Switch the plot kind to Pie and generate
    let filters = app.session().controls().len();
    for _ in 0..filters + 2 {
        press(&mut app, KeyCode::Down);
    }
    for _ in 0..5 {
        press(&mut app, KeyCode::Right);
    }
    assert_eq!(app.session().chart_controls().kind, ChartKind::Pie);
    press(&mut app, KeyCode::Char('g'));
    assert_eq!(app.tab(), Tab::Chart);
    assert!(app.session().chart().is_some() || app.session().chart_error().is_some());

    // 6. Reset brings every row back and discards the chart
    press(&mut app, KeyCode::Char('r'));
    assert_eq!(app.session().row_counts(), (12, 12));
    assert!(app.session().chart().is_none());

    // 7. Quit
    let exit = app.event(&AppEvent::Key(KeyEvent::new(
        KeyCode::Char('q'),
        KeyModifiers::NONE,
    )));
    assert!(matches!(exit, Some(AppEvent::Exit)));
}

#[test]
fn test_bad_file_shows_error_and_keeps_table() {
    let dir = TempDir::new().unwrap();
    let good = write_csv(dir.path(), "good.csv", SALES_CSV);
    let bad = write_csv(dir.path(), "bad.csv", "");
    let mut app = App::new(SessionSettings::default());

    app.event(&AppEvent::Open(good));
    app.event(&AppEvent::Open(bad));
    assert!(app.error_message().unwrap().contains("empty"));
    assert!(screen(&mut app).contains("Error"));
    assert_eq!(app.session().source(), Some("good.csv"));

    press(&mut app, KeyCode::Esc);
    assert!(app.error_message().is_none());
}
