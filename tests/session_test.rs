use csvdash::{ColumnKind, LoadOptions, ParseError, Session, SessionSettings};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;

mod common;
use common::{sales_session, SALES_CSV};

#[test]
fn preview_and_summary_after_upload() {
    let session = sales_session();
    let preview = session.preview().unwrap();
    assert_eq!(preview.height(), 5);
    assert_eq!(preview.width(), 6);

    let summary = session.summary().unwrap();
    let described: Vec<&str> = summary.columns.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(described, vec!["amount", "units"]);
    assert_eq!(summary.stats[0], "count");
    // amount has one missing value
    assert_eq!(summary.columns[0].values[0].as_deref(), Some("11.0"));
    assert_eq!(summary.columns[1].values[0].as_deref(), Some("12.0"));
}

#[test]
fn text_only_table_gets_categorical_summary() {
    let mut session = Session::new(SessionSettings::default());
    session
        .upload("pets.csv", b"pet,colour\ncat,black\ndog,brown\ncat,white\n")
        .unwrap();
    let summary = session.summary().unwrap();
    assert_eq!(summary.stats, vec!["count", "unique", "top", "freq"]);
    let pet = &summary.columns[0];
    assert_eq!(pet.name, "pet");
    assert_eq!(
        pet.values,
        vec![
            Some("3".to_string()),
            Some("2".to_string()),
            Some("cat".to_string()),
            Some("2".to_string())
        ]
    );
}

#[test]
fn empty_and_binary_uploads_are_rejected() {
    let mut session = sales_session();

    assert!(matches!(
        session.upload("blank.csv", b"  \n"),
        Err(ParseError::Empty)
    ));
    assert!(matches!(
        session.upload("binary.csv", &[b'a', b',', 0xff, 0xfe, b'\n']),
        Err(ParseError::Encoding { offset: 2 })
    ));
    // the earlier table is still loaded
    assert_eq!(session.source(), Some("test.csv"));
    assert_eq!(session.row_counts(), (12, 12));
}

#[test]
fn gzip_upload_is_decompressed() {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(SALES_CSV.as_bytes()).unwrap();
    let bytes = encoder.finish().unwrap();

    let mut session = Session::new(SessionSettings::default());
    session.upload("sales.csv.gz", &bytes).unwrap();
    assert_eq!(session.row_counts(), (12, 12));
}

#[test]
fn load_options_control_parsing() {
    let settings = SessionSettings {
        load: LoadOptions::default()
            .with_delimiter(b';')
            .with_has_header(false)
            .with_skip_rows(1),
        ..SessionSettings::default()
    };
    let mut session = Session::new(settings);
    session
        .upload("raw.csv", b"exported by tool\n1;x\n2;y\n3;z\n")
        .unwrap();
    assert_eq!(session.row_counts(), (3, 3));
    let kinds: Vec<ColumnKind> = session.controls().iter().map(|c| c.kind()).collect();
    assert_eq!(kinds, vec![ColumnKind::Numeric, ColumnKind::Categorical]);
}

#[test]
fn upload_resets_chart_controls() {
    let mut session = sales_session();
    session.set_chart_x("units");
    session.upload("pets.csv", b"pet,age\ncat,3\ndog,5\n").unwrap();
    assert_eq!(session.chart_controls().x.as_deref(), Some("pet"));
    assert_eq!(session.chart_controls().y.as_deref(), Some("age"));
    assert_eq!(session.source(), Some("pets.csv"));
}
