#![allow(dead_code)]

use csvdash::{Session, SessionSettings};
use std::path::{Path, PathBuf};

/// Twelve sales rows covering numeric, date, categorical and boolean columns, with one row
/// missing its amount.
pub const SALES_CSV: &str = "\
region,product,amount,units,sold_on,returned
north,widget,120.5,3,2024-01-03,false
south,gadget,80,2,2024-01-05,false
east,widget,42.25,1,2024-01-08,true
west,gizmo,300,6,2024-01-13,false
north,gadget,,4,2024-01-15,false
south,widget,55,2,2024-01-21,true
east,gizmo,210,5,2024-01-22,false
west,widget,99.9,3,2024-02-02,false
north,gizmo,15,1,2024-02-09,false
south,gadget,130,4,2024-02-14,true
east,widget,75,2,2024-02-20,false
west,gadget,180,3,2024-02-29,false
";

pub fn write_csv(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn session_with(csv: &str) -> Session {
    let mut session = Session::new(SessionSettings::default());
    session.upload("test.csv", csv.as_bytes()).unwrap();
    session
}

pub fn sales_session() -> Session {
    session_with(SALES_CSV)
}

/// Values of a string column of the filtered subset, nulls skipped.
pub fn filtered_strings(session: &Session, column: &str) -> Vec<String> {
    session
        .filtered()
        .column(column)
        .unwrap()
        .as_materialized_series()
        .cast(&polars::prelude::DataType::String)
        .unwrap()
        .str()
        .unwrap()
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect()
}
