//! Downloadable byte streams: filtered data as CSV, plus writing any download to disk.

use color_eyre::Result;
use polars::prelude::*;
use std::path::{Path, PathBuf};

pub const FILTERED_DATA_FILE: &str = "filtered_data.csv";
pub const PLOT_HTML_FILE: &str = "plot.html";
pub const PLOT_PNG_FILE: &str = "plot.png";

/// One-shot named byte stream offered for saving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Download {
    pub file_name: &'static str,
    pub mime: &'static str,
    pub bytes: Vec<u8>,
}

impl Download {
    pub fn new(file_name: &'static str, mime: &'static str, bytes: Vec<u8>) -> Self {
        Self {
            file_name,
            mime,
            bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Writes the bytes to `dir/file_name`, creating `dir` if needed. Returns the written path.
    pub fn save_to(&self, dir: &Path) -> Result<PathBuf> {
        if !dir.exists() {
            std::fs::create_dir_all(dir)?;
        }
        let path = dir.join(self.file_name);
        std::fs::write(&path, &self.bytes)?;
        tracing::info!(path = %path.display(), bytes = self.bytes.len(), "saved download");
        Ok(path)
    }
}

/// Serializes a frame as UTF-8 CSV with a header row and no index column.
pub fn dataframe_to_csv_bytes(df: &DataFrame) -> PolarsResult<Vec<u8>> {
    let mut df = df.clone();
    let mut buf: Vec<u8> = Vec::new();
    CsvWriter::new(&mut buf)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    Ok(buf)
}

/// `filtered_data.csv` download for the filtered subset.
pub fn filtered_data_download(df: &DataFrame) -> PolarsResult<Download> {
    Ok(Download::new(
        FILTERED_DATA_FILE,
        "text/csv",
        dataframe_to_csv_bytes(df)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_has_header_and_no_index() {
        let df = df!("a" => &[1_i64, 2], "b" => &["x", "y"]).unwrap();
        let download = filtered_data_download(&df).unwrap();
        assert_eq!(download.file_name, "filtered_data.csv");
        assert_eq!(download.mime, "text/csv");
        let text = String::from_utf8(download.bytes).unwrap();
        assert_eq!(text, "a,b\n1,x\n2,y\n");
    }

    #[test]
    fn empty_frame_still_has_header() {
        let df = df!("a" => &[1_i64], "b" => &["x"]).unwrap().head(Some(0));
        let text = String::from_utf8(dataframe_to_csv_bytes(&df).unwrap()).unwrap();
        assert_eq!(text, "a,b\n");
    }

    #[test]
    fn save_to_creates_directory() {
        let dir = tempfile::tempdir().expect("temp dir");
        let target = dir.path().join("nested");
        let download = Download::new(PLOT_HTML_FILE, "text/html", b"<html></html>".to_vec());
        let path = download.save_to(&target).unwrap();
        assert_eq!(path, target.join("plot.html"));
        assert_eq!(std::fs::read(&path).unwrap(), b"<html></html>");
    }
}
