use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for csvdash
#[derive(Clone, Parser, Debug)]
#[command(
    name = "csvdash",
    version,
    about = "Interactive CSV exploration, filtering and charting in the terminal"
)]
pub struct Args {
    /// Path to the CSV file to open. When omitted, use the open-file prompt (o) inside the app.
    #[arg(value_name = "PATH")]
    pub path: Option<PathBuf>,

    /// Field delimiter to use when reading a file (single byte, default ',')
    #[arg(long = "delimiter", value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,

    /// Specify that the file has no header
    #[arg(long = "no-header", action)]
    pub no_header: bool,

    /// Skip this many rows when reading a file
    #[arg(long = "skip-rows")]
    pub skip_rows: Option<usize>,

    /// Directory that exported files (filtered_data.csv, plot.html, plot.png) are written to
    #[arg(long = "export-dir", value_name = "DIR")]
    pub export_dir: Option<PathBuf>,

    /// Number of rows shown in the data preview (default: 5)
    #[arg(long = "preview-rows")]
    pub preview_rows: Option<usize>,

    /// Enable debug logging to the cache directory
    #[arg(long = "debug", action)]
    pub debug: bool,

    /// Generate default configuration file at ~/.config/csvdash/config.toml
    #[arg(long = "generate-config", action)]
    pub generate_config: bool,

    /// Force overwrite existing config file when using --generate-config
    #[arg(long = "force", requires = "generate_config", action)]
    pub force: bool,

    /// Clear all cache data (logs) and exit
    #[arg(long = "clear-cache", action)]
    pub clear_cache: bool,
}

/// Accepts a single ASCII character (or the escape `\t`) as delimiter.
fn parse_delimiter(s: &str) -> Result<u8, String> {
    match s {
        "\\t" | "tab" => Ok(b'\t'),
        _ => {
            let bytes = s.as_bytes();
            if bytes.len() == 1 && bytes[0].is_ascii() {
                Ok(bytes[0])
            } else {
                Err(format!(
                    "delimiter must be a single ASCII character, got '{}'",
                    s
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_delimiter() {
        assert_eq!(parse_delimiter(","), Ok(b','));
        assert_eq!(parse_delimiter(";"), Ok(b';'));
        assert_eq!(parse_delimiter("\\t"), Ok(b'\t'));
        assert_eq!(parse_delimiter("tab"), Ok(b'\t'));
        assert!(parse_delimiter(",,").is_err());
        assert!(parse_delimiter("").is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["csvdash", "data.csv", "--delimiter", ";", "--no-header"]);
        assert_eq!(args.path, Some(PathBuf::from("data.csv")));
        assert_eq!(args.delimiter, Some(b';'));
        assert!(args.no_header);
        assert!(!args.debug);
    }

    #[test]
    fn test_force_requires_generate_config() {
        assert!(Args::try_parse_from(["csvdash", "--force"]).is_err());
        assert!(Args::try_parse_from(["csvdash", "--generate-config", "--force"]).is_ok());
    }
}
