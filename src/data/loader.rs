//! CSV ingestion

use polars::prelude::*;
use std::io::Cursor;
use std::path::Path;

use crate::error::{CrashcastError, Result};

/// Rows scanned when inferring column types
const INFER_SCHEMA_ROWS: usize = 1000;

/// Parse CSV bytes with a header row into a DataFrame.
pub fn read_csv(bytes: &[u8]) -> Result<DataFrame> {
    if bytes.iter().all(|b| b.is_ascii_whitespace()) {
        return Err(CrashcastError::Data("CSV input is empty".to_string()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    Ok(df)
}

/// Read and parse a CSV file from disk.
pub fn read_csv_file(path: impl AsRef<Path>) -> Result<DataFrame> {
    let path = path.as_ref();
    let bytes = std::fs::read(path)
        .map_err(|e| CrashcastError::Data(format!("{}: {}", path.display(), e)))?;
    read_csv(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_csv() {
        let csv = b"Length,ADT,Crashes\n1.5,1000,3\n2.0,2500,7\n";
        let df = read_csv(csv).unwrap();
        assert_eq!(df.height(), 2);
        assert_eq!(df.width(), 3);
        let names: Vec<String> = df.get_column_names().iter().map(|s| s.to_string()).collect();
        assert_eq!(names, vec!["Length", "ADT", "Crashes"]);
    }

    #[test]
    fn test_read_csv_empty() {
        assert!(matches!(read_csv(b"   \n"), Err(CrashcastError::Data(_))));
    }

    #[test]
    fn test_read_missing_file() {
        let result = read_csv_file("/definitely/not/here.csv");
        assert!(matches!(result, Err(CrashcastError::Data(_))));
    }
}
