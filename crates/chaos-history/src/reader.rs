//! History file reader.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::{HistoryError, HistoryRecord, Result};

/// Reads every record of a history file, in file order. Blank lines are
/// skipped.
pub fn read_history(path: impl AsRef<Path>) -> Result<Vec<HistoryRecord>> {
    let path = path.as_ref();
    let io_err = |source| HistoryError::Io {
        path: path.to_path_buf(),
        source,
    };

    let reader = BufReader::new(File::open(path).map_err(io_err)?);
    let mut records = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(io_err)?;
        if line.trim().is_empty() {
            continue;
        }

        let record = serde_json::from_str(&line).map_err(|source| HistoryError::Decode {
            path: path.to_path_buf(),
            line: index + 1,
            source,
        })?;
        records.push(record);
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn reports_line_of_malformed_record() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("history.log");
        std::fs::write(
            &path,
            concat!(
                r#"{"kind":"invoke","proc_id":1,"node":"n1","timestamp":"2026-01-01T00:00:00Z","request":1}"#,
                "\n\n",
                "not json\n"
            ),
        )
        .unwrap();

        let err = read_history(&path).unwrap_err();
        assert!(matches!(err, HistoryError::Decode { line: 3, .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let temp = TempDir::new().unwrap();
        let err = read_history(temp.path().join("nope.log")).unwrap_err();
        assert!(matches!(err, HistoryError::Io { .. }));
    }
}
