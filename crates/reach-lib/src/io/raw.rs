use crate::error::{CurateError, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Cell contents treated as a missing value (compared case-insensitively).
const MISSING_MARKERS: [&str; 7] = ["", "nan", "na", "n/a", "#n/a", "null", "none"];

/// Marker in a file name identifying an already curated export.
pub const CURATED_MARKER: &str = "selected";

/// One raw sample; `None` cells are missing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub line: u64,
    pub cells: Vec<Option<String>>,
}

impl RawRow {
    pub fn is_complete(&self) -> bool {
        self.cells.iter().all(Option::is_some)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

pub fn is_missing(cell: &str) -> bool {
    let trimmed = cell.trim();
    MISSING_MARKERS
        .iter()
        .any(|marker| trimmed.eq_ignore_ascii_case(marker))
}

/// True when `cell` parses as a number, i.e. the row holding it is data rather than a header.
pub fn looks_numeric(cell: &str) -> bool {
    let trimmed = cell.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok()
}

/// Whether a path names a previously curated export.
pub fn is_curated(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.contains(CURATED_MARKER))
        .unwrap_or(false)
}

/// Curated exports are comma-separated, raw recordings tab-separated.
pub fn delimiter_for(path: &Path) -> u8 {
    if is_curated(path) {
        b','
    } else {
        b'\t'
    }
}

pub fn read_raw_table(path: &Path, headers: Option<&[String]>) -> Result<RawTable> {
    let file = File::open(path).map_err(|e| CurateError::io(path, e))?;
    let table = parse_raw_table(file, headers, delimiter_for(path))?;
    log::info!(
        "read {} raw rows with {} columns from {}",
        table.rows.len(),
        table.headers.len(),
        path.display()
    );
    Ok(table)
}

/// Read a delimited table.
///
/// With `headers`, the file is treated as headerless unless its first row is text, in
/// which case that row is skipped. Without, the first row is the header.
pub fn parse_raw_table<R: Read>(
    reader: R,
    headers: Option<&[String]>,
    delimiter: u8,
) -> Result<RawTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(headers.is_none())
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);

    let (names, mut records) = match headers {
        Some(names) => {
            let records = collect_records(&mut reader)?;
            (names.to_vec(), records)
        }
        None => {
            let names: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
            (names, collect_records(&mut reader)?)
        }
    };

    if headers.is_some() {
        let first_is_header = records
            .first()
            .map(|(_, rec)| !rec.get(0).map(looks_numeric).unwrap_or(false))
            .unwrap_or(false);
        if first_is_header {
            log::debug!("first row is a header row, skipping it");
            records.remove(0);
        }
        if let Some((line, record)) = records.first() {
            if record.len() != names.len() {
                return Err(width_error(names.len(), *line, record.len()));
            }
        }
    }

    // Rows may be short (their cells count as missing), never wide.
    if let Some((line, record)) = records.iter().find(|(_, rec)| rec.len() > names.len()) {
        return Err(width_error(names.len(), *line, record.len()));
    }

    let width = names.len();
    let rows = records
        .into_iter()
        .map(|(line, record)| RawRow {
            line,
            cells: (0..width)
                .map(|idx| {
                    record
                        .get(idx)
                        .filter(|cell| !is_missing(cell))
                        .map(str::to_string)
                })
                .collect(),
        })
        .collect();
    Ok(RawTable {
        headers: names,
        rows,
    })
}

pub(crate) fn width_error(columns: usize, line: u64, found: usize) -> CurateError {
    CurateError::schema(
        "Header",
        format!("{} columns but line {} has {}", columns, line, found),
    )
}

fn collect_records<R: Read>(reader: &mut csv::Reader<R>) -> Result<Vec<(u64, StringRecord)>> {
    let mut out = Vec::new();
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        out.push((line, record));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn numeric_probe() {
        assert!(looks_numeric("12"));
        assert!(looks_numeric(" -3.5e2 "));
        assert!(!looks_numeric("trial_no"));
        assert!(!looks_numeric(""));
    }

    #[test]
    fn missing_markers() {
        assert!(is_missing(""));
        assert!(is_missing("NaN"));
        assert!(is_missing(" NA "));
        assert!(!is_missing("0"));
    }

    #[test]
    fn delimiter_follows_file_name() {
        assert_eq!(delimiter_for(&PathBuf::from("/data/s01.txt")), b'\t');
        assert_eq!(delimiter_for(&PathBuf::from("/data/s01_selected.csv")), b',');
        assert!(!is_curated(&PathBuf::from("/selected/s01.txt")));
    }

    #[test]
    fn configured_headers_on_headerless_file() {
        let text = "1\t0\t10\n1\t5\t11\n";
        let table =
            parse_raw_table(text.as_bytes(), Some(&names(&["trial_no", "time_ms", "x"])), b'\t')
                .unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].cells[2].as_deref(), Some("10"));
    }

    #[test]
    fn configured_headers_skip_text_header_row() {
        let text = "trial\ttime\tx\n1\t0\t10\n";
        let table =
            parse_raw_table(text.as_bytes(), Some(&names(&["trial_no", "time_ms", "x"])), b'\t')
                .unwrap();
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].cells[0].as_deref(), Some("1"));
    }

    #[test]
    fn header_count_mismatch_is_schema_error() {
        let text = "1\t0\t10\t99\n";
        let err = parse_raw_table(text.as_bytes(), Some(&names(&["trial_no", "time_ms"])), b'\t')
            .unwrap_err();
        assert!(matches!(err, CurateError::Schema { ref column, .. } if column == "Header"));
    }

    #[test]
    fn short_rows_become_missing_cells() {
        let text = "trial_no\ttime_ms\tx\n1\t0\t10\n1\t5\n1\t10\tnan\n";
        let table = parse_raw_table(text.as_bytes(), None, b'\t').unwrap();
        assert_eq!(table.headers, names(&["trial_no", "time_ms", "x"]));
        let complete: Vec<bool> = table.rows.iter().map(RawRow::is_complete).collect();
        assert_eq!(complete, vec![true, false, false]);
    }

    #[test]
    fn wide_row_under_file_header_is_schema_error() {
        let text = "trial_no\ttime_ms\tx\n1\t0\t10\t999\t888\n";
        let err = parse_raw_table(text.as_bytes(), None, b'\t').unwrap_err();
        match err {
            CurateError::Schema { column, message } => {
                assert_eq!(column, "Header");
                assert!(message.contains("line 2 has 5"), "{}", message);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
