use crate::error::{CurateError, Result};
use crate::experiment::{Accept, CanonicalRow, Experiment, CANONICAL_COLUMNS};
use crate::io::raw::{is_missing, width_error};
use crate::io::{parse_number, parse_trial_id};
use crate::units::NormalizedTable;
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Columns that must be present in a curated table.
const REQUIRED: [&str; 8] = [
    "trial_no",
    "time_ms",
    "cursorx_cm",
    "cursory_cm",
    "handx_cm",
    "handy_cm",
    "targetx_cm",
    "targety_cm",
];

/// Read a previously curated (comma-separated, canonical units) table.
pub fn read_curated_table(path: &Path) -> Result<NormalizedTable> {
    let file = File::open(path).map_err(|e| CurateError::io(path, e))?;
    let table = parse_curated_table(file)?;
    log::info!(
        "read {} curated rows from {}",
        table.rows.len(),
        path.display()
    );
    Ok(table)
}

pub fn parse_curated_table<R: Read>(reader: R) -> Result<NormalizedTable> {
    let mut reader = ReaderBuilder::new()
        .delimiter(b',')
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(reader);
    let headers = reader.headers()?.clone();
    let columns = CuratedColumns::locate(&headers)?;

    let mut rows = Vec::new();
    let mut dropped = 0;
    for result in reader.records() {
        let record = result?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        if record.len() > headers.len() {
            return Err(width_error(headers.len(), line, record.len()));
        }
        let complete =
            (0..headers.len()).all(|idx| record.get(idx).map(|c| !is_missing(c)).unwrap_or(false));
        if !complete {
            dropped += 1;
            continue;
        }
        rows.push(columns.parse_row(&record, line)?);
    }
    if dropped > 0 {
        log::warn!("dropped {} curated rows with missing values", dropped);
    }
    if rows.is_empty() {
        return Err(CurateError::schema("trial_no", "curated table has no complete rows"));
    }
    Ok(NormalizedTable {
        rows,
        extra_columns: columns.extra_names,
        dropped,
    })
}

struct CuratedColumns {
    required: [usize; 8],
    accept: Option<usize>,
    max_velocity: Option<usize>,
    selected: Option<usize>,
    interpolated: Option<usize>,
    unsure: Option<usize>,
    extras: Vec<usize>,
    extra_names: Vec<String>,
}

impl CuratedColumns {
    fn locate(headers: &StringRecord) -> Result<Self> {
        let find = |name: &str| headers.iter().position(|h| h == name);
        let mut required = [0usize; 8];
        for (slot, name) in required.iter_mut().zip(REQUIRED) {
            *slot = find(name).ok_or_else(|| CurateError::schema(name, "column is missing"))?;
        }
        let (extras, extra_names) = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !CANONICAL_COLUMNS.contains(h))
            .map(|(idx, h)| (idx, h.to_string()))
            .unzip();
        Ok(Self {
            required,
            accept: find("accept"),
            max_velocity: find("max_velocity"),
            selected: find("selected"),
            interpolated: find("interpolated"),
            unsure: find("unsure"),
            extras,
            extra_names,
        })
    }

    fn parse_row(&self, record: &StringRecord, line: u64) -> Result<CanonicalRow> {
        let cell = |idx: usize| record.get(idx).unwrap_or_default();
        let number = |pos: usize| parse_number(REQUIRED[pos], line, cell(self.required[pos]));
        let flag = |name: &str, idx: Option<usize>, default: bool| -> Result<bool> {
            match idx {
                Some(idx) => Ok(parse_number(name, line, cell(idx))? != 0.0),
                None => Ok(default),
            }
        };

        let mut row = CanonicalRow::new(
            parse_trial_id("trial_no", line, cell(self.required[0]))?,
            number(1)?,
        );
        row.cursorx_cm = number(2)?;
        row.cursory_cm = number(3)?;
        row.handx_cm = number(4)?;
        row.handy_cm = number(5)?;
        row.targetx_cm = number(6)?;
        row.targety_cm = number(7)?;
        if let Some(idx) = self.accept {
            let code = parse_number("accept", line, cell(idx))?;
            row.accept = Accept::from_code(code as i64)
                .filter(|_| code.fract() == 0.0)
                .ok_or_else(|| {
                    CurateError::schema(
                        "accept",
                        format!("line {}: '{}' is not -1, 0 or 1", line, cell(idx)),
                    )
                })?;
        }
        row.max_velocity = flag("max_velocity", self.max_velocity, false)?;
        row.selected = flag("selected", self.selected, true)?;
        row.interpolated = flag("interpolated", self.interpolated, false)?;
        row.unsure = flag("unsure", self.unsure, false)?;
        row.extras = self.extras.iter().map(|&idx| cell(idx).to_string()).collect();
        Ok(row)
    }
}

/// Write the full output table: canonical columns first, then passthrough columns.
pub fn write_table(path: &Path, experiment: &Experiment) -> Result<()> {
    let file = File::create(path).map_err(|e| CurateError::io(path, e))?;
    write_table_to(file, experiment)?;
    log::info!("wrote {} rows to {}", experiment.len(), path.display());
    Ok(())
}

pub fn write_table_to<W: Write>(writer: W, experiment: &Experiment) -> Result<()> {
    let mut writer = WriterBuilder::new().delimiter(b',').from_writer(writer);
    let mut header: Vec<&str> = CANONICAL_COLUMNS.to_vec();
    header.extend(experiment.extra_columns().iter().map(String::as_str));
    writer.write_record(&header)?;
    for row in experiment.rows() {
        let mut record = vec![
            row.trial_no.to_string(),
            row.time_ms.to_string(),
            row.cursorx_cm.to_string(),
            row.cursory_cm.to_string(),
            row.handx_cm.to_string(),
            row.handy_cm.to_string(),
            row.targetx_cm.to_string(),
            row.targety_cm.to_string(),
            row.accept.code().to_string(),
            flag_cell(row.max_velocity),
            flag_cell(row.selected),
            flag_cell(row.interpolated),
            flag_cell(row.unsure),
        ];
        record.extend(row.extras.iter().cloned());
        writer.write_record(&record)?;
    }
    writer
        .flush()
        .map_err(|e| CurateError::io("<export>", e))?;
    Ok(())
}

fn flag_cell(flag: bool) -> String {
    let cell = if flag { "1" } else { "0" };
    cell.to_string()
}
