pub mod curated;
pub mod raw;

use crate::error::{CurateError, Result};
use crate::experiment::TrialId;

/// Parse a numeric cell, naming the column and line on failure.
pub(crate) fn parse_number(column: &str, line: u64, text: &str) -> Result<f64> {
    text.trim().parse::<f64>().map_err(|_| {
        CurateError::schema(column, format!("line {}: '{}' is not a number", line, text))
    })
}

/// Trial ids may be written as floats (`3.0`) by tools that promote integer columns.
pub(crate) fn parse_trial_id(column: &str, line: u64, text: &str) -> Result<TrialId> {
    let value = parse_number(column, line, text)?;
    if value < 0.0 || value.fract() != 0.0 || value > TrialId::MAX as f64 {
        return Err(CurateError::schema(
            column,
            format!("line {}: '{}' is not a trial number", line, text),
        ));
    }
    Ok(value as TrialId)
}
