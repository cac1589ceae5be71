//! Conversion of raw recording columns into canonical units (ms, cm).
//!
//! Raw column names encode device and unit as `<label>_<unit>` (`targetx_px`,
//! `robotx_m`, `time_s`). Each recognized `(label, unit)` pair maps to one entry of
//! [`CONVERSION_TABLE`]; a recognized label with an unknown unit is a unit error and
//! columns with unrecognized labels pass through untouched.

use crate::error::{CurateError, Result};
use crate::experiment::CanonicalRow;
use crate::io::raw::{RawRow, RawTable};
use crate::io::{parse_number, parse_trial_id};
use crate::setting::{Axis, DisplayOrigin, Setting};

pub const TRIAL_COLUMN: &str = "trial_no";

/// Canonical measurement a raw column feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Time,
    CursorX,
    CursorY,
    HandX,
    HandY,
    TargetX,
    TargetY,
}

impl Field {
    pub const ALL: [Field; 7] = [
        Field::Time,
        Field::CursorX,
        Field::CursorY,
        Field::HandX,
        Field::HandY,
        Field::TargetX,
        Field::TargetY,
    ];

    pub fn canonical_name(self) -> &'static str {
        match self {
            Field::Time => "time_ms",
            Field::CursorX => "cursorx_cm",
            Field::CursorY => "cursory_cm",
            Field::HandX => "handx_cm",
            Field::HandY => "handy_cm",
            Field::TargetX => "targetx_cm",
            Field::TargetY => "targety_cm",
        }
    }

    fn store(self, row: &mut CanonicalRow, value: f64) {
        match self {
            Field::Time => row.time_ms = value,
            Field::CursorX => row.cursorx_cm = value,
            Field::CursorY => row.cursory_cm = value,
            Field::HandX => row.handx_cm = value,
            Field::HandY => row.handy_cm = value,
            Field::TargetX => row.targetx_cm = value,
            Field::TargetY => row.targety_cm = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    Identity,
    Scale(f64),
    /// Divides by the factor. Used for `time_m`, which the recording software writes
    /// with a `value / 60000` convention.
    Divide(f64),
    /// `(raw - origin[axis]) * px_cm_ratio`
    Pixel(Axis),
}

impl Conversion {
    pub fn apply(self, raw: f64, origin: &DisplayOrigin, ratio: f64) -> f64 {
        match self {
            Conversion::Identity => raw,
            Conversion::Scale(factor) => raw * factor,
            Conversion::Divide(factor) => raw / factor,
            Conversion::Pixel(axis) => (raw - origin.component(axis)) * ratio,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConversionRule {
    pub labels: &'static [&'static str],
    pub unit: &'static str,
    pub field: Field,
    pub conversion: Conversion,
}

const TIME: &[&str] = &["time"];
const CURSOR_X: &[&str] = &["cursorx"];
const CURSOR_Y: &[&str] = &["cursory"];
const HAND_X: &[&str] = &["penx", "robotx", "mousex", "handx"];
const HAND_Y: &[&str] = &["peny", "roboty", "mousey", "handy"];
const TARGET_X: &[&str] = &["targetx"];
const TARGET_Y: &[&str] = &["targety"];

const fn rule(
    labels: &'static [&'static str],
    unit: &'static str,
    field: Field,
    conversion: Conversion,
) -> ConversionRule {
    ConversionRule {
        labels,
        unit,
        field,
        conversion,
    }
}

pub const CONVERSION_TABLE: &[ConversionRule] = &[
    rule(TIME, "ms", Field::Time, Conversion::Identity),
    rule(TIME, "s", Field::Time, Conversion::Scale(1000.0)),
    rule(TIME, "m", Field::Time, Conversion::Divide(60000.0)),
    rule(CURSOR_X, "px", Field::CursorX, Conversion::Pixel(Axis::X)),
    rule(CURSOR_X, "cm", Field::CursorX, Conversion::Identity),
    rule(CURSOR_Y, "px", Field::CursorY, Conversion::Pixel(Axis::Y)),
    rule(CURSOR_Y, "cm", Field::CursorY, Conversion::Identity),
    rule(HAND_X, "m", Field::HandX, Conversion::Scale(100.0)),
    rule(HAND_X, "px", Field::HandX, Conversion::Pixel(Axis::X)),
    rule(HAND_X, "cm", Field::HandX, Conversion::Identity),
    rule(HAND_Y, "m", Field::HandY, Conversion::Scale(100.0)),
    rule(HAND_Y, "px", Field::HandY, Conversion::Pixel(Axis::Y)),
    rule(HAND_Y, "cm", Field::HandY, Conversion::Identity),
    rule(TARGET_X, "px", Field::TargetX, Conversion::Pixel(Axis::X)),
    rule(TARGET_X, "cm", Field::TargetX, Conversion::Identity),
    rule(TARGET_Y, "px", Field::TargetY, Conversion::Pixel(Axis::Y)),
    rule(TARGET_Y, "cm", Field::TargetY, Conversion::Identity),
];

/// What to do with one raw column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnPlan {
    Trial,
    Convert(Field, Conversion),
    Extra,
}

/// Look up the plan for a column name.
pub fn plan_column(name: &str) -> Result<ColumnPlan> {
    if name == TRIAL_COLUMN {
        return Ok(ColumnPlan::Trial);
    }
    let lower = name.to_ascii_lowercase();
    let (label, unit) = lower.split_once('_').unwrap_or((lower.as_str(), ""));
    let family: Vec<&ConversionRule> = CONVERSION_TABLE
        .iter()
        .filter(|rule| rule.labels.contains(&label))
        .collect();
    if family.is_empty() {
        return Ok(ColumnPlan::Extra);
    }
    family
        .into_iter()
        .find(|rule| rule.unit == unit)
        .map(|rule| ColumnPlan::Convert(rule.field, rule.conversion))
        .ok_or_else(|| CurateError::Unit {
            column: name.to_string(),
            unit: unit.to_string(),
        })
}

/// Canonical rows plus the passthrough columns they carry.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTable {
    pub rows: Vec<CanonicalRow>,
    pub extra_columns: Vec<String>,
    pub dropped: usize,
}

/// Convert a raw table into canonical rows.
///
/// Rows with any missing cell are dropped before conversion.
pub fn normalize(table: &RawTable, setting: &Setting) -> Result<NormalizedTable> {
    let plans = table
        .headers
        .iter()
        .map(|name| plan_column(name))
        .collect::<Result<Vec<_>>>()?;
    check_coverage(&table.headers, &plans)?;

    let origin = setting.origin();
    let uses_pixels = plans
        .iter()
        .any(|plan| matches!(plan, ColumnPlan::Convert(_, Conversion::Pixel(_))));
    let ratio = if uses_pixels { setting.ratio()? } else { 1.0 };

    let extra_columns: Vec<String> = table
        .headers
        .iter()
        .zip(&plans)
        .filter(|(_, plan)| **plan == ColumnPlan::Extra)
        .map(|(name, _)| name.clone())
        .collect();

    let mut rows = Vec::with_capacity(table.rows.len());
    let mut dropped = 0;
    for raw in &table.rows {
        if !raw.is_complete() {
            dropped += 1;
            continue;
        }
        rows.push(convert_row(raw, &table.headers, &plans, &origin, ratio)?);
    }
    if rows.is_empty() {
        return Err(CurateError::schema(
            TRIAL_COLUMN,
            "no complete samples remain after dropping missing values",
        ));
    }
    log::info!(
        "normalized {} rows (origin {:?}, ratio {})",
        rows.len(),
        origin,
        ratio
    );
    Ok(NormalizedTable {
        rows,
        extra_columns,
        dropped,
    })
}

fn check_coverage(headers: &[String], plans: &[ColumnPlan]) -> Result<()> {
    if !plans.contains(&ColumnPlan::Trial) {
        return Err(CurateError::schema(TRIAL_COLUMN, "column is missing"));
    }
    for field in Field::ALL {
        let sources: Vec<&String> = headers
            .iter()
            .zip(plans)
            .filter(|(_, plan)| matches!(plan, ColumnPlan::Convert(f, _) if *f == field))
            .map(|(name, _)| name)
            .collect();
        match sources.len() {
            0 => {
                return Err(CurateError::schema(
                    field.canonical_name(),
                    "no raw column provides this field",
                ))
            }
            1 => {}
            _ => {
                return Err(CurateError::schema(
                    field.canonical_name(),
                    format!("provided by several columns: {:?}", sources),
                ))
            }
        }
    }
    Ok(())
}

fn convert_row(
    raw: &RawRow,
    headers: &[String],
    plans: &[ColumnPlan],
    origin: &DisplayOrigin,
    ratio: f64,
) -> Result<CanonicalRow> {
    let mut row = CanonicalRow::new(0, 0.0);
    for ((name, plan), cell) in headers.iter().zip(plans).zip(&raw.cells) {
        let text = cell.as_deref().unwrap_or_default();
        match plan {
            ColumnPlan::Trial => row.trial_no = parse_trial_id(name, raw.line, text)?,
            ColumnPlan::Convert(field, conversion) => {
                let value = parse_number(name, raw.line, text)?;
                field.store(&mut row, conversion.apply(value, origin, ratio));
            }
            ColumnPlan::Extra => row.extras.push(text.to_string()),
        }
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::raw::parse_raw_table;
    use crate::setting::{DisplayUnit, DEFAULT_DISPLAY_ORIGIN};

    fn pixel_setting() -> Setting {
        Setting {
            display_origin: Some(DisplayOrigin {
                x: 500.0,
                y: 400.0,
                unit: DisplayUnit::Px,
            }),
            px_cm_ratio: Some(0.05),
            ..Setting::default()
        }
    }

    fn table(text: &str) -> RawTable {
        parse_raw_table(text.as_bytes(), None, b'\t').unwrap()
    }

    const PIXEL_HEADER: &str =
        "trial_no\ttime_s\tcursorx_px\tcursory_px\trobotx_m\troboty_m\ttargetx_px\ttargety_px";

    #[test]
    fn converts_pixels_meters_and_seconds() {
        let text = format!("{}\n1\t0.5\t510\t380\t0.12\t-0.03\t700\t400\n", PIXEL_HEADER);
        let out = normalize(&table(&text), &pixel_setting()).unwrap();
        let row = &out.rows[0];
        assert_eq!(row.trial_no, 1);
        assert_eq!(row.time_ms, 0.5 * 1000.0);
        assert_eq!(row.cursorx_cm, (510.0 - 500.0) * 0.05);
        assert_eq!(row.cursory_cm, (380.0 - 400.0) * 0.05);
        assert_eq!(row.handx_cm, 0.12 * 100.0);
        assert_eq!(row.handy_cm, -0.03 * 100.0);
        assert_eq!(row.targetx_cm, (700.0 - 500.0) * 0.05);
        assert_eq!(row.targety_cm, 0.0);
        assert!(row.selected);
        assert!(out.extra_columns.is_empty());

        let hand_px = "trial_no\ttime_ms\tcursorx_cm\tcursory_cm\thandx_px\thandy_px\ttargetx_cm\ttargety_cm\n\
                       1\t0\t0\t0\t530\t370\t0\t0\n";
        let row = &normalize(&table(hand_px), &pixel_setting()).unwrap().rows[0];
        assert_eq!(row.handx_cm, (530.0 - 500.0) * 0.05);
        assert_eq!(row.handy_cm, (370.0 - 400.0) * 0.05);

        let pen_px = "trial_no\ttime_ms\tcursorx_cm\tcursory_cm\tpenx_px\tpeny_px\ttargetx_cm\ttargety_cm\n\
                      1\t0\t0\t0\t480\t410\t0\t0\n";
        let row = &normalize(&table(pen_px), &pixel_setting()).unwrap().rows[0];
        assert_eq!(row.handx_cm, (480.0 - 500.0) * 0.05);
        assert_eq!(row.handy_cm, (410.0 - 400.0) * 0.05);
    }

    #[test]
    fn minutes_column_divides() {
        let text = "trial_no\ttime_m\tcursorx_cm\tcursory_cm\thandx_cm\thandy_cm\ttargetx_cm\ttargety_cm\n\
                    2\t120000\t0\t0\t0\t0\t0\t0\n";
        let out = normalize(&table(text), &Setting::default()).unwrap();
        assert_eq!(out.rows[0].time_ms, 2.0);
    }

    #[test]
    fn default_origin_applies() {
        let text = format!("{}\n1\t0\t528\t395\t0\t0\t528\t395\n", PIXEL_HEADER);
        let setting = Setting {
            px_cm_ratio: Some(0.1),
            ..Setting::default()
        };
        let out = normalize(&table(&text), &setting).unwrap();
        assert_eq!(setting.origin(), DEFAULT_DISPLAY_ORIGIN);
        assert_eq!(out.rows[0].cursorx_cm, 0.0);
        assert_eq!(out.rows[0].targety_cm, 0.0);
    }

    #[test]
    fn drops_rows_with_missing_values() {
        let text = format!(
            "{}\tstep\n1\t0\t510\t380\t0.1\t0.1\t700\t400\t0\n1\t0.01\t\t380\t0.1\t0.1\t700\t400\t1\n1\t0.02\t512\t380\t0.1\t0.1\t700\t400\tNaN\n1\t0.03\t514\t380\t0.1\t0.1\t700\t400\t3\n",
            PIXEL_HEADER
        );
        let out = normalize(&table(&text), &pixel_setting()).unwrap();
        assert_eq!(out.rows.len(), 2);
        assert_eq!(out.dropped, 2);
        assert_eq!(out.extra_columns, vec!["step"]);
        assert_eq!(out.rows[1].extras, vec!["3"]);
    }

    #[test]
    fn unknown_unit_names_column() {
        let err = plan_column("handx_in").unwrap_err();
        match err {
            CurateError::Unit { column, unit } => {
                assert_eq!(column, "handx_in");
                assert_eq!(unit, "in");
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(matches!(plan_column("cursorx_m"), Err(CurateError::Unit { .. })));
        assert_eq!(plan_column("unused3").unwrap(), ColumnPlan::Extra);
        assert_eq!(plan_column("step").unwrap(), ColumnPlan::Extra);
    }

    #[test]
    fn missing_field_is_schema_error() {
        let text = "trial_no\ttime_ms\tcursorx_cm\n1\t0\t0\n";
        let err = normalize(&table(text), &Setting::default()).unwrap_err();
        assert!(matches!(err, CurateError::Schema { ref column, .. } if column == "cursory_cm"));
    }

    #[test]
    fn pixel_columns_need_ratio() {
        let text = format!("{}\n1\t0\t510\t380\t0.1\t0.1\t700\t400\n", PIXEL_HEADER);
        let err = normalize(&table(&text), &Setting::default()).unwrap_err();
        assert!(matches!(err, CurateError::Config { ref key, .. } if key == "PX_CM_Ratio"));
    }

    #[test]
    fn non_numeric_cell_names_column_and_line() {
        let text = format!("{}\n1\tsoon\t510\t380\t0.1\t0.1\t700\t400\n", PIXEL_HEADER);
        let err = normalize(&table(&text), &pixel_setting()).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("time_s"), "{}", message);
        assert!(message.contains("line 2"), "{}", message);
    }
}
