//! Experiment schema settings.
//!
//! Settings are JSON documents written by the settings editor. Most keys are loosely
//! typed there (numbers stored as strings, blank triples meaning "unset", headers
//! stored as a quoted list literal), so parsing goes through [`RawSetting`] and is
//! then validated into a typed [`Setting`].

use crate::error::{CurateError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Origin used when a setting leaves `Display Origin` blank.
pub const DEFAULT_DISPLAY_ORIGIN: DisplayOrigin = DisplayOrigin {
    x: 528.0,
    y: 395.0,
    unit: DisplayUnit::Px,
};

const PLACEHOLDER_HEADERS: [&str; 4] = ["", "[]", "unused", "none"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayUnit {
    Px,
    Cm,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DisplayOrigin {
    pub x: f64,
    pub y: f64,
    pub unit: DisplayUnit,
}

impl DisplayOrigin {
    pub fn component(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

/// Configured selection bounds, compared against `step` (or `time_ms`) inclusively.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentBounds {
    pub start: f64,
    pub end: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReturnUnits {
    #[default]
    Cm,
    Pix,
}

/// A free-form `[x, y, unit]` entry kept for reference (`Display Scale`, `Real Scale`,
/// `Real Origin`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Triple {
    pub x: String,
    pub y: String,
    pub unit: String,
}

/// Validated experiment schema. Never mutated by the curation core.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Setting {
    pub name: Option<String>,
    /// Column names applied to headerless raw files; `None` means the file declares its own.
    pub headers: Option<Vec<String>>,
    pub display_origin: Option<DisplayOrigin>,
    pub px_cm_ratio: Option<f64>,
    pub segments: Option<SegmentBounds>,
    pub filter: bool,
    pub use_pixels: bool,
    pub return_units: ReturnUnits,
    pub display_scale: Option<Triple>,
    pub real_scale: Option<Triple>,
    pub real_origin: Option<Triple>,
}

/// Setting document exactly as the editor writes it.
#[derive(Debug, Default, Deserialize)]
pub struct RawSetting {
    #[serde(rename = "Name", default)]
    pub name: Value,
    #[serde(rename = "Header", default)]
    pub header: Value,
    #[serde(rename = "Display Origin", default)]
    pub display_origin: Value,
    #[serde(rename = "PX_CM_Ratio", default)]
    pub px_cm_ratio: Value,
    #[serde(rename = "Segments", default)]
    pub segments: Value,
    #[serde(rename = "Filter", default)]
    pub filter: Value,
    #[serde(rename = "Use_Pixels", default)]
    pub use_pixels: Value,
    #[serde(rename = "return_units", default)]
    pub return_units: Value,
    #[serde(rename = "Display Scale", default)]
    pub display_scale: Value,
    #[serde(rename = "Real Scale", default)]
    pub real_scale: Value,
    #[serde(rename = "Real Origin", default)]
    pub real_origin: Value,
}

impl Setting {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let raw: RawSetting = serde_json::from_str(text)?;
        Self::from_raw(raw)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| CurateError::io(path, e))?;
        let setting = Self::from_json_str(&text)?;
        log::info!(
            "loaded setting {} from {}",
            setting.name.as_deref().unwrap_or("<unnamed>"),
            path.display()
        );
        Ok(setting)
    }

    pub fn from_raw(raw: RawSetting) -> Result<Self> {
        let px_cm_ratio = parse_ratio(&raw.px_cm_ratio)?;
        let return_units = parse_return_units(&raw.return_units)?;
        if return_units == ReturnUnits::Pix && px_cm_ratio.is_none() {
            return Err(CurateError::config(
                "PX_CM_Ratio",
                "return_units PIX requires a pixel-to-cm ratio",
            ));
        }
        Ok(Self {
            name: match raw.name {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                _ => None,
            },
            headers: parse_headers(&raw.header)?,
            display_origin: parse_display_origin(&raw.display_origin)?,
            px_cm_ratio,
            segments: parse_segments(&raw.segments)?,
            filter: parse_flag("Filter", &raw.filter)?,
            use_pixels: parse_flag("Use_Pixels", &raw.use_pixels)?,
            return_units,
            display_scale: parse_triple(&raw.display_scale),
            real_scale: parse_triple(&raw.real_scale),
            real_origin: parse_triple(&raw.real_origin),
        })
    }

    /// Configured origin, or the fixed default when unset.
    pub fn origin(&self) -> DisplayOrigin {
        self.display_origin.unwrap_or(DEFAULT_DISPLAY_ORIGIN)
    }

    pub fn ratio(&self) -> Result<f64> {
        self.px_cm_ratio
            .ok_or_else(|| CurateError::config("PX_CM_Ratio", "required for pixel columns"))
    }

    /// Express a canonical coordinate in the setting's preferred return units.
    pub fn to_return_units(&self, value_cm: f64, axis: Axis) -> f64 {
        match (self.return_units, self.px_cm_ratio) {
            (ReturnUnits::Pix, Some(ratio)) => value_cm / ratio + self.origin().component(axis),
            _ => value_cm,
        }
    }
}

/// A directory of `*.json` setting files.
#[derive(Debug, Clone)]
pub struct SettingsFolder {
    dir: PathBuf,
}

impl SettingsFolder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Setting names (file stems), sorted.
    pub fn list(&self) -> Result<Vec<String>> {
        let entries = fs::read_dir(&self.dir).map_err(|e| CurateError::io(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let path = entry.map_err(|e| CurateError::io(&self.dir, e))?.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        let file = if name.ends_with(".json") {
            name.to_string()
        } else {
            format!("{}.json", name)
        };
        self.dir.join(file)
    }

    pub fn load(&self, name: &str) -> Result<Setting> {
        Setting::from_path(&self.path_for(name))
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn value_as_f64(key: &str, value: &Value) -> Result<Option<f64>> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => Ok(n.as_f64()),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| CurateError::config(key, format!("'{}' is not a number", s))),
        other => Err(CurateError::config(
            key,
            format!("expected a number, found {}", other),
        )),
    }
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn parse_headers(value: &Value) -> Result<Option<Vec<String>>> {
    let items: Vec<String> = match value {
        Value::Null | Value::Bool(false) => return Ok(None),
        Value::Number(n) if n.as_f64() == Some(0.0) => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => split_list_literal(s),
        Value::Array(items) => items.iter().map(value_as_string).collect(),
        other => {
            return Err(CurateError::config(
                "Header",
                format!("expected a list of column names, found {}", other),
            ))
        }
    };
    if items.is_empty() {
        return Ok(None);
    }
    let headers = items
        .into_iter()
        .enumerate()
        .map(|(idx, item)| {
            let trimmed = item.trim();
            if PLACEHOLDER_HEADERS.contains(&trimmed.to_ascii_lowercase().as_str()) {
                format!("unused{}", idx)
            } else {
                trimmed.to_string()
            }
        })
        .collect();
    Ok(Some(headers))
}

/// Split a quoted list literal such as `"['trial_no', 'time_ms', '']"`.
fn split_list_literal(text: &str) -> Vec<String> {
    let trimmed = text.trim();
    let inner = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
        .unwrap_or(trimmed);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    inner
        .split(',')
        .map(|item| {
            item.trim()
                .trim_matches(|c| c == '\'' || c == '"')
                .to_string()
        })
        .collect()
}

fn parse_display_origin(value: &Value) -> Result<Option<DisplayOrigin>> {
    let items = match value {
        Value::Array(items) => items,
        v if is_blank(v) => return Ok(None),
        other => {
            return Err(CurateError::config(
                "Display Origin",
                format!("expected [x, y, unit], found {}", other),
            ))
        }
    };
    if items.iter().all(is_blank) {
        return Ok(None);
    }
    let x = items.first().map(|v| value_as_f64("Display Origin", v)).transpose()?.flatten();
    let y = items.get(1).map(|v| value_as_f64("Display Origin", v)).transpose()?.flatten();
    let (x, y) = match (x, y) {
        (Some(x), Some(y)) => (x, y),
        _ => {
            return Err(CurateError::config(
                "Display Origin",
                "x and y must both be set or both be blank",
            ))
        }
    };
    let unit = match items.get(2).map(value_as_string) {
        None => DisplayUnit::Px,
        Some(u) if u.trim().is_empty() || u.trim().eq_ignore_ascii_case("px") => DisplayUnit::Px,
        Some(u) if u.trim().eq_ignore_ascii_case("cm") => DisplayUnit::Cm,
        Some(u) => {
            return Err(CurateError::config(
                "Display Origin",
                format!("unknown origin unit '{}'", u),
            ))
        }
    };
    Ok(Some(DisplayOrigin { x, y, unit }))
}

fn parse_ratio(value: &Value) -> Result<Option<f64>> {
    match value_as_f64("PX_CM_Ratio", value)? {
        Some(ratio) if !ratio.is_finite() || ratio <= 0.0 => Err(CurateError::config(
            "PX_CM_Ratio",
            format!("ratio must be positive, got {}", ratio),
        )),
        other => Ok(other),
    }
}

fn parse_segments(value: &Value) -> Result<Option<SegmentBounds>> {
    let items = match value {
        Value::Array(items) => items,
        v if is_blank(v) => return Ok(None),
        other => {
            return Err(CurateError::config(
                "Segments",
                format!("expected [start, end], found {}", other),
            ))
        }
    };
    let start = items.first().map(|v| value_as_f64("Segments", v)).transpose()?.flatten();
    let end = items.get(1).map(|v| value_as_f64("Segments", v)).transpose()?.flatten();
    match (start, end) {
        (None, None) => Ok(None),
        (Some(start), Some(end)) => Ok(Some(SegmentBounds { start, end })),
        _ => Err(CurateError::config(
            "Segments",
            "start and end must both be set or both be blank",
        )),
    }
}

fn parse_flag(key: &str, value: &Value) -> Result<bool> {
    match value {
        Value::Null => Ok(false),
        Value::Bool(b) => Ok(*b),
        Value::Number(n) => Ok(n.as_f64().unwrap_or(0.0) != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" | "0" | "false" => Ok(false),
            "1" | "true" => Ok(true),
            other => Err(CurateError::config(
                key,
                format!("'{}' is not a boolean", other),
            )),
        },
        other => Err(CurateError::config(
            key,
            format!("expected a boolean, found {}", other),
        )),
    }
}

fn parse_return_units(value: &Value) -> Result<ReturnUnits> {
    if is_blank(value) {
        return Ok(ReturnUnits::Cm);
    }
    match value_as_string(value).trim().to_ascii_uppercase().as_str() {
        "CM" => Ok(ReturnUnits::Cm),
        "PIX" | "PX" => Ok(ReturnUnits::Pix),
        other => Err(CurateError::config(
            "return_units",
            format!("expected CM or PIX, found '{}'", other),
        )),
    }
}

fn parse_triple(value: &Value) -> Option<Triple> {
    let items = value.as_array()?;
    if items.iter().all(is_blank) {
        return None;
    }
    Some(Triple {
        x: items.first().map(value_as_string).unwrap_or_default(),
        y: items.get(1).map(value_as_string).unwrap_or_default(),
        unit: items.get(2).map(value_as_string).unwrap_or_default(),
    })
}
