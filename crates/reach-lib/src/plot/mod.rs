use crate::profile::{ReachProfile, VelocityProfile};
use serde::{Deserialize, Serialize};

const MAX_CURVE_POINTS: usize = 2048;

const VELOCITY_COLOR: u32 = 0x1F77B4;
const WINDOW_COLOR: u32 = 0x2CA02C;
const PEAK_COLOR: u32 = 0xD62728;
const HAND_COLOR: u32 = 0xFF0077;
const CURSOR_COLOR: u32 = 0x7F7F7F;
const TARGET_COLOR: u32 = 0x000000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Axis {
    pub label: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Style {
    pub width: f32,
    pub dash: Option<[f32; 2]>,
    pub color: Color,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color(pub u32);

impl Color {
    pub fn rgb(self) -> (u8, u8, u8) {
        (
            ((self.0 >> 16) & 0xFF) as u8,
            ((self.0 >> 8) & 0xFF) as u8,
            (self.0 & 0xFF) as u8,
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineSeries {
    pub name: String,
    pub points: Vec<[f64; 2]>,
    pub style: Style,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Series {
    Line(LineSeries),
}

impl Series {
    pub fn points(&self) -> &[[f64; 2]] {
        match self {
            Series::Line(line) => &line.points,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Figure {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
}

impl Figure {
    pub fn new(title: impl Into<Option<String>>) -> Self {
        Self {
            title: title.into(),
            x: Axis { label: None },
            y: Axis { label: None },
            series: Vec::new(),
        }
    }

    pub fn with_labels(mut self, x: &str, y: &str) -> Self {
        self.x.label = Some(x.into());
        self.y.label = Some(y.into());
        self
    }

    pub fn add_series(&mut self, series: Series) {
        self.series.push(series);
    }

    /// `(x_min, x_max, y_min, y_max)` over every series, `None` for an empty figure.
    pub fn bounds(&self) -> Option<(f64, f64, f64, f64)> {
        let mut points = self.series.iter().flat_map(|s| s.points().iter());
        let first = points.next()?;
        Some(points.fold(
            (first[0], first[0], first[1], first[1]),
            |(x0, x1, y0, y1), p| (x0.min(p[0]), x1.max(p[0]), y0.min(p[1]), y1.max(p[1])),
        ))
    }
}

pub fn decimate_points(points: &[[f64; 2]], max_points: usize) -> Vec<[f64; 2]> {
    if points.len() <= max_points {
        return points.to_vec();
    }
    let bucket_size = points.len() as f64 / max_points as f64;
    let mut result = Vec::with_capacity(max_points);
    for i in 0..max_points {
        let start = (i as f64 * bucket_size).floor() as usize;
        if start >= points.len() {
            break;
        }
        result.push(points[start]);
    }
    result
}

fn line(name: &str, points: Vec<[f64; 2]>, width: f32, dash: Option<[f32; 2]>, color: u32) -> Series {
    Series::Line(LineSeries {
        name: name.into(),
        points,
        style: Style {
            width,
            dash,
            color: Color(color),
        },
    })
}

/// Vertical marker spanning `[y_min, y_max]` at time `t`.
fn marker(name: &str, t: f64, y_min: f64, y_max: f64, color: u32) -> Series {
    line(name, vec![[t, y_min], [t, y_max]], 1.2, Some([4.0, 4.0]), color)
}

/// Speed over time with the selection window edges and the peak-velocity time.
pub fn figure_from_velocity(
    title: &str,
    profile: &VelocityProfile,
    window: (Option<f64>, Option<f64>),
) -> Figure {
    let mut fig = Figure::new(Some(title.into())).with_labels("time (ms)", "speed (cm/s)");
    let y_max = profile
        .curve
        .iter()
        .map(|p| p[1])
        .fold(0.0_f64, f64::max)
        .max(1.0);
    fig.add_series(line(
        "velocity",
        decimate_points(&profile.curve, MAX_CURVE_POINTS),
        1.4,
        None,
        VELOCITY_COLOR,
    ));
    for (name, edge) in [("window start", window.0), ("window end", window.1)] {
        if let Some(t) = edge {
            fig.add_series(marker(name, t, 0.0, y_max, WINDOW_COLOR));
        }
    }
    if let Some(t) = profile.peak_time {
        fig.add_series(marker("max velocity", t, 0.0, y_max, PEAK_COLOR));
    }
    fig
}

/// Hand and cursor paths of the selected rows, with every target of the experiment.
pub fn figure_from_reach(title: &str, profile: &ReachProfile) -> Figure {
    let mut fig = Figure::new(Some(title.into())).with_labels("x", "y");
    fig.add_series(line(
        "hand",
        decimate_points(&profile.hand, MAX_CURVE_POINTS),
        2.0,
        None,
        HAND_COLOR,
    ));
    fig.add_series(line(
        "cursor",
        decimate_points(&profile.cursor, MAX_CURVE_POINTS),
        1.0,
        Some([2.0, 2.0]),
        CURSOR_COLOR,
    ));
    for target in &profile.targets {
        let width = if Some(*target) == profile.active_target {
            3.0
        } else {
            1.0
        };
        // small cross so single points stay visible as lines
        let d = 0.5;
        fig.add_series(line(
            "target",
            vec![[target[0] - d, target[1]], [target[0] + d, target[1]]],
            width,
            None,
            TARGET_COLOR,
        ));
        fig.add_series(line(
            "target",
            vec![[target[0], target[1] - d], [target[0], target[1] + d]],
            width,
            None,
            TARGET_COLOR,
        ));
    }
    fig
}
