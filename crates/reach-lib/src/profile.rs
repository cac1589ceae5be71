//! Velocity and reach profiles consumed by the curation state machine.
//!
//! Profiles are pure functions of the rows they are given, so the state machine may
//! ask for them as often as it likes.

use crate::experiment::CanonicalRow;
use crate::setting::{Axis, Setting};
use serde::{Deserialize, Serialize};

/// Low-pass cutoff used when a setting asks for a filtered velocity curve.
pub const DEFAULT_SMOOTHING_HZ: f64 = 10.0;

/// Why a velocity profile is requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VelocityMode {
    /// Automatic suggestion when a trial is opened: the curve spans the whole trial.
    PySelect,
    /// Recompute after a window edit: the curve spans only the window.
    Update,
}

/// The rows of one trial and the window the peak must be searched in.
#[derive(Debug, Clone, Copy)]
pub struct TrialWindow<'a> {
    pub rows: &'a [CanonicalRow],
    pub p1: Option<f64>,
    pub p2: Option<f64>,
}

impl TrialWindow<'_> {
    pub fn contains(&self, time_ms: f64) -> bool {
        self.p1.map(|p1| time_ms >= p1).unwrap_or(true)
            && self.p2.map(|p2| time_ms <= p2).unwrap_or(true)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VelocityProfile {
    pub mode: VelocityMode,
    /// `[time_ms, speed_cm_per_s]`
    pub curve: Vec<[f64; 2]>,
    pub peak_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReachProfile {
    pub hand: Vec<[f64; 2]>,
    pub cursor: Vec<[f64; 2]>,
    pub targets: Vec<[f64; 2]>,
    pub active_target: Option<[f64; 2]>,
}

pub trait ProfileProvider {
    fn velocity_profile(&self, window: &TrialWindow<'_>, mode: VelocityMode) -> VelocityProfile;

    fn reach_profile(&self, selected: &[&CanonicalRow], targets: &[[f64; 2]]) -> ReachProfile;
}

/// Hand-speed profiler: finite differences of the hand position, optionally low-passed.
#[derive(Debug, Clone, Default)]
pub struct KinematicProfiler {
    smoothing_hz: Option<f64>,
    setting: Setting,
}

impl KinematicProfiler {
    pub fn from_setting(setting: &Setting) -> Self {
        Self {
            smoothing_hz: setting.filter.then_some(DEFAULT_SMOOTHING_HZ),
            setting: setting.clone(),
        }
    }

    fn point(&self, x_cm: f64, y_cm: f64) -> [f64; 2] {
        [
            self.setting.to_return_units(x_cm, Axis::X),
            self.setting.to_return_units(y_cm, Axis::Y),
        ]
    }
}

impl ProfileProvider for KinematicProfiler {
    fn velocity_profile(&self, window: &TrialWindow<'_>, mode: VelocityMode) -> VelocityProfile {
        let mut speeds = hand_speed(window.rows);
        if let Some(cutoff) = self.smoothing_hz {
            let fs = sampling_rate_hz(window.rows);
            if fs > 0.0 {
                speeds = single_pole_lowpass(&speeds, fs, cutoff);
            }
        }
        let samples: Vec<[f64; 2]> = window
            .rows
            .iter()
            .zip(&speeds)
            .map(|(row, &speed)| [row.time_ms, speed])
            .collect();

        let peak_time = if window.rows.len() < 2 {
            None
        } else {
            samples
                .iter()
                .filter(|p| window.contains(p[0]))
                .fold(None, |best: Option<[f64; 2]>, p| match best {
                    Some(b) if b[1] >= p[1] => Some(b),
                    _ => Some(*p),
                })
                .map(|p| p[0])
        };
        let curve = match mode {
            VelocityMode::PySelect => samples,
            VelocityMode::Update => samples.into_iter().filter(|p| window.contains(p[0])).collect(),
        };
        log::debug!("velocity profile ({:?}) peak at {:?} ms", mode, peak_time);
        VelocityProfile {
            mode,
            curve,
            peak_time,
        }
    }

    fn reach_profile(&self, selected: &[&CanonicalRow], targets: &[[f64; 2]]) -> ReachProfile {
        ReachProfile {
            hand: selected
                .iter()
                .map(|r| self.point(r.handx_cm, r.handy_cm))
                .collect(),
            cursor: selected
                .iter()
                .map(|r| self.point(r.cursorx_cm, r.cursory_cm))
                .collect(),
            targets: targets.iter().map(|t| self.point(t[0], t[1])).collect(),
            active_target: selected
                .first()
                .map(|r| self.point(r.targetx_cm, r.targety_cm)),
        }
    }
}

/// Hand speed in cm/s; the first sample is zero.
fn hand_speed(rows: &[CanonicalRow]) -> Vec<f64> {
    let mut out = vec![0.0; rows.len()];
    for i in 1..rows.len() {
        let dt = rows[i].time_ms - rows[i - 1].time_ms;
        if dt <= 0.0 {
            continue;
        }
        let dist = (rows[i].handx_cm - rows[i - 1].handx_cm)
            .hypot(rows[i].handy_cm - rows[i - 1].handy_cm);
        out[i] = dist / dt * 1000.0;
    }
    out
}

/// Sampling rate from the median inter-sample interval.
fn sampling_rate_hz(rows: &[CanonicalRow]) -> f64 {
    let mut steps: Vec<f64> = rows
        .windows(2)
        .map(|w| w[1].time_ms - w[0].time_ms)
        .filter(|dt| *dt > 0.0)
        .collect();
    if steps.is_empty() {
        return 0.0;
    }
    steps.sort_by(f64::total_cmp);
    1000.0 / steps[steps.len() / 2]
}

fn single_pole_lowpass(data: &[f64], fs: f64, cutoff: f64) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    let dt = 1.0 / fs;
    let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let alpha = dt / (rc + dt);
    let mut out = Vec::with_capacity(data.len());
    let mut prev = data[0];
    for &x in data {
        prev += alpha * (x - prev);
        out.push(prev);
    }
    out
}
