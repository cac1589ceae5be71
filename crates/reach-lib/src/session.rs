//! Curation session: the loaded experiment plus the trial currently under review.
//!
//! All edits go to the active [`TrialWorkingCopy`]; the output table only changes when
//! the session commits on a trial transition or before an export.

use crate::curation::{PeakSource, TrialWorkingCopy};
use crate::error::{CurateError, Result};
use crate::experiment::{Experiment, TrialId};
use crate::io::curated::read_curated_table;
use crate::io::raw::{is_curated, read_raw_table};
use crate::merge;
use crate::navigate::{self, Direction};
use crate::profile::{
    KinematicProfiler, ProfileProvider, ReachProfile, VelocityMode, VelocityProfile,
};
use crate::segment::segment;
use crate::setting::Setting;
use crate::units::normalize;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Read an experiment file, normalize it and seed the default selections.
///
/// Files named `*selected*` are previously exported curated tables and load without
/// unit conversion; anything else is a raw tab-separated recording.
pub fn load_experiment(path: &Path, setting: &Setting) -> Result<Experiment> {
    let table = if is_curated(path) {
        read_curated_table(path)?
    } else {
        let raw = read_raw_table(path, setting.headers.as_deref())?;
        normalize(&raw, setting)?
    };
    if table.dropped > 0 {
        warn!(
            "{}: dropped {} rows with missing values",
            path.display(),
            table.dropped
        );
    }
    let experiment = segment(table, setting)?;
    info!(
        "loaded {} ({} rows, {} trials)",
        path.display(),
        experiment.len(),
        experiment.trials().len()
    );
    Ok(experiment)
}

/// What a click on the velocity plot means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PickMode {
    #[default]
    MaxVelocity,
    /// Two clicks: window start, then window end.
    WindowBounds,
}

/// Snapshot of the session, as shown after every command.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub trial: Option<TrialId>,
    /// 1-based position of the active trial in file order.
    pub position: Option<usize>,
    pub total_trials: usize,
    pub mode: Option<&'static str>,
    pub unsure: bool,
    pub interpolated: bool,
    pub window: (Option<f64>, Option<f64>),
    pub max_velocity: Option<f64>,
    pub peak_source: Option<PeakSource>,
    pub pick_mode: PickMode,
    pub pending_start: Option<f64>,
    pub dirty_trials: Vec<TrialId>,
}

pub struct Session<P: ProfileProvider = KinematicProfiler> {
    setting: Setting,
    experiment: Experiment,
    source: Option<PathBuf>,
    profiler: P,
    active: Option<TrialWorkingCopy>,
    pick_mode: PickMode,
    pending_start: Option<f64>,
}

impl Session<KinematicProfiler> {
    /// Load `path` and make its first trial active.
    pub fn open(path: &Path, setting: Setting) -> Result<Self> {
        let experiment = load_experiment(path, &setting)?;
        let profiler = KinematicProfiler::from_setting(&setting);
        let mut session = Self::new(experiment, setting, profiler);
        session.source = Some(path.to_path_buf());
        if let Some(&first) = session.experiment.trials().first() {
            session.select_trial(first)?;
        }
        Ok(session)
    }
}

impl<P: ProfileProvider> Session<P> {
    /// A session over an already loaded experiment, with no trial active yet.
    pub fn new(experiment: Experiment, setting: Setting, profiler: P) -> Self {
        Self {
            setting,
            experiment,
            source: None,
            profiler,
            active: None,
            pick_mode: PickMode::default(),
            pending_start: None,
        }
    }

    pub fn setting(&self) -> &Setting {
        &self.setting
    }

    pub fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    pub fn active(&self) -> Option<&TrialWorkingCopy> {
        self.active.as_ref()
    }

    pub fn pick_mode(&self) -> PickMode {
        self.pick_mode
    }

    /// Commit the outgoing trial and open `trial` as the new working copy.
    pub fn select_trial(&mut self, trial: TrialId) -> Result<TrialId> {
        if !self.experiment.contains_trial(trial) {
            return Err(CurateError::UnknownTrial(trial));
        }
        self.commit();
        self.activate(trial)
    }

    /// Write the active working copy back into the output table.
    pub fn commit(&mut self) -> bool {
        match &self.active {
            Some(active) => merge::commit(active, &mut self.experiment),
            None => false,
        }
    }

    /// Leave the active trial in `direction`.
    ///
    /// `Next` refuses to leave a trial that is neither accepted nor rejected and leaves
    /// the session untouched. Every successful transition commits first.
    pub fn advance(&mut self, direction: Direction) -> Result<TrialId> {
        let current = self.active.as_ref().map(TrialWorkingCopy::trial);
        if let (Direction::Next, Some(active)) = (direction, &self.active) {
            if !active.status().is_resolved() {
                return Err(CurateError::NotResolved(active.trial()));
            }
        }
        // NextUnresolved has to see the committed verdict of the outgoing trial.
        let target = match direction {
            Direction::NextUnresolved => None,
            _ => Some(navigate::resolve(&self.experiment, current, direction)?),
        };
        self.commit();
        let target = match target {
            Some(t) => t,
            None => navigate::resolve(&self.experiment, current, direction)?,
        };
        self.activate(target)
    }

    pub fn set_window(&mut self, p1: f64, p2: f64) -> Result<()> {
        let active = self.active.as_mut().ok_or(CurateError::NoActiveTrial)?;
        active.set_window(p1, p2, &self.profiler)
    }

    pub fn set_window_start(&mut self, p1: f64) -> Result<()> {
        let active = self.active.as_mut().ok_or(CurateError::NoActiveTrial)?;
        active.set_window_start(p1, &self.profiler)
    }

    pub fn set_window_end(&mut self, p2: f64) -> Result<()> {
        let active = self.active.as_mut().ok_or(CurateError::NoActiveTrial)?;
        active.set_window_end(p2, &self.profiler)
    }

    pub fn set_max_velocity(&mut self, time_ms: f64) -> Result<()> {
        self.active_mut()?.set_max_velocity(time_ms);
        Ok(())
    }

    pub fn mark_accept(&mut self) -> Result<()> {
        self.active_mut()?.mark_accept();
        Ok(())
    }

    pub fn mark_reject(&mut self) -> Result<()> {
        self.active_mut()?.mark_reject();
        Ok(())
    }

    pub fn mark_unsure(&mut self, unsure: bool) -> Result<()> {
        self.active_mut()?.mark_unsure(unsure);
        Ok(())
    }

    pub fn mark_interpolated(&mut self, interpolated: bool) -> Result<()> {
        self.active_mut()?.mark_interpolated(interpolated);
        Ok(())
    }

    pub fn reset(&mut self) -> Result<()> {
        let active = self.active.as_mut().ok_or(CurateError::NoActiveTrial)?;
        active.reset(&self.profiler);
        self.pending_start = None;
        Ok(())
    }

    /// Switching modes drops a half-finished window pick.
    pub fn set_pick_mode(&mut self, mode: PickMode) {
        self.pick_mode = mode;
        self.pending_start = None;
    }

    /// A click at `time_ms` on the velocity plot.
    ///
    /// In window mode the first click is held as the start; the second sets the window
    /// and returns to max-velocity picking. A rejected second click keeps the start.
    pub fn pick(&mut self, time_ms: f64) -> Result<()> {
        match self.pick_mode {
            PickMode::MaxVelocity => self.set_max_velocity(time_ms),
            PickMode::WindowBounds => {
                if self.active.is_none() {
                    return Err(CurateError::NoActiveTrial);
                }
                match self.pending_start {
                    None => {
                        self.pending_start = Some(time_ms);
                        Ok(())
                    }
                    Some(p1) => {
                        self.set_window(p1, time_ms)?;
                        self.pending_start = None;
                        self.pick_mode = PickMode::MaxVelocity;
                        Ok(())
                    }
                }
            }
        }
    }

    pub fn velocity_profile(&self, mode: VelocityMode) -> Result<VelocityProfile> {
        let active = self.active.as_ref().ok_or(CurateError::NoActiveTrial)?;
        Ok(active.velocity_profile(&self.profiler, mode))
    }

    pub fn reach_profile(&self) -> Result<ReachProfile> {
        let active = self.active.as_ref().ok_or(CurateError::NoActiveTrial)?;
        Ok(active.reach_profile(&self.profiler, self.experiment.all_targets()))
    }

    /// `<stem>_selected.csv` next to the source file.
    pub fn default_output_path(&self) -> Option<PathBuf> {
        self.source.as_deref().map(merge::output_path_for)
    }

    /// Commit the active trial, then write the whole table to `path`.
    pub fn export(&mut self, path: &Path) -> Result<()> {
        self.commit();
        merge::export(&mut self.experiment, path)?;
        info!(
            "exported {} rows to {}",
            self.experiment.len(),
            path.display()
        );
        Ok(())
    }

    pub fn status(&self) -> SessionStatus {
        let active = self.active.as_ref();
        let trial = active.map(TrialWorkingCopy::trial);
        SessionStatus {
            trial,
            position: trial
                .and_then(|t| self.experiment.position_of(t))
                .map(|p| p + 1),
            total_trials: self.experiment.trials().len(),
            mode: active.map(|a| a.status().mode.label()),
            unsure: active.map(TrialWorkingCopy::unsure).unwrap_or(false),
            interpolated: active.map(TrialWorkingCopy::interpolated).unwrap_or(false),
            window: active.map(TrialWorkingCopy::window).unwrap_or((None, None)),
            max_velocity: active.and_then(TrialWorkingCopy::max_velocity),
            peak_source: active.and_then(TrialWorkingCopy::peak_source),
            pick_mode: self.pick_mode,
            pending_start: self.pending_start,
            dirty_trials: self.experiment.dirty_trials().collect(),
        }
    }

    fn active_mut(&mut self) -> Result<&mut TrialWorkingCopy> {
        self.active.as_mut().ok_or(CurateError::NoActiveTrial)
    }

    fn activate(&mut self, trial: TrialId) -> Result<TrialId> {
        let copy = TrialWorkingCopy::open(&self.experiment, trial, &self.profiler)?;
        self.active = Some(copy);
        self.pending_start = None;
        self.pick_mode = PickMode::MaxVelocity;
        Ok(trial)
    }
}
