//! Working state of the trial under review.
//!
//! A [`TrialWorkingCopy`] is cloned out of the [`Experiment`] when a trial becomes active
//! and only reaches the output table again through [`crate::merge::commit`].

use crate::error::{CurateError, Result};
use crate::experiment::{Accept, CanonicalRow, Experiment, TrialId, TrialMode, TrialStatus};
use crate::profile::{ProfileProvider, ReachProfile, TrialWindow, VelocityMode, VelocityProfile};
use log::{debug, info};
use serde::{Deserialize, Serialize};

/// Where the current peak-velocity time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeakSource {
    Suggested,
    /// Restored from a `max_velocity` marker of a previously curated file.
    Saved,
    UserPick,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrialWorkingCopy {
    trial: TrialId,
    row_indices: Vec<usize>,
    rows: Vec<CanonicalRow>,
    default_selection: Vec<bool>,
    selectedp1: Option<f64>,
    selectedp2: Option<f64>,
    selectedmaxvelocity: Option<f64>,
    peak_source: Option<PeakSource>,
}

impl TrialWorkingCopy {
    pub fn open<P: ProfileProvider + ?Sized>(
        experiment: &Experiment,
        trial: TrialId,
        profiler: &P,
    ) -> Result<Self> {
        if !experiment.contains_trial(trial) {
            return Err(CurateError::UnknownTrial(trial));
        }
        let row_indices = experiment.row_indices(trial).to_vec();
        let rows: Vec<CanonicalRow> = experiment.trial_rows(trial).cloned().collect();
        let mut copy = Self {
            trial,
            row_indices,
            rows,
            default_selection: experiment.default_selection(trial).to_vec(),
            selectedp1: None,
            selectedp2: None,
            selectedmaxvelocity: None,
            peak_source: None,
        };
        copy.sync_window_from_selection();
        match copy.rows.iter().find(|row| row.max_velocity) {
            Some(marker) => {
                copy.selectedmaxvelocity = Some(marker.time_ms);
                copy.peak_source = Some(PeakSource::Saved);
            }
            None => copy.suggest_peak(profiler, VelocityMode::PySelect),
        }
        info!(
            "trial {} opened: window {:?}..{:?}, max velocity {:?} ({:?})",
            trial, copy.selectedp1, copy.selectedp2, copy.selectedmaxvelocity, copy.peak_source
        );
        Ok(copy)
    }

    pub fn trial(&self) -> TrialId {
        self.trial
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    /// Positions of this trial's rows in the experiment's output table.
    pub fn row_indices(&self) -> &[usize] {
        &self.row_indices
    }

    pub fn window(&self) -> (Option<f64>, Option<f64>) {
        (self.selectedp1, self.selectedp2)
    }

    pub fn max_velocity(&self) -> Option<f64> {
        self.selectedmaxvelocity
    }

    pub fn peak_source(&self) -> Option<PeakSource> {
        self.peak_source
    }

    /// Whether the peak belongs in the output table: picked or restored by the reviewer,
    /// or suggested on a trial that already has a verdict.
    pub fn records_peak(&self) -> bool {
        match self.peak_source {
            Some(PeakSource::UserPick | PeakSource::Saved) => true,
            Some(PeakSource::Suggested) => self.accept().is_resolved(),
            None => false,
        }
    }

    pub fn accept(&self) -> Accept {
        self.rows.first().map(|r| r.accept).unwrap_or_default()
    }

    pub fn unsure(&self) -> bool {
        self.rows.iter().any(|r| r.unsure)
    }

    pub fn interpolated(&self) -> bool {
        self.rows.iter().any(|r| r.interpolated)
    }

    pub fn status(&self) -> TrialStatus {
        let mode = match self.accept() {
            Accept::Accepted => TrialMode::Accepted,
            Accept::Rejected => TrialMode::Rejected,
            Accept::Unreviewed => TrialMode::NotSelected,
        };
        TrialStatus {
            trial: self.trial,
            mode,
            unsure: self.unsure(),
        }
    }

    /// Select exactly the rows with `p1 <= time_ms <= p2`.
    ///
    /// The peak-velocity suggestion is recomputed when the current peak falls outside the
    /// new window.
    pub fn set_window<P: ProfileProvider + ?Sized>(
        &mut self,
        p1: f64,
        p2: f64,
        profiler: &P,
    ) -> Result<()> {
        if p1.is_nan() || p2.is_nan() || p1 > p2 {
            return Err(CurateError::InvalidWindow { p1, p2 });
        }
        self.selectedp1 = Some(p1);
        self.selectedp2 = Some(p2);
        for row in &mut self.rows {
            row.selected = row.time_ms >= p1 && row.time_ms <= p2;
        }
        debug!("trial {} window set to {}..{}", self.trial, p1, p2);
        let inside = self
            .selectedmaxvelocity
            .map(|t| t >= p1 && t <= p2)
            .unwrap_or(false);
        if !inside {
            self.suggest_peak(profiler, VelocityMode::Update);
            debug!(
                "trial {} max velocity recomputed to {:?}",
                self.trial, self.selectedmaxvelocity
            );
        }
        Ok(())
    }

    /// Move only the start of the window; the end stays (or defaults to the last sample).
    pub fn set_window_start<P: ProfileProvider + ?Sized>(
        &mut self,
        p1: f64,
        profiler: &P,
    ) -> Result<()> {
        let p2 = self.selectedp2.or_else(|| self.last_time()).unwrap_or(p1);
        self.set_window(p1, p2, profiler)
    }

    /// Move only the end of the window; the start stays (or defaults to the first sample).
    pub fn set_window_end<P: ProfileProvider + ?Sized>(
        &mut self,
        p2: f64,
        profiler: &P,
    ) -> Result<()> {
        let p1 = self.selectedp1.or_else(|| self.first_time()).unwrap_or(p2);
        self.set_window(p1, p2, profiler)
    }

    /// User pick of the peak-velocity time. Picks outside the window are kept as given.
    pub fn set_max_velocity(&mut self, time_ms: f64) {
        self.selectedmaxvelocity = Some(time_ms);
        self.peak_source = Some(PeakSource::UserPick);
        debug!("trial {} max velocity picked at {}", self.trial, time_ms);
    }

    pub fn mark_accept(&mut self) {
        self.set_accept(Accept::Accepted);
    }

    pub fn mark_reject(&mut self) {
        self.set_accept(Accept::Rejected);
    }

    pub fn mark_unsure(&mut self, unsure: bool) {
        for row in &mut self.rows {
            row.unsure = unsure;
        }
    }

    pub fn mark_interpolated(&mut self, interpolated: bool) {
        for row in &mut self.rows {
            row.interpolated = interpolated;
        }
    }

    /// Back to the segmenter's default window, no verdict, no unsure flag and a fresh
    /// peak suggestion.
    pub fn reset<P: ProfileProvider + ?Sized>(&mut self, profiler: &P) {
        for (row, &selected) in self.rows.iter_mut().zip(&self.default_selection) {
            row.selected = selected;
            row.accept = Accept::Unreviewed;
            row.unsure = false;
        }
        self.sync_window_from_selection();
        self.suggest_peak(profiler, VelocityMode::PySelect);
        info!("trial {} reset", self.trial);
    }

    pub fn velocity_profile<P: ProfileProvider + ?Sized>(
        &self,
        profiler: &P,
        mode: VelocityMode,
    ) -> VelocityProfile {
        profiler.velocity_profile(&self.trial_window(), mode)
    }

    pub fn reach_profile<P: ProfileProvider + ?Sized>(
        &self,
        profiler: &P,
        targets: &[[f64; 2]],
    ) -> ReachProfile {
        let selected: Vec<&CanonicalRow> = self.rows.iter().filter(|r| r.selected).collect();
        profiler.reach_profile(&selected, targets)
    }

    /// Index (within this trial) of the first row at or after the peak-velocity time,
    /// or the last row when the peak lies past the end of the trial.
    pub fn max_velocity_row(&self) -> Option<usize> {
        let t = self.selectedmaxvelocity?;
        self.rows
            .iter()
            .position(|row| row.time_ms >= t)
            .or_else(|| self.rows.len().checked_sub(1))
    }

    fn set_accept(&mut self, accept: Accept) {
        for row in &mut self.rows {
            row.accept = accept;
        }
        info!("trial {} marked {:?}", self.trial, accept);
    }

    fn trial_window(&self) -> TrialWindow<'_> {
        TrialWindow {
            rows: &self.rows,
            p1: self.selectedp1,
            p2: self.selectedp2,
        }
    }

    fn suggest_peak<P: ProfileProvider + ?Sized>(&mut self, profiler: &P, mode: VelocityMode) {
        self.selectedmaxvelocity = profiler.velocity_profile(&self.trial_window(), mode).peak_time;
        self.peak_source = self.selectedmaxvelocity.map(|_| PeakSource::Suggested);
    }

    fn sync_window_from_selection(&mut self) {
        let mut selected = self.rows.iter().filter(|r| r.selected).map(|r| r.time_ms);
        self.selectedp1 = selected.next();
        self.selectedp2 = selected.last().or(self.selectedp1);
    }

    fn first_time(&self) -> Option<f64> {
        self.rows.first().map(|r| r.time_ms)
    }

    fn last_time(&self) -> Option<f64> {
        self.rows.last().map(|r| r.time_ms)
    }
}
