use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub type TrialId = u32;

/// Names of the canonical columns, in export order.
pub const CANONICAL_COLUMNS: [&str; 13] = [
    "trial_no",
    "time_ms",
    "cursorx_cm",
    "cursory_cm",
    "handx_cm",
    "handy_cm",
    "targetx_cm",
    "targety_cm",
    "accept",
    "max_velocity",
    "selected",
    "interpolated",
    "unsure",
];

/// Curation verdict shared by every row of a trial.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Accept {
    Rejected,
    #[default]
    Unreviewed,
    Accepted,
}

impl Accept {
    pub fn code(self) -> i8 {
        match self {
            Accept::Rejected => -1,
            Accept::Unreviewed => 0,
            Accept::Accepted => 1,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            -1 => Some(Accept::Rejected),
            0 => Some(Accept::Unreviewed),
            1 => Some(Accept::Accepted),
            _ => None,
        }
    }

    pub fn is_resolved(self) -> bool {
        self != Accept::Unreviewed
    }
}

/// One sample in canonical units (ms, cm) plus its curation columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub trial_no: TrialId,
    pub time_ms: f64,
    pub cursorx_cm: f64,
    pub cursory_cm: f64,
    pub handx_cm: f64,
    pub handy_cm: f64,
    pub targetx_cm: f64,
    pub targety_cm: f64,
    pub accept: Accept,
    pub max_velocity: bool,
    pub selected: bool,
    pub interpolated: bool,
    pub unsure: bool,
    /// Values of passthrough columns, aligned with [`Experiment::extra_columns`].
    pub extras: Vec<String>,
}

impl CanonicalRow {
    /// A freshly normalized sample with default curation columns.
    pub fn new(trial_no: TrialId, time_ms: f64) -> Self {
        Self {
            trial_no,
            time_ms,
            cursorx_cm: 0.0,
            cursory_cm: 0.0,
            handx_cm: 0.0,
            handy_cm: 0.0,
            targetx_cm: 0.0,
            targety_cm: 0.0,
            accept: Accept::Unreviewed,
            max_velocity: false,
            selected: true,
            interpolated: false,
            unsure: false,
            extras: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrialMode {
    Accepted,
    Rejected,
    #[serde(rename = "Not_Selected")]
    NotSelected,
}

impl TrialMode {
    pub fn label(self) -> &'static str {
        match self {
            TrialMode::Accepted => "Accepted",
            TrialMode::Rejected => "Rejected",
            TrialMode::NotSelected => "Not_Selected",
        }
    }
}

/// Curation status of one trial as stored in the output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrialStatus {
    pub trial: TrialId,
    pub mode: TrialMode,
    pub unsure: bool,
}

impl TrialStatus {
    pub fn is_resolved(&self) -> bool {
        self.mode != TrialMode::NotSelected
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExperimentSummary {
    pub rows: usize,
    pub trials: usize,
    pub first_trial: Option<TrialId>,
    pub last_trial: Option<TrialId>,
    pub accepted: usize,
    pub rejected: usize,
    pub unresolved: usize,
    pub unsure: usize,
    pub targets: Vec<[f64; 2]>,
    pub extra_columns: Vec<String>,
}

/// The full canonical output table and its derived indices.
#[derive(Debug, Clone, PartialEq)]
pub struct Experiment {
    rows: Vec<CanonicalRow>,
    extra_columns: Vec<String>,
    trial_order: Vec<TrialId>,
    trial_rows: BTreeMap<TrialId, Vec<usize>>,
    default_selection: BTreeMap<TrialId, Vec<bool>>,
    all_targets: Vec<[f64; 2]>,
    dirty: BTreeSet<TrialId>,
}

impl Experiment {
    /// Index rows by trial (first-seen order) and collect distinct targets.
    ///
    /// Default selections start as each row's current `selected` flag; the segmenter
    /// replaces them via [`Experiment::set_default_selection`].
    pub fn new(rows: Vec<CanonicalRow>, extra_columns: Vec<String>) -> Self {
        let mut trial_order = Vec::new();
        let mut trial_rows: BTreeMap<TrialId, Vec<usize>> = BTreeMap::new();
        for (idx, row) in rows.iter().enumerate() {
            let entry = trial_rows.entry(row.trial_no).or_insert_with(|| {
                trial_order.push(row.trial_no);
                Vec::new()
            });
            entry.push(idx);
        }
        let default_selection = trial_rows
            .iter()
            .map(|(trial, idxs)| (*trial, idxs.iter().map(|&i| rows[i].selected).collect()))
            .collect();
        let all_targets = unique_targets(&rows);
        Self {
            rows,
            extra_columns,
            trial_order,
            trial_rows,
            default_selection,
            all_targets,
            dirty: BTreeSet::new(),
        }
    }

    pub fn rows(&self) -> &[CanonicalRow] {
        &self.rows
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [CanonicalRow] {
        &mut self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn extra_columns(&self) -> &[String] {
        &self.extra_columns
    }

    pub fn extra_column_index(&self, name: &str) -> Option<usize> {
        self.extra_columns.iter().position(|c| c == name)
    }

    /// Distinct trial ids in first-seen order.
    pub fn trials(&self) -> &[TrialId] {
        &self.trial_order
    }

    pub fn contains_trial(&self, trial: TrialId) -> bool {
        self.trial_rows.contains_key(&trial)
    }

    pub fn position_of(&self, trial: TrialId) -> Option<usize> {
        self.trial_order.iter().position(|&t| t == trial)
    }

    /// Row indices of `trial` in the output table, in file order.
    pub fn row_indices(&self, trial: TrialId) -> &[usize] {
        self.trial_rows
            .get(&trial)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn trial_rows(&self, trial: TrialId) -> impl Iterator<Item = &CanonicalRow> + '_ {
        self.row_indices(trial).iter().map(move |&idx| &self.rows[idx])
    }

    /// Distinct `(targetx_cm, targety_cm)` pairs, sorted.
    pub fn all_targets(&self) -> &[[f64; 2]] {
        &self.all_targets
    }

    pub fn default_selection(&self, trial: TrialId) -> &[bool] {
        self.default_selection
            .get(&trial)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub(crate) fn set_default_selection(&mut self, trial: TrialId, selection: Vec<bool>) {
        self.default_selection.insert(trial, selection);
    }

    /// Uniform accept value of a trial, or `None` when its rows disagree.
    pub fn trial_accept(&self, trial: TrialId) -> Option<Accept> {
        let mut values = self.trial_rows(trial).map(|row| row.accept);
        let first = values.next()?;
        values.all(|v| v == first).then_some(first)
    }

    pub fn trial_status(&self, trial: TrialId) -> Option<TrialStatus> {
        if !self.contains_trial(trial) {
            return None;
        }
        let mode = match self.trial_accept(trial) {
            Some(Accept::Accepted) => TrialMode::Accepted,
            Some(Accept::Rejected) => TrialMode::Rejected,
            _ => TrialMode::NotSelected,
        };
        let unsure = self.trial_rows(trial).any(|row| row.unsure);
        Some(TrialStatus {
            trial,
            mode,
            unsure,
        })
    }

    pub fn statuses(&self) -> Vec<TrialStatus> {
        self.trial_order
            .iter()
            .filter_map(|&trial| self.trial_status(trial))
            .collect()
    }

    pub fn is_dirty(&self, trial: TrialId) -> bool {
        self.dirty.contains(&trial)
    }

    pub fn dirty_trials(&self) -> impl Iterator<Item = TrialId> + '_ {
        self.dirty.iter().copied()
    }

    pub(crate) fn mark_dirty(&mut self, trial: TrialId) {
        self.dirty.insert(trial);
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty.clear();
    }

    pub fn summary(&self) -> ExperimentSummary {
        let statuses = self.statuses();
        let count = |mode: TrialMode| statuses.iter().filter(|s| s.mode == mode).count();
        ExperimentSummary {
            rows: self.rows.len(),
            trials: self.trial_order.len(),
            first_trial: self.trial_order.first().copied(),
            last_trial: self.trial_order.iter().max().copied(),
            accepted: count(TrialMode::Accepted),
            rejected: count(TrialMode::Rejected),
            unresolved: count(TrialMode::NotSelected),
            unsure: statuses.iter().filter(|s| s.unsure).count(),
            targets: self.all_targets.clone(),
            extra_columns: self.extra_columns.clone(),
        }
    }
}

fn unique_targets(rows: &[CanonicalRow]) -> Vec<[f64; 2]> {
    let mut targets: Vec<[f64; 2]> = rows.iter().map(|r| [r.targetx_cm, r.targety_cm]).collect();
    targets.sort_by(|a, b| a[0].total_cmp(&b[0]).then(a[1].total_cmp(&b[1])));
    targets.dedup();
    targets
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Rows for `trials`, each with `samples` rows spaced 10 ms apart moving along x.
    pub(crate) fn sample_rows(trials: &[TrialId], samples: usize) -> Vec<CanonicalRow> {
        let mut rows = Vec::new();
        for &trial in trials {
            for i in 0..samples {
                let mut row = CanonicalRow::new(trial, i as f64 * 10.0);
                row.handx_cm = (i as f64).powi(2) * 0.1;
                row.cursorx_cm = row.handx_cm;
                row.targetx_cm = trial as f64;
                row.targety_cm = 5.0;
                rows.push(row);
            }
        }
        rows
    }

    #[test]
    fn groups_trials_in_first_seen_order() {
        let mut rows = sample_rows(&[3, 1], 2);
        rows.extend(sample_rows(&[3], 1));
        let exp = Experiment::new(rows, Vec::new());
        assert_eq!(exp.trials(), &[3, 1]);
        assert_eq!(exp.row_indices(3), &[0, 1, 4]);
        assert_eq!(exp.row_indices(1), &[2, 3]);
        assert_eq!(exp.position_of(1), Some(1));
    }

    #[test]
    fn targets_are_distinct() {
        let exp = Experiment::new(sample_rows(&[1, 2, 2], 3), Vec::new());
        assert_eq!(exp.all_targets(), &[[1.0, 5.0], [2.0, 5.0]]);
    }

    #[test]
    fn status_requires_uniform_accept() {
        let mut rows = sample_rows(&[1, 2], 2);
        rows[0].accept = Accept::Accepted;
        rows[1].accept = Accept::Accepted;
        rows[2].accept = Accept::Rejected;
        rows[3].unsure = true;
        let exp = Experiment::new(rows, Vec::new());
        assert_eq!(exp.trial_status(1).unwrap().mode, TrialMode::Accepted);
        let second = exp.trial_status(2).unwrap();
        assert_eq!(second.mode, TrialMode::NotSelected);
        assert!(second.unsure);
        let summary = exp.summary();
        assert_eq!(summary.accepted, 1);
        assert_eq!(summary.unresolved, 1);
        assert_eq!(summary.unsure, 1);
    }
}
