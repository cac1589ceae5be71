use crate::error::{CurateError, Result};
use crate::experiment::{CanonicalRow, Experiment};
use crate::setting::{SegmentBounds, Setting};
use crate::units::NormalizedTable;

/// Passthrough column holding the sample's step index within its trial.
pub const STEP_COLUMN: &str = "step";

/// Group canonical rows into trials and seed each trial's default selection.
///
/// Trials that already carry a uniform accept/reject verdict keep their `selected`
/// flags so reopening a curated file is idempotent.
pub fn segment(table: NormalizedTable, setting: &Setting) -> Result<Experiment> {
    if let Some(bounds) = setting.segments {
        if bounds.start > bounds.end {
            return Err(CurateError::config(
                "Segments",
                format!("start {} is after end {}", bounds.start, bounds.end),
            ));
        }
    }

    let mut experiment = Experiment::new(table.rows, table.extra_columns);
    let step_idx = experiment.extra_column_index(STEP_COLUMN);
    let trials = experiment.trials().to_vec();
    let mut reseeded = 0;
    for trial in trials {
        let indices = experiment.row_indices(trial).to_vec();
        let defaults = indices
            .iter()
            .map(|&idx| in_segment(&experiment.rows()[idx], step_idx, setting.segments))
            .collect::<Result<Vec<bool>>>()?;

        let resolved = experiment
            .trial_accept(trial)
            .map(|accept| accept.is_resolved())
            .unwrap_or(false);
        if !resolved {
            let rows = experiment.rows_mut();
            for (&idx, &selected) in indices.iter().zip(&defaults) {
                rows[idx].selected = selected;
            }
            reseeded += 1;
        }
        experiment.set_default_selection(trial, defaults);
    }
    log::info!(
        "segmented {} trials ({} seeded from {})",
        experiment.trials().len(),
        reseeded,
        match (setting.segments, step_idx) {
            (None, _) => "whole trial",
            (Some(_), Some(_)) => "step bounds",
            (Some(_), None) => "time bounds",
        }
    );
    Ok(experiment)
}

fn in_segment(
    row: &CanonicalRow,
    step_idx: Option<usize>,
    bounds: Option<SegmentBounds>,
) -> Result<bool> {
    let Some(bounds) = bounds else {
        return Ok(true);
    };
    let position = match step_idx.and_then(|idx| row.extras.get(idx)) {
        Some(step) => step.trim().parse::<f64>().map_err(|_| {
            CurateError::schema(
                STEP_COLUMN,
                format!(
                    "trial {} at {} ms: '{}' is not a number",
                    row.trial_no, row.time_ms, step
                ),
            )
        })?,
        None => row.time_ms,
    };
    Ok(position >= bounds.start && position <= bounds.end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::tests::sample_rows;
    use crate::experiment::Accept;

    fn table(rows: Vec<CanonicalRow>, extras: &[&str]) -> NormalizedTable {
        NormalizedTable {
            rows,
            extra_columns: extras.iter().map(|s| s.to_string()).collect(),
            dropped: 0,
        }
    }

    fn bounds(start: f64, end: f64) -> Setting {
        Setting {
            segments: Some(SegmentBounds { start, end }),
            ..Setting::default()
        }
    }

    #[test]
    fn empty_bounds_select_whole_trial() {
        let mut rows = sample_rows(&[1, 2], 4);
        rows.iter_mut().for_each(|r| r.selected = false);
        let exp = segment(table(rows, &[]), &Setting::default()).unwrap();
        assert!(exp.rows().iter().all(|r| r.selected));
        assert_eq!(exp.default_selection(2), &[true, true, true, true]);
    }

    #[test]
    fn time_bounds_are_inclusive() {
        let exp = segment(table(sample_rows(&[1], 5), &[]), &bounds(10.0, 30.0)).unwrap();
        let selected: Vec<bool> = exp.rows().iter().map(|r| r.selected).collect();
        assert_eq!(selected, vec![false, true, true, true, false]);
    }

    #[test]
    fn step_column_takes_precedence() {
        let mut rows = sample_rows(&[1], 4);
        for (i, row) in rows.iter_mut().enumerate() {
            row.extras = vec![(i + 1).to_string()];
        }
        let exp = segment(table(rows, &["step"]), &bounds(3.0, 4.0)).unwrap();
        let selected: Vec<bool> = exp.rows().iter().map(|r| r.selected).collect();
        assert_eq!(selected, vec![false, false, true, true]);
    }

    #[test]
    fn bad_step_cell_names_trial_and_time() {
        let mut rows = sample_rows(&[4], 3);
        for (i, row) in rows.iter_mut().enumerate() {
            row.extras = vec![if i == 2 { "x".to_string() } else { i.to_string() }];
        }
        let err = segment(table(rows, &["step"]), &bounds(0.0, 1.0)).unwrap_err();
        match err {
            CurateError::Schema { column, message } => {
                assert_eq!(column, "step");
                assert_eq!(message, "trial 4 at 20 ms: 'x' is not a number");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn resolved_trials_keep_their_selection() {
        let mut rows = sample_rows(&[1, 2], 3);
        for row in rows.iter_mut().filter(|r| r.trial_no == 1) {
            row.accept = Accept::Accepted;
            row.selected = row.time_ms == 0.0;
        }
        let exp = segment(table(rows, &[]), &Setting::default()).unwrap();
        let first: Vec<bool> = exp.trial_rows(1).map(|r| r.selected).collect();
        assert_eq!(first, vec![true, false, false]);
        assert_eq!(exp.default_selection(1), &[true, true, true]);
        assert!(exp.trial_rows(2).all(|r| r.selected));
    }

    #[test]
    fn inverted_bounds_are_config_error() {
        let err = segment(table(sample_rows(&[1], 2), &[]), &bounds(5.0, 1.0)).unwrap_err();
        assert!(matches!(err, CurateError::Config { ref key, .. } if key == "Segments"));
    }
}
