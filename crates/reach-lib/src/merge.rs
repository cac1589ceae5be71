use crate::curation::TrialWorkingCopy;
use crate::error::Result;
use crate::experiment::Experiment;
use crate::io::curated::write_table;
use crate::io::raw::CURATED_MARKER;
use std::path::{Path, PathBuf};

/// Write the working copy's curation columns back into the output table.
///
/// Rows are matched by their position in the output table, recorded when the trial was
/// opened. `accept` and `unsure` are written uniformly across the trial. When the peak is
/// recorded (see [`TrialWorkingCopy::records_peak`]) exactly one row, the first at or
/// after the peak time, carries the `max_velocity` marker; otherwise none does, so a
/// trial that was only viewed stays untouched.
/// Returns whether any row changed; the trial is then marked dirty.
pub fn commit(working: &TrialWorkingCopy, experiment: &mut Experiment) -> bool {
    let accept = working.accept();
    let unsure = working.unsure();
    let marker = working
        .max_velocity_row()
        .filter(|_| working.records_peak());
    let mut changed = false;
    {
        let rows = experiment.rows_mut();
        for (pos, (&idx, source)) in working
            .row_indices()
            .iter()
            .zip(working.rows())
            .enumerate()
        {
            let row = &mut rows[idx];
            let before = (
                row.selected,
                row.accept,
                row.unsure,
                row.interpolated,
                row.max_velocity,
            );
            row.selected = source.selected;
            row.accept = accept;
            row.unsure = unsure;
            row.interpolated = source.interpolated;
            row.max_velocity = marker == Some(pos);
            changed |= before
                != (
                    row.selected,
                    row.accept,
                    row.unsure,
                    row.interpolated,
                    row.max_velocity,
                );
        }
    }
    if changed {
        experiment.mark_dirty(working.trial());
    }
    log::info!(
        "committed trial {} ({:?}, unsure={}, changed={})",
        working.trial(),
        accept,
        unsure,
        changed
    );
    changed
}

/// Serialize the full output table and mark every trial clean.
pub fn export(experiment: &mut Experiment, path: &Path) -> Result<()> {
    write_table(path, experiment)?;
    experiment.mark_clean();
    Ok(())
}

/// `<dir>/<stem>_selected.csv`, or `<dir>/<stem>.csv` when the stem is already curated.
pub fn output_path_for(source: &Path) -> PathBuf {
    let stem = source
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("experiment");
    let name = if stem.contains(CURATED_MARKER) {
        format!("{}.csv", stem)
    } else {
        format!("{}_{}.csv", stem, CURATED_MARKER)
    };
    source.with_file_name(name)
}
