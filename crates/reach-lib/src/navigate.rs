use crate::error::{CurateError, Result};
use crate::experiment::{Experiment, TrialId, TrialMode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Next,
    Previous,
    Goto(TrialId),
    NextUnresolved,
}

/// Trial reached from `current` by moving in `direction`.
///
/// `Next`/`Previous` stop at the ends of the trial order and need a current trial.
/// `Goto` fails for unknown trials.
pub fn resolve(
    experiment: &Experiment,
    current: Option<TrialId>,
    direction: Direction,
) -> Result<TrialId> {
    let order = experiment.trials();
    match direction {
        Direction::Goto(trial) => {
            if experiment.contains_trial(trial) {
                Ok(trial)
            } else {
                Err(CurateError::UnknownTrial(trial))
            }
        }
        Direction::NextUnresolved => next_unresolved(experiment).ok_or(CurateError::NoActiveTrial),
        Direction::Next | Direction::Previous => {
            let current = current.ok_or(CurateError::NoActiveTrial)?;
            let pos = experiment
                .position_of(current)
                .ok_or(CurateError::UnknownTrial(current))?;
            let target = match direction {
                Direction::Next => (pos + 1).min(order.len() - 1),
                _ => pos.saturating_sub(1),
            };
            Ok(order[target])
        }
    }
}

/// Lowest trial that is neither fully accepted nor fully rejected; failing that, the
/// lowest unsure trial; failing that, the highest trial id as the "all done" answer.
pub fn next_unresolved(experiment: &Experiment) -> Option<TrialId> {
    let statuses = experiment.statuses();
    statuses
        .iter()
        .filter(|s| s.mode == TrialMode::NotSelected)
        .map(|s| s.trial)
        .min()
        .or_else(|| statuses.iter().filter(|s| s.unsure).map(|s| s.trial).min())
        .or_else(|| experiment.trials().iter().copied().max())
}
