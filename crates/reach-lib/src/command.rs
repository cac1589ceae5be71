//! Scripted curation: one JSON object per user action.
//!
//! ```json
//! {"op": "set_window", "p1": 120.0, "p2": 840.0}
//! {"op": "accept"}
//! {"op": "next"}
//! ```

use crate::error::{CurateError, Result};
use crate::experiment::TrialId;
use crate::navigate::Direction;
use crate::profile::ProfileProvider;
use crate::session::{PickMode, Session, SessionStatus};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Command {
    SelectTrial { trial: TrialId },
    PickMode { mode: PickMode },
    Pick { t: f64 },
    SetWindow { p1: f64, p2: f64 },
    SetWindowStart { p1: f64 },
    SetWindowEnd { p2: f64 },
    SetMaxVelocity { t: f64 },
    Accept,
    Reject,
    Unsure { value: bool },
    Interpolated { value: bool },
    Reset,
    Next,
    Previous,
    Goto { trial: TrialId },
    NextUnresolved,
    Status,
    /// Without a path the table goes to `<stem>_selected.csv` next to the source.
    Export {
        #[serde(default)]
        path: Option<PathBuf>,
    },
}

impl Command {
    pub fn parse(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}

impl<P: ProfileProvider> Session<P> {
    /// Apply one command and report the resulting status.
    pub fn execute(&mut self, command: Command) -> Result<SessionStatus> {
        log::debug!("execute {:?}", command);
        match command {
            Command::SelectTrial { trial } => self.select_trial(trial).map(drop)?,
            Command::PickMode { mode } => self.set_pick_mode(mode),
            Command::Pick { t } => self.pick(t)?,
            Command::SetWindow { p1, p2 } => self.set_window(p1, p2)?,
            Command::SetWindowStart { p1 } => self.set_window_start(p1)?,
            Command::SetWindowEnd { p2 } => self.set_window_end(p2)?,
            Command::SetMaxVelocity { t } => self.set_max_velocity(t)?,
            Command::Accept => self.mark_accept()?,
            Command::Reject => self.mark_reject()?,
            Command::Unsure { value } => self.mark_unsure(value)?,
            Command::Interpolated { value } => self.mark_interpolated(value)?,
            Command::Reset => self.reset()?,
            Command::Next => self.advance(Direction::Next).map(drop)?,
            Command::Previous => self.advance(Direction::Previous).map(drop)?,
            Command::Goto { trial } => self.advance(Direction::Goto(trial)).map(drop)?,
            Command::NextUnresolved => self.advance(Direction::NextUnresolved).map(drop)?,
            Command::Status => {}
            Command::Export { path } => {
                let path = match path.or_else(|| self.default_output_path()) {
                    Some(path) => path,
                    None => {
                        return Err(CurateError::config(
                            "output",
                            "no export path and no source file to derive one from",
                        ))
                    }
                };
                self.export(&path)?
            }
        }
        Ok(self.status())
    }
}
