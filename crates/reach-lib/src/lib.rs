pub mod command;
pub mod curation;
pub mod error;
pub mod experiment;
pub mod io;
pub mod merge;
pub mod navigate;
pub mod plot;
pub mod profile;
pub mod segment;
pub mod session;
pub mod setting;
pub mod units;

pub use command::Command;
pub use error::{CurateError, Result};
pub use experiment::{Accept, CanonicalRow, Experiment, TrialId, TrialMode, TrialStatus};
pub use navigate::Direction;
pub use session::{load_experiment, PickMode, Session, SessionStatus};
pub use setting::{Setting, SettingsFolder};
