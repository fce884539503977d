//! Grading engine for small command-line programs.
//!
//! An [`Assignment`] is a list of [`Question`]s, and each question is a list of
//! [`Correction`]s (test cases). Running a correction executes the student's script as an
//! external process, feeds it the configured input and checks the captured output with a
//! named verifier from the [`VerifierRegistry`]. Every outcome, including timeouts and
//! missing scripts, is reported as a [`Verdict`]; the run operations never fail because a
//! script misbehaved.
//!
//! The [`Grader`] is the interface a presentation layer drives:
//!
//! ```no_run
//! use script_grader::{Grader, RunOptions, load_assignment};
//!
//! let assignment = load_assignment("config.json").unwrap();
//! let grader = Grader::new(assignment, RunOptions::default());
//! let summary = grader.run_all();
//! println!("{} of {}", summary.correct_questions, summary.total_questions);
//! ```

mod config;
mod error;
mod grader;
mod report;

#[cfg(test)]
mod utils;

pub use config::{load_assignment, parse_assignment};
pub use error::GraderError;
pub use grader::assignment::{Assignment, AssignmentSummary};
pub use grader::correction::{Correction, CorrectionSummary};
pub use grader::os_interface::{ArgsMode, Launcher, SpawnFailure};
pub use grader::question::{Question, QuestionSummary};
pub use grader::runner::{CancelToken, ExecutionOutcome, Invocation};
pub use grader::verdict::{ErrorKind, QuestionStatus, Standing, Verdict};
pub use grader::verifier::{Check, VerifierFn, VerifierRegistry};
pub use grader::{CorrectionId, Grader, RunOptions, default_jobs};
pub use report::ReportOutput;

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// How chatty the engine should be.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum LoggingMode {
    Silent,
    #[default]
    Normal,
    Verbose,
}

impl LoggingMode {
    pub fn level_filter(self) -> log::LevelFilter {
        match self {
            LoggingMode::Silent => log::LevelFilter::Off,
            LoggingMode::Normal => log::LevelFilter::Info,
            LoggingMode::Verbose => log::LevelFilter::Debug,
        }
    }
}

impl FromStr for LoggingMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "silent" => Ok(LoggingMode::Silent),
            "normal" => Ok(LoggingMode::Normal),
            "verbose" => Ok(LoggingMode::Verbose),
            _ => Err("expected one of: silent, normal, verbose"),
        }
    }
}
