use std::{io, path::PathBuf};

/// Errors caused by the caller or by the configuration, never by a graded script.
///
/// Anything that goes wrong while running a script is reported as a
/// [`Verdict`](crate::Verdict) instead.
#[derive(Debug, thiserror::Error)]
pub enum GraderError {
    #[error("question {index} does not exist (assignment has {len} questions)")]
    QuestionOutOfRange { index: usize, len: usize },

    #[error("correction {index} does not exist in question {question} ({len} corrections)")]
    CorrectionOutOfRange {
        question: usize,
        index: usize,
        len: usize,
    },

    #[error("unable to read configuration file {}: {source}", path.display())]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] serde_json::Error),
}
