use serde::{Serialize, Serializer};
use std::fmt;

/// Why a correction could not be judged as correct.
#[derive(Serialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The process did not finish within the deadline.
    Timeout,
    /// The command or the script could not be executed.
    ScriptNotFound,
    /// The process exited with a nonzero status.
    RuntimeFailure,
    /// The configured verifier name is not registered.
    UnknownVerifier,
    /// The verifier itself panicked while checking the output.
    VerifierFailure,
    /// The process ran fine but its output did not satisfy the verifier. Reported through
    /// [`Verdict::Incorrect`], never through [`Verdict::Error`].
    VerificationMismatch,
    /// The run was stopped by the caller before it finished.
    Cancelled,
}

impl ErrorKind {
    fn fallback_message(self) -> &'static str {
        match self {
            ErrorKind::Timeout => "Timeout expired.",
            ErrorKind::ScriptNotFound => "Script not found.",
            ErrorKind::RuntimeFailure => "Script failed.",
            ErrorKind::UnknownVerifier => "Unknown verifier.",
            ErrorKind::VerifierFailure => "Verifier failed.",
            ErrorKind::VerificationMismatch => "Output did not match the expectation.",
            ErrorKind::Cancelled => "Run cancelled.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::ScriptNotFound => "script not found",
            ErrorKind::RuntimeFailure => "runtime failure",
            ErrorKind::UnknownVerifier => "unknown verifier",
            ErrorKind::VerifierFailure => "verifier failure",
            ErrorKind::VerificationMismatch => "verification mismatch",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Outcome of one correction.
///
/// A verdict is never edited: each run replaces it wholesale, passing through `Running`.
/// `Incorrect` and `Error` always carry a non-empty message; build them with
/// [`Verdict::incorrect`] and [`Verdict::error`] to keep it that way.
#[derive(Debug, Default, PartialEq, Eq, Clone)]
pub enum Verdict {
    #[default]
    NotRun,
    Running,
    Correct,
    Incorrect(String),
    Error(ErrorKind, String),
}

impl Verdict {
    pub fn incorrect(message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Verdict::Incorrect(
                ErrorKind::VerificationMismatch
                    .fallback_message()
                    .to_string(),
            );
        }
        Verdict::Incorrect(message)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        let message = message.into();
        if message.trim().is_empty() {
            return Verdict::Error(kind, kind.fallback_message().to_string());
        }
        Verdict::Error(kind, message)
    }

    pub fn is_correct(&self) -> bool {
        matches!(self, Verdict::Correct)
    }

    /// Whether the correction reached a terminal state.
    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            Verdict::Correct | Verdict::Incorrect(_) | Verdict::Error(..)
        )
    }

    /// The failure kind, `VerificationMismatch` for `Incorrect`.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Verdict::Incorrect(_) => Some(ErrorKind::VerificationMismatch),
            Verdict::Error(kind, _) => Some(*kind),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Verdict::Incorrect(message) | Verdict::Error(_, message) => Some(message),
            _ => None,
        }
    }

    fn state_name(&self) -> &'static str {
        match self {
            Verdict::NotRun => "not_run",
            Verdict::Running => "running",
            Verdict::Correct => "correct",
            Verdict::Incorrect(_) => "incorrect",
            Verdict::Error(..) => "error",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::NotRun => f.write_str("Not run"),
            Verdict::Running => f.write_str("Running"),
            Verdict::Correct => f.write_str("Correct"),
            Verdict::Incorrect(message) => write!(f, "Incorrect: {message}"),
            Verdict::Error(kind, message) => write!(f, "Error ({kind}): {message}"),
        }
    }
}

#[derive(Serialize)]
struct VerdictRepr<'a> {
    state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

impl Serialize for Verdict {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let kind = match self {
            Verdict::Error(kind, _) => Some(*kind),
            _ => None,
        };
        VerdictRepr {
            state: self.state_name(),
            kind,
            message: self.message(),
        }
        .serialize(serializer)
    }
}

/// Status of a question, derived from the verdicts of its corrections.
#[derive(Serialize, Debug, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QuestionStatus {
    /// No correction has been run.
    NotRun,
    /// At least one correction is still running.
    Running,
    /// Every correction is correct.
    Correct,
    /// Some corrections are correct and the others have not been run yet.
    Incomplete,
    /// At least one correction is incorrect and none has errored.
    Incorrect,
    /// At least one correction has errored.
    Error,
}

impl QuestionStatus {
    /// Derives the status from the current verdicts. It is a pure function of its input,
    /// so it can be recomputed from partial results at any time.
    pub fn from_verdicts<'a, I>(verdicts: I) -> Self
    where
        I: IntoIterator<Item = &'a Verdict>,
    {
        let mut total = 0;
        let (mut not_run, mut running, mut correct, mut incorrect, mut error) = (0, 0, 0, 0, 0);
        for verdict in verdicts {
            total += 1;
            match verdict {
                Verdict::NotRun => not_run += 1,
                Verdict::Running => running += 1,
                Verdict::Correct => correct += 1,
                Verdict::Incorrect(_) => incorrect += 1,
                Verdict::Error(..) => error += 1,
            }
        }

        if not_run == total {
            QuestionStatus::NotRun
        } else if running > 0 {
            QuestionStatus::Running
        } else if correct == total {
            QuestionStatus::Correct
        } else if error > 0 {
            QuestionStatus::Error
        } else if incorrect > 0 {
            QuestionStatus::Incorrect
        } else {
            QuestionStatus::Incomplete
        }
    }

    pub fn is_correct(self) -> bool {
        self == QuestionStatus::Correct
    }
}

impl fmt::Display for QuestionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QuestionStatus::NotRun => "Not run",
            QuestionStatus::Running => "Running",
            QuestionStatus::Correct => "Correct",
            QuestionStatus::Incomplete => "Incomplete",
            QuestionStatus::Incorrect => "Incorrect",
            QuestionStatus::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Coarse standing of a `correct of total` count.
#[derive(Serialize, Debug, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum Standing {
    AllCorrect,
    Partial,
    NoneCorrect,
}

impl Standing {
    pub fn from_counts(correct: usize, total: usize) -> Self {
        if correct == total {
            Standing::AllCorrect
        } else if correct == 0 {
            Standing::NoneCorrect
        } else {
            Standing::Partial
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod verdict_tests {
        use super::*;

        #[test]
        fn should_never_build_failures_with_empty_messages() {
            assert_eq!(
                Verdict::incorrect(""),
                Verdict::Incorrect("Output did not match the expectation.".to_string())
            );
            assert_eq!(
                Verdict::error(ErrorKind::Timeout, "  \n"),
                Verdict::Error(ErrorKind::Timeout, "Timeout expired.".to_string())
            );
            assert_eq!(
                Verdict::incorrect("Expected 'a', got 'b'").message(),
                Some("Expected 'a', got 'b'")
            );
        }

        #[test]
        fn should_report_failure_kinds() {
            assert_eq!(Verdict::Correct.failure_kind(), None);
            assert_eq!(
                Verdict::incorrect("x").failure_kind(),
                Some(ErrorKind::VerificationMismatch)
            );
            assert_eq!(
                Verdict::error(ErrorKind::ScriptNotFound, "x").failure_kind(),
                Some(ErrorKind::ScriptNotFound)
            );
        }

        #[test]
        fn should_serialize_with_state_tag() {
            let json = serde_json::to_value(Verdict::error(ErrorKind::Timeout, "late")).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"state": "error", "kind": "timeout", "message": "late"})
            );
            let json = serde_json::to_value(Verdict::Correct).unwrap();
            assert_eq!(json, serde_json::json!({"state": "correct"}));
        }

        #[test]
        fn should_display_human_readable_text() {
            assert_eq!(Verdict::NotRun.to_string(), "Not run");
            assert_eq!(
                Verdict::error(ErrorKind::RuntimeFailure, "Error (1): boom").to_string(),
                "Error (runtime failure): Error (1): boom"
            );
        }
    }

    mod question_status_tests {
        use super::*;

        fn status(verdicts: &[Verdict]) -> QuestionStatus {
            QuestionStatus::from_verdicts(verdicts)
        }

        #[test]
        fn should_be_correct_only_when_every_correction_is_correct() {
            let all = [Verdict::Correct, Verdict::Correct, Verdict::Correct];
            assert_eq!(status(&all), QuestionStatus::Correct);

            let one_wrong = [
                Verdict::Correct,
                Verdict::Correct,
                Verdict::incorrect("wrong"),
            ];
            assert_ne!(status(&one_wrong), QuestionStatus::Correct);
            assert_eq!(status(&one_wrong), QuestionStatus::Incorrect);
        }

        #[test]
        fn should_be_not_run_when_nothing_ran() {
            let verdicts = [Verdict::NotRun, Verdict::NotRun, Verdict::NotRun];
            assert_eq!(status(&verdicts), QuestionStatus::NotRun);
            assert_eq!(status(&[]), QuestionStatus::NotRun);
        }

        #[test]
        fn should_let_errors_dominate_mismatches() {
            let verdicts = [
                Verdict::incorrect("wrong"),
                Verdict::error(ErrorKind::Timeout, "late"),
                Verdict::Correct,
            ];
            assert_eq!(status(&verdicts), QuestionStatus::Error);
        }

        #[test]
        fn should_report_running_and_incomplete_partial_results() {
            let running = [Verdict::Correct, Verdict::Running, Verdict::NotRun];
            assert_eq!(status(&running), QuestionStatus::Running);

            let incomplete = [Verdict::Correct, Verdict::NotRun];
            assert_eq!(status(&incomplete), QuestionStatus::Incomplete);
            assert!(!status(&incomplete).is_correct());
        }

        #[test]
        fn should_be_idempotent() {
            let verdicts = vec![
                Verdict::Correct,
                Verdict::error(ErrorKind::ScriptNotFound, "missing"),
            ];
            assert_eq!(status(&verdicts), status(&verdicts));
        }
    }

    #[test]
    fn should_compute_standing_from_counts() {
        assert_eq!(Standing::from_counts(3, 3), Standing::AllCorrect);
        assert_eq!(Standing::from_counts(0, 3), Standing::NoneCorrect);
        assert_eq!(Standing::from_counts(1, 3), Standing::Partial);
    }
}
