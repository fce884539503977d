pub(crate) mod assignment;
pub(crate) mod correction;
pub(crate) mod os_interface;
pub(crate) mod pool;
pub(crate) mod question;
pub(crate) mod runner;
pub(crate) mod verdict;
pub(crate) mod verifier;

use crate::error::GraderError;
use assignment::{Assignment, AssignmentSummary};
use log::info;
use os_interface::ArgsMode;
use question::{Question, QuestionSummary};
use runner::{CancelToken, DEFAULT_TIMEOUT};
use serde::Serialize;
use std::{path::PathBuf, time::Duration};
use verdict::{QuestionStatus, Verdict};
use verifier::VerifierRegistry;

pub use pool::default_jobs;

/// Settings shared by every run.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct RunOptions {
    /// Wall-clock limit of each process.
    pub timeout: Duration,
    pub args_mode: ArgsMode,
    /// Directory the scripts run in and relative script paths are resolved against.
    /// `None` means the current directory.
    pub working_dir: Option<PathBuf>,
    /// Exit codes that mean "script not found" for the configured interpreters. Empty by
    /// default: missing scripts are detected before spawning.
    pub not_found_exit_codes: Vec<i32>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            args_mode: ArgsMode::default(),
            working_dir: None,
            not_found_exit_codes: vec![],
        }
    }
}

/// Position of a correction: question index, then correction index, both 0-based.
#[derive(Serialize, Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct CorrectionId {
    pub question: usize,
    pub correction: usize,
}

/// Entry point for a presentation layer: owns the assignment, the verifiers and the run
/// options, and exposes the run operations and read-only views of the results.
///
/// Every operation takes `&self`; verdicts live in per-correction slots, so a `Grader` can
/// be shared between threads while runs are in progress.
#[derive(Debug)]
pub struct Grader {
    assignment: Assignment,
    registry: VerifierRegistry,
    options: RunOptions,
}

impl Grader {
    pub fn new(assignment: Assignment, options: RunOptions) -> Self {
        Self {
            assignment,
            registry: VerifierRegistry::with_builtins(),
            options,
        }
    }

    pub fn with_registry(mut self, registry: VerifierRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut VerifierRegistry {
        &mut self.registry
    }

    pub fn assignment(&self) -> &Assignment {
        &self.assignment
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    fn question_at(&self, index: usize) -> Result<&Question, GraderError> {
        self.assignment
            .question(index)
            .ok_or(GraderError::QuestionOutOfRange {
                index,
                len: self.assignment.questions().len(),
            })
    }

    fn checked_id(&self, id: CorrectionId) -> Result<CorrectionId, GraderError> {
        let question = self.question_at(id.question)?;
        let len = question.corrections().len();
        if id.correction >= len {
            return Err(GraderError::CorrectionOutOfRange {
                question: id.question,
                index: id.correction,
                len,
            });
        }
        Ok(id)
    }

    /// Runs one correction and returns its new verdict.
    pub fn run_correction(
        &self,
        question: usize,
        correction: usize,
    ) -> Result<Verdict, GraderError> {
        let id = self.checked_id(CorrectionId {
            question,
            correction,
        })?;
        let verdict = self
            .question_at(id.question)?
            .corrections()[id.correction]
            .run(&self.registry, &self.options, &CancelToken::new());
        Ok(verdict)
    }

    /// Runs every correction of a question, in order.
    pub fn run_question(&self, question: usize) -> Result<QuestionSummary, GraderError> {
        let question = self.question_at(question)?;
        Ok(question.run(&self.registry, &self.options, &CancelToken::new()))
    }

    /// Runs every question, in order.
    pub fn run_all(&self) -> AssignmentSummary {
        self.assignment
            .run(&self.registry, &self.options, &CancelToken::new())
    }

    /// Runs the corrections of one question on up to `jobs` workers, calling `on_verdict`
    /// as each one finishes.
    pub fn run_question_concurrently<F>(
        &self,
        question: usize,
        jobs: usize,
        cancel: &CancelToken,
        on_verdict: F,
    ) -> Result<QuestionSummary, GraderError>
    where
        F: Fn(CorrectionId, &Verdict) + Sync,
    {
        let q = self.question_at(question)?;
        let ids: Vec<CorrectionId> = (0..q.corrections().len())
            .map(|correction| CorrectionId {
                question,
                correction,
            })
            .collect();
        pool::run_batch(
            &self.assignment,
            &self.registry,
            &self.options,
            &ids,
            jobs,
            cancel,
            on_verdict,
        );
        Ok(q.summary())
    }

    /// Runs every correction of the assignment on up to `jobs` workers, calling
    /// `on_verdict` as each one finishes. Raising `cancel` kills the running processes and
    /// leaves the corrections not yet started untouched.
    pub fn run_all_concurrently<F>(
        &self,
        jobs: usize,
        cancel: &CancelToken,
        on_verdict: F,
    ) -> AssignmentSummary
    where
        F: Fn(CorrectionId, &Verdict) + Sync,
    {
        info!("📝 Grading assignment: '{}'", self.assignment.title());
        pool::run_batch(
            &self.assignment,
            &self.registry,
            &self.options,
            &self.assignment.correction_ids(),
            jobs,
            cancel,
            on_verdict,
        );
        let summary = self.assignment.summary();
        info!(
            "🏁 Correct: {} of {}",
            summary.correct_questions, summary.total_questions
        );
        summary
    }

    /// Current verdict of a correction.
    pub fn verdict(&self, question: usize, correction: usize) -> Result<Verdict, GraderError> {
        let id = self.checked_id(CorrectionId {
            question,
            correction,
        })?;
        Ok(self.question_at(id.question)?.corrections()[id.correction].verdict())
    }

    /// Current status of a question, derived from its verdicts.
    pub fn question_status(&self, question: usize) -> Result<QuestionStatus, GraderError> {
        Ok(self.question_at(question)?.status())
    }

    /// Current state of the whole assignment.
    pub fn summary(&self) -> AssignmentSummary {
        self.assignment.summary()
    }
}
