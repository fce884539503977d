use crate::grader::{
    RunOptions,
    correction::{Correction, CorrectionSummary},
    runner::CancelToken,
    verdict::{QuestionStatus, Standing, Verdict},
    verifier::VerifierRegistry,
};
use log::info;
use serde::Serialize;

/// One gradable exercise: a script, the command that runs it and its test cases.
#[derive(Debug)]
pub struct Question {
    description: String,
    command: String,
    script_path: String,
    corrections: Vec<Correction>,
}

impl Question {
    pub fn new(
        description: impl Into<String>,
        command: impl Into<String>,
        script_path: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            command: command.into(),
            script_path: script_path.into(),
            corrections: vec![],
        }
    }

    pub fn with_correction(mut self, correction: Correction) -> Self {
        self.add_correction(correction);
        self
    }

    pub fn add_correction(&mut self, correction: Correction) {
        self.corrections.push(correction);
    }

    /// A correction bound to this question's command and script, ready to be configured.
    pub fn new_correction(&self) -> Correction {
        Correction::new(self.command.clone(), self.script_path.clone())
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    /// Corrections in configuration order.
    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    pub fn correction(&self, index: usize) -> Option<&Correction> {
        self.corrections.get(index)
    }

    pub fn verdicts(&self) -> Vec<Verdict> {
        self.corrections.iter().map(Correction::verdict).collect()
    }

    /// Derived on every call from the current verdicts; never cached.
    pub fn status(&self) -> QuestionStatus {
        QuestionStatus::from_verdicts(&self.verdicts())
    }

    pub fn correct_count(&self) -> usize {
        self.corrections
            .iter()
            .filter(|c| c.verdict().is_correct())
            .count()
    }

    pub fn summary(&self) -> QuestionSummary {
        let corrections: Vec<CorrectionSummary> =
            self.corrections.iter().map(Correction::summary).collect();
        let status = QuestionStatus::from_verdicts(corrections.iter().map(|c| &c.verdict));
        let correct = corrections.iter().filter(|c| c.verdict.is_correct()).count();
        let total = corrections.len();
        QuestionSummary {
            description: self.description.clone(),
            status,
            correct,
            total,
            standing: Standing::from_counts(correct, total),
            corrections,
        }
    }

    /// Runs every correction in order. A failing correction does not stop the others.
    /// Stops early only when `cancel` is raised; corrections not started keep their
    /// previous verdict.
    pub fn run(
        &self,
        registry: &VerifierRegistry,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> QuestionSummary {
        info!("📚 Grading question: '{}'", self.description);
        for (i, correction) in self.corrections.iter().enumerate() {
            if cancel.is_cancelled() {
                info!("🛑 Grading of '{}' cancelled", self.description);
                break;
            }
            correction.run(registry, options, cancel);
            info!(
                "Question '{}' after correction {}: {}",
                self.description,
                i + 1,
                self.status()
            );
        }
        self.summary()
    }
}

/// Snapshot of a question, e.g. for a `Correct: 2 of 3` label.
#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub struct QuestionSummary {
    pub description: String,
    pub status: QuestionStatus,
    pub correct: usize,
    pub total: usize,
    pub standing: Standing,
    pub corrections: Vec<CorrectionSummary>,
}
