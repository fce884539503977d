use crate::grader::{
    CorrectionId, RunOptions,
    correction::Correction,
    question::{Question, QuestionSummary},
    runner::CancelToken,
    verdict::Standing,
    verifier::VerifierRegistry,
};
use log::info;
use serde::Serialize;

/// The graded unit: a title and its questions, in configuration order.
#[derive(Debug)]
pub struct Assignment {
    title: String,
    questions: Vec<Question>,
}

impl Assignment {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            questions: vec![],
        }
    }

    pub fn with_question(mut self, question: Question) -> Self {
        self.add_question(question);
        self
    }

    pub fn add_question(&mut self, question: Question) {
        self.questions.push(question);
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn question(&self, index: usize) -> Option<&Question> {
        self.questions.get(index)
    }

    pub fn correction(&self, id: CorrectionId) -> Option<&Correction> {
        self.question(id.question)?.correction(id.correction)
    }

    /// Every correction id, question by question, in configuration order.
    pub fn correction_ids(&self) -> Vec<CorrectionId> {
        self.questions
            .iter()
            .enumerate()
            .flat_map(|(question, q)| {
                (0..q.corrections().len()).map(move |correction| CorrectionId {
                    question,
                    correction,
                })
            })
            .collect()
    }

    /// Number of questions whose status is `Correct`, recomputed from the verdicts.
    pub fn correct_questions(&self) -> usize {
        self.questions
            .iter()
            .filter(|q| q.status().is_correct())
            .count()
    }

    pub fn summary(&self) -> AssignmentSummary {
        let questions: Vec<QuestionSummary> = self.questions.iter().map(Question::summary).collect();
        let correct_questions = questions.iter().filter(|q| q.status.is_correct()).count();
        let total_questions = questions.len();
        AssignmentSummary {
            title: self.title.clone(),
            correct_questions,
            total_questions,
            standing: Standing::from_counts(correct_questions, total_questions),
            questions,
        }
    }

    /// Runs every question in order.
    pub fn run(
        &self,
        registry: &VerifierRegistry,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> AssignmentSummary {
        info!("📝 Grading assignment: '{}'", self.title);
        for question in &self.questions {
            if cancel.is_cancelled() {
                break;
            }
            question.run(registry, options, cancel);
        }
        let summary = self.summary();
        info!(
            "🏁 Correct: {} of {}",
            summary.correct_questions, summary.total_questions
        );
        summary
    }
}

/// The grade signal: how many questions are fully correct.
#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub struct AssignmentSummary {
    pub title: String,
    pub correct_questions: usize,
    pub total_questions: usize,
    pub standing: Standing,
    pub questions: Vec<QuestionSummary>,
}
