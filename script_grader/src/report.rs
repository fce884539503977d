use crate::grader::{assignment::AssignmentSummary, correction::CorrectionSummary};
use serde::{Deserialize, Serialize};
use std::{fmt::Write, str::FromStr};

#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ReportOutput {
    #[default]
    Text,
    Json,
}

impl FromStr for ReportOutput {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(ReportOutput::Text),
            "json" => Ok(ReportOutput::Json),
            _ => Err("expected one of: text, json"),
        }
    }
}

impl ReportOutput {
    /// Renders a summary. `verbose` adds the input and captured output of every correction
    /// to the text report; the JSON report always carries everything.
    pub fn render(self, summary: &AssignmentSummary, verbose: bool) -> serde_json::Result<String> {
        match self {
            ReportOutput::Text => Ok(render_text(summary, verbose)),
            ReportOutput::Json => serde_json::to_string_pretty(summary),
        }
    }
}

fn render_text(summary: &AssignmentSummary, verbose: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", summary.title);
    let _ = writeln!(
        out,
        "Correct: {} of {}",
        summary.correct_questions, summary.total_questions
    );
    for question in &summary.questions {
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{} [{}] Correct: {} of {}",
            question.description, question.status, question.correct, question.total
        );
        for (i, correction) in question.corrections.iter().enumerate() {
            let _ = writeln!(
                out,
                "  {}. {}: {}",
                i + 1,
                correction.command_line,
                correction.verdict
            );
            if verbose {
                write_details(&mut out, correction);
            }
        }
    }
    out
}

fn write_details(out: &mut String, correction: &CorrectionSummary) {
    for (label, text) in [("Input", &correction.input), ("Output", &correction.output)] {
        if text.is_empty() {
            continue;
        }
        let _ = writeln!(out, "     {label}:");
        for line in text.lines() {
            let _ = writeln!(out, "       {line}");
        }
    }
}
