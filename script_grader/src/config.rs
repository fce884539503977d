//! JSON configuration of an assignment.
//!
//! ```json
//! {
//!   "titulo": "Homework 1",
//!   "questoes": [
//!     {
//!       "descricao": "Question 1",
//!       "comando": "python3",
//!       "script": "q1.py",
//!       "correcoes": [
//!         { "args": "hello", "teste": { "func_expect": "exact_match", "args_expect": "hello" } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::{
    error::GraderError,
    grader::{assignment::Assignment, correction::Correction, question::Question},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::{fs, path::Path};

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct AssignmentConfigUnchecked {
    #[serde(rename = "titulo")]
    title: String,
    #[serde(rename = "questoes")]
    questions: Vec<QuestionConfig>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(try_from = "AssignmentConfigUnchecked")]
struct AssignmentConfig {
    #[serde(rename = "titulo")]
    title: String,
    #[serde(rename = "questoes")]
    questions: Vec<QuestionConfig>,
}

impl AssignmentConfig {
    fn build(title: String, questions: Vec<QuestionConfig>) -> Result<Self, &'static str> {
        if questions.is_empty() {
            return Err("at least one question is expected");
        }
        Ok(Self { title, questions })
    }

    fn build_assignment(&self) -> Assignment {
        let mut assignment = Assignment::new(self.title.clone());
        for q in &self.questions {
            assignment.add_question(q.build_question());
        }
        assignment
    }
}

impl TryFrom<AssignmentConfigUnchecked> for AssignmentConfig {
    type Error = &'static str;

    fn try_from(value: AssignmentConfigUnchecked) -> Result<Self, Self::Error> {
        let AssignmentConfigUnchecked { title, questions } = value;
        AssignmentConfig::build(title, questions)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct QuestionConfigUnchecked {
    #[serde(rename = "descricao")]
    description: String,
    #[serde(rename = "comando")]
    command: String,
    script: String,
    #[serde(rename = "correcoes")]
    corrections: Vec<CorrectionConfig>,
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(try_from = "QuestionConfigUnchecked")]
struct QuestionConfig {
    #[serde(rename = "descricao")]
    description: String,
    #[serde(rename = "comando")]
    command: String,
    script: String,
    #[serde(rename = "correcoes")]
    corrections: Vec<CorrectionConfig>,
}

impl QuestionConfig {
    fn build(
        description: String,
        command: String,
        script: String,
        corrections: Vec<CorrectionConfig>,
    ) -> Result<Self, &'static str> {
        if script.trim().is_empty() {
            return Err("the script of a question must not be empty");
        }
        if corrections.is_empty() {
            return Err("at least one correction is expected in each question");
        }
        Ok(Self {
            description,
            command,
            script,
            corrections,
        })
    }

    fn build_question(&self) -> Question {
        let mut question = Question::new(
            self.description.clone(),
            self.command.clone(),
            self.script.clone(),
        );
        for c in &self.corrections {
            let correction = c.build_correction(question.new_correction());
            question.add_correction(correction);
        }
        question
    }
}

impl TryFrom<QuestionConfigUnchecked> for QuestionConfig {
    type Error = &'static str;

    fn try_from(value: QuestionConfigUnchecked) -> Result<Self, Self::Error> {
        let QuestionConfigUnchecked {
            description,
            command,
            script,
            corrections,
        } = value;
        QuestionConfig::build(description, command, script, corrections)
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct CorrectionConfig {
    #[serde(default)]
    input: String,
    #[serde(default)]
    args: String,
    #[serde(rename = "teste")]
    test: TestConfig,
}

impl CorrectionConfig {
    fn build_correction(&self, correction: Correction) -> Correction {
        correction
            .with_input(self.input.as_bytes())
            .with_args(self.args.clone())
            .with_verifier(self.test.func_expect.clone(), self.test.args_expect.clone())
    }
}

#[derive(Serialize, Deserialize, Debug, PartialEq)]
#[serde(deny_unknown_fields)]
struct TestConfig {
    func_expect: String,
    #[serde(default = "empty_expectation")]
    args_expect: Value,
}

fn empty_expectation() -> Value {
    Value::String(String::new())
}

/// Builds an assignment from the JSON text of a configuration.
pub fn parse_assignment(json: &str) -> Result<Assignment, GraderError> {
    let config: AssignmentConfig = serde_json::from_str(json)?;
    debug!("Configuration: {config:#?}");
    Ok(config.build_assignment())
}

/// Reads and parses a configuration file.
pub fn load_assignment(path: impl AsRef<Path>) -> Result<Assignment, GraderError> {
    let path = path.as_ref();
    info!("📂 Loading configuration '{}'", path.display());
    let json = fs::read_to_string(path).map_err(|source| GraderError::ConfigIo {
        path: path.to_path_buf(),
        source,
    })?;
    parse_assignment(&json)
}
