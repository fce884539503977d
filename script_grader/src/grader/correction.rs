use crate::grader::{
    RunOptions,
    os_interface::Launcher,
    runner::{CancelToken, ExecutionOutcome, Invocation},
    verdict::{ErrorKind, Verdict},
    verifier::VerifierRegistry,
};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::{
    panic::{self, AssertUnwindSafe},
    sync::{RwLock, RwLockReadGuard},
};

#[derive(Debug, Default, Clone)]
struct Slot {
    verdict: Verdict,
    output: String,
}

/// One test case of a question: how to run the script and how to check its output.
///
/// The configuration fields never change after construction. The latest verdict (and the
/// output captured with it) is kept in a slot that each run replaces as a whole, so
/// readers never observe a half-written result.
#[derive(Debug)]
pub struct Correction {
    command: String,
    script_path: String,
    cli_args: String,
    stdin_input: Vec<u8>,
    verifier_name: String,
    verifier_args: Value,
    slot: RwLock<Slot>,
}

impl Correction {
    pub fn new(command: impl Into<String>, script_path: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            script_path: script_path.into(),
            cli_args: String::new(),
            stdin_input: vec![],
            verifier_name: String::new(),
            verifier_args: Value::String(String::new()),
            slot: RwLock::default(),
        }
    }

    pub fn with_args(mut self, cli_args: impl Into<String>) -> Self {
        self.cli_args = cli_args.into();
        self
    }

    pub fn with_input(mut self, stdin_input: impl Into<Vec<u8>>) -> Self {
        self.stdin_input = stdin_input.into();
        self
    }

    pub fn with_verifier(mut self, name: impl Into<String>, args: Value) -> Self {
        self.verifier_name = name.into();
        self.verifier_args = args;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn script_path(&self) -> &str {
        &self.script_path
    }

    pub fn cli_args(&self) -> &str {
        &self.cli_args
    }

    pub fn stdin_input(&self) -> &[u8] {
        &self.stdin_input
    }

    pub fn verifier_name(&self) -> &str {
        &self.verifier_name
    }

    pub fn verifier_args(&self) -> &Value {
        &self.verifier_args
    }

    fn launcher(&self) -> Launcher {
        Launcher::new(&self.command, &self.script_path)
    }

    /// e.g. `python3 q1.py 1 2 3`
    pub fn command_line(&self) -> String {
        self.launcher().command_line(&self.cli_args)
    }

    fn read_slot(&self) -> RwLockReadGuard<'_, Slot> {
        // A slot is always replaced by a complete value, so a poisoned one is still valid.
        self.slot.read().unwrap_or_else(|e| e.into_inner())
    }

    fn replace_slot(&self, verdict: Verdict, output: String) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Slot { verdict, output };
    }

    pub fn verdict(&self) -> Verdict {
        self.read_slot().verdict.clone()
    }

    /// Decoded stdout captured by the latest run.
    pub fn output(&self) -> String {
        self.read_slot().output.clone()
    }

    pub fn summary(&self) -> CorrectionSummary {
        let slot = self.read_slot().clone();
        CorrectionSummary {
            command_line: self.command_line(),
            input: String::from_utf8_lossy(&self.stdin_input).into_owned(),
            verdict: slot.verdict,
            output: slot.output,
        }
    }

    pub fn invocation(&self, options: &RunOptions) -> Invocation {
        Invocation::new(self.launcher())
            .with_args(options.args_mode.tokenize(&self.cli_args))
            .with_stdin(self.stdin_input.clone())
            .with_timeout(options.timeout)
            .with_working_dir(options.working_dir.clone())
    }

    /// Runs the script once, stores the new verdict and returns it.
    ///
    /// The verdict goes through `Running` while the process is alive. Nothing here fails:
    /// a misbehaving script only ever produces an `Error` or `Incorrect` verdict.
    pub fn run(
        &self,
        registry: &VerifierRegistry,
        options: &RunOptions,
        cancel: &CancelToken,
    ) -> Verdict {
        info!("🚀 Executing correction: '{}'", self.command_line());
        self.replace_slot(Verdict::Running, String::new());

        let outcome = self.invocation(options).run(cancel);
        let verdict = self.classify(&outcome, registry, options);

        if verdict.is_correct() {
            info!("✅ Correct");
        } else {
            info!("❌ {verdict}");
        }
        self.replace_slot(verdict.clone(), outcome.stdout_text().into_owned());
        verdict
    }

    /// Turns an execution outcome into a verdict.
    pub fn classify(
        &self,
        outcome: &ExecutionOutcome,
        registry: &VerifierRegistry,
        options: &RunOptions,
    ) -> Verdict {
        if outcome.cancelled {
            return Verdict::error(ErrorKind::Cancelled, "Run cancelled.");
        }
        if outcome.timed_out {
            return Verdict::error(
                ErrorKind::Timeout,
                format!("Timeout of {}s expired.", options.timeout.as_secs_f64()),
            );
        }
        if let Some(ref failure) = outcome.spawn_failure {
            return Verdict::error(ErrorKind::ScriptNotFound, failure.describe());
        }
        if let Some(ref err) = outcome.wait_error {
            return Verdict::error(
                ErrorKind::RuntimeFailure,
                format!("Unable to wait for the process: {err}"),
            );
        }

        match outcome.exit_code {
            Some(code) if options.not_found_exit_codes.contains(&code) => {
                debug!("Exit code {code} is configured as 'not found'");
                Verdict::error(
                    ErrorKind::ScriptNotFound,
                    format!("File {} not found.", self.script_path),
                )
            }
            Some(0) => self.verify(&outcome.stdout_text(), registry),
            Some(code) => Verdict::error(
                ErrorKind::RuntimeFailure,
                format!("Error ({code}): {}", outcome.stderr_text().trim_end()),
            ),
            None => Verdict::error(
                ErrorKind::RuntimeFailure,
                format!(
                    "Error (terminated by a signal): {}",
                    outcome.stderr_text().trim_end()
                ),
            ),
        }
    }

    fn verify(&self, stdout: &str, registry: &VerifierRegistry) -> Verdict {
        let Some(verifier) = registry.lookup(&self.verifier_name) else {
            return Verdict::error(
                ErrorKind::UnknownVerifier,
                format!("Unknown verifier '{}'.", self.verifier_name),
            );
        };
        debug!(
            "Verifying output with '{}' against {}",
            self.verifier_name, self.verifier_args
        );
        let check = match panic::catch_unwind(AssertUnwindSafe(|| {
            verifier(stdout, &self.verifier_args)
        })) {
            Ok(check) => check,
            Err(payload) => {
                let reason = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                warn!("💥 Verifier '{}' panicked: {reason}", self.verifier_name);
                return Verdict::error(
                    ErrorKind::VerifierFailure,
                    format!("Verifier '{}' panicked: {reason}", self.verifier_name),
                );
            }
        };
        if check.passed {
            Verdict::Correct
        } else {
            Verdict::incorrect(check.message)
        }
    }
}

/// Snapshot of a correction for reporting.
#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub struct CorrectionSummary {
    pub command_line: String,
    pub input: String,
    pub verdict: Verdict,
    pub output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grader::os_interface::{ArgsMode, SpawnFailure};
    use crate::grader::verifier::{Check, EXACT_MATCH, REGEX_MATCH};
    use crate::utils;
    use serde_json::json;
    use std::{path::PathBuf, time::Duration};

    const ECHO_ARG: &str = "printf '%s\\n' \"$1\"";

    fn options_in(dir: &std::path::Path) -> RunOptions {
        RunOptions {
            working_dir: Some(dir.to_path_buf()),
            ..RunOptions::default()
        }
    }

    fn exited(code: i32, stdout: &str, stderr: &str) -> ExecutionOutcome {
        ExecutionOutcome {
            exit_code: Some(code),
            stdout: stdout.as_bytes().to_vec(),
            stderr: stderr.as_bytes().to_vec(),
            ..ExecutionOutcome::default()
        }
    }

    mod classify_tests {
        use super::*;

        fn correction() -> Correction {
            Correction::new("python3", "q1.py").with_verifier(EXACT_MATCH, json!("hello"))
        }

        #[test]
        fn should_be_correct_when_the_verifier_passes() {
            let verdict = correction().classify(
                &exited(0, "hello\n", ""),
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(verdict, Verdict::Correct);
        }

        #[test]
        fn should_be_incorrect_with_the_verifier_message() {
            let verdict = correction().classify(
                &exited(0, "goodbye\n", ""),
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(
                verdict,
                Verdict::Incorrect("Expected 'hello', got 'goodbye'".to_string())
            );
        }

        #[test]
        fn should_give_failing_verifiers_a_message() {
            let mut registry = VerifierRegistry::empty();
            registry.register("silent", |_: &str, _: &Value| Check::fail(""));
            let verdict = Correction::new("sh", "q.sh")
                .with_verifier("silent", Value::Null)
                .classify(&exited(0, "", ""), &registry, &RunOptions::default());

            assert!(matches!(verdict, Verdict::Incorrect(ref msg) if !msg.is_empty()));
        }

        #[test]
        fn should_report_timeouts_with_the_configured_deadline() {
            let outcome = ExecutionOutcome {
                timed_out: true,
                stdout: b"partial".to_vec(),
                ..ExecutionOutcome::default()
            };
            let verdict = correction().classify(
                &outcome,
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(
                verdict,
                Verdict::Error(ErrorKind::Timeout, "Timeout of 2s expired.".to_string())
            );

            let options = RunOptions {
                timeout: Duration::from_millis(1500),
                ..RunOptions::default()
            };
            let verdict = correction().classify(&outcome, &VerifierRegistry::default(), &options);
            assert_eq!(verdict.message(), Some("Timeout of 1.5s expired."));
        }

        #[test]
        fn should_report_spawn_failures_as_script_not_found() {
            let outcome = ExecutionOutcome {
                spawn_failure: Some(SpawnFailure::ScriptMissing(PathBuf::from("q1.py"))),
                ..ExecutionOutcome::default()
            };
            let verdict = correction().classify(
                &outcome,
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(
                verdict,
                Verdict::Error(ErrorKind::ScriptNotFound, "File q1.py not found.".to_string())
            );
        }

        #[test]
        fn should_only_sniff_exit_codes_when_configured() {
            let outcome = exited(2, "", "can't open file");
            let registry = VerifierRegistry::default();

            let verdict = correction().classify(&outcome, &registry, &RunOptions::default());
            assert_eq!(
                verdict,
                Verdict::Error(
                    ErrorKind::RuntimeFailure,
                    "Error (2): can't open file".to_string()
                )
            );

            let options = RunOptions {
                not_found_exit_codes: vec![2, 256, 512],
                ..RunOptions::default()
            };
            let verdict = correction().classify(&outcome, &registry, &options);
            assert_eq!(verdict.failure_kind(), Some(ErrorKind::ScriptNotFound));
        }

        #[test]
        fn should_report_unknown_verifiers_only_after_a_successful_run() {
            let unknown = Correction::new("sh", "q.sh").with_verifier("eval", json!("x"));
            let registry = VerifierRegistry::default();
            let options = RunOptions::default();

            let verdict = unknown.classify(&exited(0, "x", ""), &registry, &options);
            assert_eq!(
                verdict,
                Verdict::Error(
                    ErrorKind::UnknownVerifier,
                    "Unknown verifier 'eval'.".to_string()
                )
            );

            let missing = ExecutionOutcome {
                spawn_failure: Some(SpawnFailure::ScriptMissing(PathBuf::from("q.sh"))),
                ..ExecutionOutcome::default()
            };
            let verdict = unknown.classify(&missing, &registry, &options);
            assert_eq!(verdict.failure_kind(), Some(ErrorKind::ScriptNotFound));
        }

        #[test]
        fn should_report_signals_as_runtime_failures() {
            let outcome = ExecutionOutcome {
                exit_code: None,
                stderr: b"Segmentation fault\n".to_vec(),
                ..ExecutionOutcome::default()
            };
            let verdict = correction().classify(
                &outcome,
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(
                verdict,
                Verdict::Error(
                    ErrorKind::RuntimeFailure,
                    "Error (terminated by a signal): Segmentation fault".to_string()
                )
            );
        }

        #[test]
        fn should_report_wait_failures_apart_from_signals() {
            let outcome = ExecutionOutcome {
                wait_error: Some("No child processes (os error 10)".to_string()),
                ..ExecutionOutcome::default()
            };
            let verdict = correction().classify(
                &outcome,
                &VerifierRegistry::default(),
                &RunOptions::default(),
            );
            assert_eq!(
                verdict,
                Verdict::Error(
                    ErrorKind::RuntimeFailure,
                    "Unable to wait for the process: No child processes (os error 10)"
                        .to_string()
                )
            );
        }

        #[test]
        fn should_turn_verifier_panics_into_errors() {
            let mut registry = VerifierRegistry::empty();
            registry.register("broken", |_: &str, _: &Value| -> Check {
                panic!("index out of bounds")
            });
            let verdict = Correction::new("sh", "q.sh")
                .with_verifier("broken", Value::Null)
                .classify(&exited(0, "out", ""), &registry, &RunOptions::default());

            assert_eq!(
                verdict,
                Verdict::Error(
                    ErrorKind::VerifierFailure,
                    "Verifier 'broken' panicked: index out of bounds".to_string()
                )
            );
        }
    }

    mod run_tests {
        use super::*;

        #[test_log::test]
        fn should_grade_an_echo_script_end_to_end() {
            let dir = tempfile::tempdir().unwrap();
            utils::write_script(dir.path(), "echo.sh", ECHO_ARG);
            let registry = VerifierRegistry::default();
            let options = options_in(dir.path());

            let correct = Correction::new("sh", "echo.sh")
                .with_args("hello")
                .with_verifier(EXACT_MATCH, json!("hello"));
            assert_eq!(correct.verdict(), Verdict::NotRun);
            assert_eq!(
                correct.run(&registry, &options, &CancelToken::new()),
                Verdict::Correct
            );
            assert_eq!(correct.verdict(), Verdict::Correct);
            assert_eq!(correct.output(), "hello\n");

            let wrong = Correction::new("sh", "echo.sh")
                .with_args("hello")
                .with_verifier(EXACT_MATCH, json!("goodbye"));
            assert_eq!(
                wrong.run(&registry, &options, &CancelToken::new()),
                Verdict::Incorrect("Expected 'goodbye', got 'hello'".to_string())
            );
        }

        #[test]
        fn should_pass_the_whole_argument_string_as_one_token_by_default() {
            let dir = tempfile::tempdir().unwrap();
            utils::write_script(dir.path(), "count.sh", "echo $#");
            let registry = VerifierRegistry::default();
            let correction = Correction::new("sh", "count.sh")
                .with_args("p1 p2 p3")
                .with_verifier(EXACT_MATCH, json!("1"));

            let verdict = correction.run(&registry, &options_in(dir.path()), &CancelToken::new());
            assert_eq!(verdict, Verdict::Correct);

            let split = RunOptions {
                args_mode: ArgsMode::Split,
                ..options_in(dir.path())
            };
            let verdict = correction.run(&registry, &split, &CancelToken::new());
            assert_eq!(verdict, Verdict::Incorrect("Expected '1', got '3'".to_string()));
        }

        #[test]
        fn should_grade_stdin_driven_scripts_with_regex() {
            let dir = tempfile::tempdir().unwrap();
            utils::write_script(dir.path(), "read.sh", "read name\necho \"order id: $name\"");
            let correction = Correction::new("sh", "read.sh")
                .with_input("42\n")
                .with_verifier(REGEX_MATCH, json!("id: \\d+"));

            let verdict = correction.run(
                &VerifierRegistry::default(),
                &options_in(dir.path()),
                &CancelToken::new(),
            );
            assert_eq!(verdict, Verdict::Correct);
        }

        #[test]
        fn should_report_missing_scripts_whatever_the_verifier() {
            let dir = tempfile::tempdir().unwrap();
            let options = options_in(dir.path());
            for verifier in [EXACT_MATCH, REGEX_MATCH, "not_registered"] {
                let correction =
                    Correction::new("sh", "missing.sh").with_verifier(verifier, json!("x"));
                let verdict =
                    correction.run(&VerifierRegistry::default(), &options, &CancelToken::new());
                assert_eq!(
                    verdict,
                    Verdict::Error(
                        ErrorKind::ScriptNotFound,
                        "File missing.sh not found.".to_string()
                    )
                );
            }
        }

        #[test]
        fn should_time_out_sleeping_scripts() {
            let dir = tempfile::tempdir().unwrap();
            utils::write_script(dir.path(), "slow.sh", "sleep 10");
            let options = RunOptions {
                timeout: Duration::from_millis(200),
                ..options_in(dir.path())
            };
            let correction = Correction::new("sh", "slow.sh").with_verifier(EXACT_MATCH, json!(""));

            let verdict = correction.run(&VerifierRegistry::default(), &options, &CancelToken::new());
            assert_eq!(
                verdict,
                Verdict::Error(ErrorKind::Timeout, "Timeout of 0.2s expired.".to_string())
            );
        }

        #[test]
        fn should_replace_the_previous_verdict_on_rerun() {
            let dir = tempfile::tempdir().unwrap();
            let script = utils::write_script(dir.path(), "flip.sh", "echo one");
            let correction =
                Correction::new("sh", "flip.sh").with_verifier(EXACT_MATCH, json!("two"));
            let registry = VerifierRegistry::default();
            let options = options_in(dir.path());

            let first = correction.run(&registry, &options, &CancelToken::new());
            assert!(matches!(first, Verdict::Incorrect(_)));

            std::fs::write(script, "echo two").unwrap();
            let second = correction.run(&registry, &options, &CancelToken::new());
            assert_eq!(second, Verdict::Correct);
            assert_eq!(correction.verdict(), Verdict::Correct);
            assert_eq!(correction.output(), "two\n");
        }

        #[test]
        fn should_be_running_until_the_final_verdict_replaces_it() {
            let dir = tempfile::tempdir().unwrap();
            utils::write_script(dir.path(), "slow.sh", "sleep 0.4\necho done");
            let correction =
                Correction::new("sh", "slow.sh").with_verifier(EXACT_MATCH, json!("done"));
            let registry = VerifierRegistry::default();
            let options = options_in(dir.path());
            assert_eq!(
                correction.run(&registry, &options, &CancelToken::new()),
                Verdict::Correct
            );

            let verdict = std::thread::scope(|scope| {
                let rerun =
                    scope.spawn(|| correction.run(&registry, &options, &CancelToken::new()));
                let started = std::time::Instant::now();
                while correction.verdict() != Verdict::Running {
                    assert!(started.elapsed() < Duration::from_secs(5), "never seen running");
                    std::thread::sleep(Duration::from_millis(5));
                }
                assert!(correction.output().is_empty());
                rerun.join().unwrap()
            });

            assert_eq!(verdict, Verdict::Correct);
            assert_eq!(correction.verdict(), Verdict::Correct);
            assert_eq!(correction.output(), "done\n");
        }
    }

    #[test]
    fn should_summarize_command_line_and_input() {
        let correction = Correction::new("python3", "q1.py")
            .with_args("1 2 3")
            .with_input("abc\n");
        let summary = correction.summary();
        assert_eq!(summary.command_line, "python3 q1.py 1 2 3");
        assert_eq!(summary.input, "abc\n");
        assert_eq!(summary.verdict, Verdict::NotRun);
        assert!(summary.output.is_empty());
    }
}
