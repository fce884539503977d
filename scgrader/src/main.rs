use clap::Parser;
use script_grader::{
    ArgsMode, AssignmentSummary, CancelToken, CorrectionId, Grader, LoggingMode, ReportOutput,
    RunOptions, Standing, Verdict, default_jobs, load_assignment,
};
use std::{
    error::Error,
    path::{Path, PathBuf},
    process::ExitCode,
    time::Duration,
};

#[derive(Parser, Debug)]
#[command(
    name = "scgrader",
    version,
    about,
    long_about = "Grade the scripts described by CONFIGURATION_FILE and print a report."
)]
struct Cli {
    configuration_file: PathBuf,

    /// Grade only this question (numbered from 1).
    #[arg(short, long)]
    question: Option<usize>,

    /// Time limit of each script run, in seconds.
    #[arg(short, long, default_value_t = 2.0)]
    timeout: f64,

    /// Number of scripts run at the same time. Defaults to the number of CPUs.
    #[arg(short, long)]
    jobs: Option<usize>,

    /// How the `args` string reaches the script: `single` token or shell-like `split`.
    #[arg(long, default_value = "single")]
    args_mode: ArgsMode,

    /// Directory the scripts run in. Defaults to the directory of the configuration file.
    #[arg(long)]
    base_dir: Option<PathBuf>,

    /// Exit code that means "script not found" for the configured interpreter.
    #[arg(long = "not-found-exit-code")]
    not_found_exit_codes: Vec<i32>,

    /// Report format: `text` or `json`.
    #[arg(long, default_value = "text")]
    format: ReportOutput,

    /// Show input and output of every correction in the text report.
    #[arg(short, long)]
    verbose: bool,

    /// Engine logging: `silent`, `normal` or `verbose`.
    #[arg(long, default_value = "silent")]
    log: LoggingMode,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(cli.log.level_filter())
        .parse_default_env()
        .init();

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

/// Grades and prints the report. Returns whether every graded question is correct.
fn run(cli: &Cli) -> Result<bool, Box<dyn Error>> {
    let assignment = load_assignment(&cli.configuration_file)?;
    let timeout = Duration::try_from_secs_f64(cli.timeout)
        .map_err(|_| "the timeout must be a non-negative number of seconds")?;
    let working_dir = cli
        .base_dir
        .clone()
        .or_else(|| cli.configuration_file.parent().map(Path::to_path_buf))
        .filter(|dir| !dir.as_os_str().is_empty());
    log::debug!("Working directory: {working_dir:?}");

    let options = RunOptions {
        timeout,
        args_mode: cli.args_mode,
        working_dir,
        not_found_exit_codes: cli.not_found_exit_codes.clone(),
    };
    let grader = Grader::new(assignment, options);
    let jobs = cli.jobs.unwrap_or_else(default_jobs);
    let cancel = CancelToken::new();
    let progress = |id: CorrectionId, verdict: &Verdict| {
        eprintln!(
            "question {}, correction {}: {verdict}",
            id.question + 1,
            id.correction + 1
        );
    };

    let summary = match cli.question {
        Some(number) => {
            let index = number.checked_sub(1).ok_or("questions are numbered from 1")?;
            let question = grader.run_question_concurrently(index, jobs, &cancel, progress)?;
            let correct_questions = usize::from(question.status.is_correct());
            AssignmentSummary {
                title: grader.assignment().title().to_string(),
                correct_questions,
                total_questions: 1,
                standing: Standing::from_counts(correct_questions, 1),
                questions: vec![question],
            }
        }
        None => grader.run_all_concurrently(jobs, &cancel, progress),
    };

    print!("{}", cli.format.render(&summary, cli.verbose)?);
    if cli.format == ReportOutput::Json {
        println!();
    }
    Ok(summary.correct_questions == summary.total_questions)
}
