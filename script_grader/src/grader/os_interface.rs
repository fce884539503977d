//! This module provides the interface between the script being graded and the engine.
//!
//! Everything related to how a script is started, and whether it can be started at all,
//! lives here.

use is_executable::is_executable;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
};

/// How a script under test is started.
///
/// # Caveats
/// - `Interpreted` scripts only need to exist; the interpreter (`python3`, `php`, ...) is
///   looked up on `PATH` when the process is spawned.
/// - `Direct` scripts are executed as programs and must carry the executable permission.
#[derive(Debug, PartialEq, Eq, Clone, Hash)]
pub enum Launcher {
    Interpreted { command: String, script: PathBuf },
    Direct { script: PathBuf },
}

/// Why a script could not be started.
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum SpawnFailure {
    ScriptMissing(PathBuf),
    NotExecutable(PathBuf),
    CommandFailed { command: String, reason: String },
}

impl SpawnFailure {
    /// Human-readable diagnostic for the verdict.
    pub fn describe(&self) -> String {
        match self {
            SpawnFailure::ScriptMissing(script) => {
                format!("File {} not found.", script.display())
            }
            SpawnFailure::NotExecutable(script) => {
                format!("File {} is not executable.", script.display())
            }
            SpawnFailure::CommandFailed { command, reason } => {
                format!("Command {command} could not be executed: {reason}")
            }
        }
    }
}

impl Launcher {
    /// An empty `command` means the script is run directly.
    pub fn new(command: &str, script: impl Into<PathBuf>) -> Self {
        let script = script.into();
        let command = command.trim();
        if command.is_empty() {
            Self::Direct { script }
        } else {
            Self::Interpreted {
                command: command.to_string(),
                script,
            }
        }
    }

    pub fn script(&self) -> &Path {
        match self {
            Launcher::Interpreted { script, .. } | Launcher::Direct { script } => script,
        }
    }

    /// The script path as seen from `working_dir`.
    pub fn resolve_script(&self, working_dir: Option<&Path>) -> PathBuf {
        let script = self.script();
        match working_dir {
            Some(dir) if script.is_relative() => dir.join(script),
            _ => script.to_path_buf(),
        }
    }

    /// Checks that the script can be started before spawning anything.
    pub fn check(&self, working_dir: Option<&Path>) -> Result<(), SpawnFailure> {
        let resolved = self.resolve_script(working_dir);
        if !resolved.is_file() {
            debug!("Script '{}' does not exist", resolved.display());
            return Err(SpawnFailure::ScriptMissing(self.script().to_path_buf()));
        }
        if let Launcher::Direct { .. } = self
            && !is_executable(&resolved)
        {
            debug!("Script '{}' is not executable", resolved.display());
            return Err(SpawnFailure::NotExecutable(self.script().to_path_buf()));
        }
        Ok(())
    }

    /// Builds the command without arguments, stdio or working directory.
    pub fn new_cmd(&self, working_dir: Option<&Path>) -> Command {
        match self {
            Launcher::Interpreted { command, script } => {
                let mut cmd = Command::new(command);
                cmd.arg(script);
                cmd
            }
            Launcher::Direct { .. } => {
                // A bare relative name would be looked up on PATH.
                let resolved = self.resolve_script(working_dir);
                let program = std::path::absolute(&resolved).unwrap_or(resolved);
                Command::new(program)
            }
        }
    }

    /// The program name, used to report spawn errors.
    pub fn program(&self) -> String {
        match self {
            Launcher::Interpreted { command, .. } => command.clone(),
            Launcher::Direct { script } => script.display().to_string(),
        }
    }

    /// The full command line as a user would type it, e.g. `python3 q1.py 1 2 3`.
    pub fn command_line(&self, args: &str) -> String {
        let mut line = match self {
            Launcher::Interpreted { command, script } => {
                format!("{command} {}", script.display())
            }
            Launcher::Direct { script } => script.display().to_string(),
        };
        if !args.is_empty() {
            line.push(' ');
            line.push_str(args);
        }
        line
    }
}

/// How the configured argument string is handed to the script.
#[derive(Serialize, Deserialize, Debug, Default, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum ArgsMode {
    /// The whole string is a single argument.
    #[default]
    Single,
    /// The string is split following POSIX shell quoting rules.
    Split,
}

impl ArgsMode {
    pub fn tokenize(self, args: &str) -> Vec<String> {
        if args.is_empty() {
            return vec![];
        }
        match self {
            ArgsMode::Single => vec![args.to_string()],
            ArgsMode::Split => match shlex::split(args) {
                Some(tokens) => tokens,
                None => {
                    warn!("⚠️  Unbalanced quotes in '{args}', passing it as a single argument");
                    vec![args.to_string()]
                }
            },
        }
    }
}

impl FromStr for ArgsMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "single" => Ok(ArgsMode::Single),
            "split" => Ok(ArgsMode::Split),
            _ => Err("expected one of: single, split"),
        }
    }
}
