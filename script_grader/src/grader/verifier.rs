//! Named output verifiers.
//!
//! A verifier receives the decoded stdout of a successful run and the `args_expect` value
//! from the configuration, and decides whether the output is acceptable. Verifiers are
//! looked up by name in a [`VerifierRegistry`]; names are plain table keys and are never
//! evaluated.

use log::debug;
use regex::Regex;
use serde_json::Value;
use std::{borrow::Cow, collections::HashMap, fmt, sync::Arc};

pub const EXACT_MATCH: &str = "exact_match";
pub const REGEX_MATCH: &str = "regex_match";
pub const EXACT_MATCH_IGNORING_HEADERS: &str = "exact_match_ignoring_headers";

/// Header prefixes dropped by [`exact_match_ignoring_headers`] when the configuration does
/// not list its own.
pub const DEFAULT_IGNORED_HEADERS: &[&str] = &[
    "Date:",
    "X-",
    "Connection",
    "Host",
    "Cache-",
    "Access-Control-",
];

const TRIMMED: &[char] = &['\n', '\r', '\t', ' '];

/// Result of a verifier. `message` is empty when `passed`.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Check {
    pub passed: bool,
    pub message: String,
}

impl Check {
    pub fn pass() -> Self {
        Self {
            passed: true,
            message: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            passed: false,
            message: message.into(),
        }
    }
}

pub type VerifierFn = Arc<dyn Fn(&str, &Value) -> Check + Send + Sync>;

/// Table of verifiers indexed by name.
#[derive(Clone)]
pub struct VerifierRegistry {
    verifiers: HashMap<String, VerifierFn>,
}

impl VerifierRegistry {
    /// A registry with no verifier at all.
    pub fn empty() -> Self {
        Self {
            verifiers: HashMap::new(),
        }
    }

    /// A registry with the built-in verifiers. The names used by older configuration files
    /// (`testar_igual`, `testar_regex`) are registered as aliases.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(EXACT_MATCH, exact_match);
        registry.register(REGEX_MATCH, regex_match);
        registry.register(EXACT_MATCH_IGNORING_HEADERS, exact_match_ignoring_headers);
        registry.register("testar_igual", exact_match);
        registry.register("testar_regex", regex_match);
        registry
    }

    /// Registers `verifier` under `name`, returning the verifier it replaced, if any.
    pub fn register<F>(&mut self, name: impl Into<String>, verifier: F) -> Option<VerifierFn>
    where
        F: Fn(&str, &Value) -> Check + Send + Sync + 'static,
    {
        let name = name.into();
        debug!("Registering verifier '{name}'");
        self.verifiers.insert(name, Arc::new(verifier))
    }

    pub fn lookup(&self, name: &str) -> Option<&VerifierFn> {
        self.verifiers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.verifiers.contains_key(name)
    }

    /// Registered names in alphabetical order.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.verifiers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl Default for VerifierRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for VerifierRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerifierRegistry")
            .field("verifiers", &self.names())
            .finish()
    }
}

/// The text form of an `args_expect` value: strings as they are, `null` as the empty
/// string and anything else as its JSON text.
fn expected_text(expected: &Value) -> Cow<'_, str> {
    match expected {
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => Cow::Borrowed(""),
        other => Cow::Owned(other.to_string()),
    }
}

/// Passes when `actual` equals the expected text once both are trimmed of surrounding
/// spaces, tabs, CR and LF. Inner whitespace is significant.
pub fn exact_match(actual: &str, expected: &Value) -> Check {
    compare_trimmed(actual, &expected_text(expected))
}

fn compare_trimmed(actual: &str, expected: &str) -> Check {
    let actual = actual.trim_matches(TRIMMED);
    let expected = expected.trim_matches(TRIMMED);
    if actual != expected {
        return Check::fail(format!("Expected '{expected}', got '{actual}'"));
    }
    Check::pass()
}

/// Passes when the expected regular expression matches anywhere in the trimmed output.
pub fn regex_match(actual: &str, expected: &Value) -> Check {
    let pattern = expected_text(expected);
    let regex = match Regex::new(&pattern) {
        Ok(regex) => regex,
        Err(err) => return Check::fail(format!("Invalid pattern \"{pattern}\": {err}")),
    };
    if !regex.is_match(actual.trim_matches(TRIMMED)) {
        return Check::fail(format!("Expected to find pattern \"{pattern}\""));
    }
    Check::pass()
}

/// [`exact_match`] for raw HTTP responses: lines starting (case-insensitively) with one
/// of the ignored header prefixes are removed from both sides before comparing.
///
/// `expected` is either the expected response, compared with
/// [`DEFAULT_IGNORED_HEADERS`], or an object `{"expected": "...", "ignore": ["Date:"]}`.
pub fn exact_match_ignoring_headers(actual: &str, expected: &Value) -> Check {
    let (expected, ignored): (Cow<'_, str>, Vec<&str>) = match expected {
        Value::Object(map) => {
            let text = map.get("expected").map(expected_text).unwrap_or_default();
            let ignored = match map.get("ignore") {
                Some(Value::Array(prefixes)) => {
                    prefixes.iter().filter_map(Value::as_str).collect()
                }
                _ => DEFAULT_IGNORED_HEADERS.to_vec(),
            };
            (text, ignored)
        }
        other => (expected_text(other), DEFAULT_IGNORED_HEADERS.to_vec()),
    };

    compare_trimmed(
        &strip_headers(actual, &ignored),
        &strip_headers(&expected, &ignored),
    )
}

fn strip_headers(text: &str, ignored: &[&str]) -> String {
    text.lines()
        .filter(|line| !ignored.iter().any(|prefix| starts_with_ignore_case(line, prefix)))
        .collect::<Vec<_>>()
        .join("\n")
}

fn starts_with_ignore_case(line: &str, prefix: &str) -> bool {
    line.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}
