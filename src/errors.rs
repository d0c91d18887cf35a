//! Error types for the harness.
//!
//! Script-level errors ([`ParseError`], [`RegistryError`], [`ScriptError`]) stop the
//! remaining tasks of one script. Task-level problems never appear here: they are
//! turned into [`Outcome`](txn_harness_types::Outcome)s and compared like any
//! other result.

use std::fmt;
use std::path::PathBuf;

/// A script could not be split into tasks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// 1-based line in the script.
    pub line: usize,
    /// 1-based column in the script.
    pub column: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Symbol table misuse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    DuplicateAlias { alias: String },
    UnknownAlias { alias: String },
    InvalidAddress { alias: String, value: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::DuplicateAlias { alias } => {
                write!(f, "alias '{}' is already declared", alias)
            }
            RegistryError::UnknownAlias { alias } => {
                write!(f, "unknown address alias '{}'", alias)
            }
            RegistryError::InvalidAddress { alias, value } => {
                write!(f, "alias '{}' has an invalid address '{}'", alias, value)
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// A `--args` value that does not parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgumentError {
    Syntax { token: String, message: String },
    Registry(RegistryError),
}

impl ArgumentError {
    pub fn syntax(token: &str, message: impl Into<String>) -> Self {
        ArgumentError::Syntax {
            token: token.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ArgumentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentError::Syntax { token, message } => {
                write!(f, "invalid argument '{}': {}", token, message)
            }
            ArgumentError::Registry(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for ArgumentError {}

impl From<RegistryError> for ArgumentError {
    fn from(e: RegistryError) -> Self {
        ArgumentError::Registry(e)
    }
}

/// Stops a script before all of its tasks ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    Io { path: PathBuf, message: String },
    Parse(ParseError),
    Registry { task: usize, error: RegistryError },
    /// A state-touching task ran before `init`.
    MissingInit { task: usize },
    DuplicateInit { task: usize },
    InitFailed { task: usize, message: String },
    Timeout { elapsed_ms: u64, budget_ms: u64 },
}

impl fmt::Display for ScriptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::Io { path, message } => {
                write!(f, "failed to read {}: {}", path.display(), message)
            }
            ScriptError::Parse(e) => write!(f, "{}", e),
            ScriptError::Registry { task, error } => write!(f, "task {}: {}", task, error),
            ScriptError::MissingInit { task } => {
                write!(f, "task {}: the script must start with an 'init' task", task)
            }
            ScriptError::DuplicateInit { task } => {
                write!(f, "task {}: 'init' may only appear once", task)
            }
            ScriptError::InitFailed { task, message } => {
                write!(f, "task {}: init failed: {}", task, message)
            }
            ScriptError::Timeout {
                elapsed_ms,
                budget_ms,
            } => write!(
                f,
                "script timed out after {} ms (budget {} ms)",
                elapsed_ms, budget_ms
            ),
        }
    }
}

impl std::error::Error for ScriptError {}

impl From<ParseError> for ScriptError {
    fn from(e: ParseError) -> Self {
        ScriptError::Parse(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_display() {
        let e = ParseError::new(3, 5, "unknown directive 'frobnicate'");
        assert_eq!(
            e.to_string(),
            "parse error at line 3, column 5: unknown directive 'frobnicate'"
        );
    }

    #[test]
    fn test_script_error_wraps_registry_error() {
        let e = ScriptError::Registry {
            task: 2,
            error: RegistryError::UnknownAlias {
                alias: "B".to_string(),
            },
        };
        assert_eq!(e.to_string(), "task 2: unknown address alias 'B'");
    }
}
