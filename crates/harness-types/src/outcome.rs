//! Task outcomes as reported by a VM backend.
//!
//! Every task in a script produces exactly one [`Outcome`]. Aborts and errors are
//! first-class results: they are rendered and compared like any return value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::value::MoveValue;

/// Classification of a non-abort failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Source failed to compile.
    Compile,
    /// A module or function could not be resolved at call time.
    Linker,
    /// Type mismatch, bad argument count and other runtime faults.
    Runtime,
    /// Overflow, division by zero or a lossy cast.
    Arithmetic,
    /// The step budget was exhausted.
    OutOfGas,
    /// A global resource was read but does not exist.
    ResourceNotFound,
    /// Publish rejected (incompatible upgrade, duplicate module).
    Verification,
    /// Arguments could not be resolved or did not match the target.
    InvalidArgument,
    /// The task ran past its wall-clock budget.
    Timeout,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 9] = [
        ErrorKind::Compile,
        ErrorKind::Linker,
        ErrorKind::Runtime,
        ErrorKind::Arithmetic,
        ErrorKind::OutOfGas,
        ErrorKind::ResourceNotFound,
        ErrorKind::Verification,
        ErrorKind::InvalidArgument,
        ErrorKind::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Compile => "compile",
            ErrorKind::Linker => "linker",
            ErrorKind::Runtime => "runtime",
            ErrorKind::Arithmetic => "arithmetic",
            ErrorKind::OutOfGas => "out_of_gas",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::Verification => "verification",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        ErrorKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown error kind '{}'", s))
    }
}

/// Payload of a successful task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SuccessValue {
    /// Nothing to show (publish, init, a function returning `()`).
    Unit,
    /// Return values of a function or script.
    Returned(Vec<MoveValue>),
    /// A resource read by `view`.
    Resource(MoveValue),
    /// A textual listing (`print-bytecode`).
    Listing(String),
}

/// Result of executing one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(SuccessValue),
    Abort {
        code: u64,
        /// Module that raised the abort (`0x42::M`), when known.
        location: Option<String>,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl Outcome {
    pub fn unit() -> Self {
        Outcome::Success(SuccessValue::Unit)
    }

    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Outcome::Error {
            kind,
            message: message.into(),
        }
    }

    pub fn abort(code: u64, location: Option<String>) -> Self {
        Outcome::Abort { code, location }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Short label used in logs and reports.
    pub fn label(&self) -> String {
        match self {
            Outcome::Success(_) => "success".to_string(),
            Outcome::Abort { code, .. } => format!("abort({})", code),
            Outcome::Error { kind, .. } => format!("error({})", kind),
        }
    }

    /// Canonical rendering, or `None` when the outcome has nothing to show.
    pub fn render(&self) -> Option<String> {
        match self {
            Outcome::Success(SuccessValue::Unit) => None,
            Outcome::Success(SuccessValue::Returned(values)) => {
                let rendered: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                Some(format!("return values: {}", rendered.join(", ")))
            }
            Outcome::Success(SuccessValue::Resource(value)) => Some(format!("resource: {}", value)),
            Outcome::Success(SuccessValue::Listing(text)) => {
                Some(text.trim_end_matches('\n').to_string())
            }
            Outcome::Abort { code, location } => Some(match location {
                Some(loc) => format!("aborted with code {} in {}", code, loc),
                None => format!("aborted with code {}", code),
            }),
            Outcome::Error { kind, message } => Some(format!("error[{}]: {}", kind, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_round_trips_through_text() {
        for kind in ErrorKind::ALL {
            assert_eq!(kind.as_str().parse::<ErrorKind>(), Ok(kind));
        }
        assert!("segfault".parse::<ErrorKind>().is_err());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::OutOfGas).unwrap();
        assert_eq!(json, "\"out_of_gas\"");
    }

    #[test]
    fn test_render() {
        assert_eq!(Outcome::unit().render(), None);

        let ret = Outcome::Success(SuccessValue::Returned(vec![
            MoveValue::U64(1),
            MoveValue::string(""),
        ]));
        assert_eq!(ret.render().unwrap(), "return values: 1, \"\"");

        let abort = Outcome::abort(7, Some("0x42::M".to_string()));
        assert_eq!(abort.render().unwrap(), "aborted with code 7 in 0x42::M");
        assert_eq!(abort.label(), "abort(7)");

        let err = Outcome::error(ErrorKind::Linker, "function 0x42::M::nope not found");
        assert_eq!(
            err.render().unwrap(),
            "error[linker]: function 0x42::M::nope not found"
        );
    }
}
