//! Inline expectations from `#[expected_failure...]` annotations.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use txn_harness_types::{ErrorKind, Outcome};

/// What a task is expected to produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expectation {
    Success,
    AnyFailure,
    Abort(u64),
    /// Any abort raised by a vector operation, whatever its code.
    VectorError,
    Error(ErrorKind),
}

/// Location the backend reports for failed vector operations.
const VECTOR_MODULE: &str = "0x1::vector";

impl Expectation {
    pub fn matches(&self, outcome: &Outcome) -> bool {
        match (self, outcome) {
            (Expectation::Success, outcome) => outcome.is_success(),
            (Expectation::AnyFailure, outcome) => !outcome.is_success(),
            (Expectation::Abort(expected), Outcome::Abort { code, .. }) => expected == code,
            (Expectation::VectorError, Outcome::Abort { location, .. }) => {
                location.as_deref() == Some(VECTOR_MODULE)
            }
            (Expectation::Error(expected), Outcome::Error { kind, .. }) => expected == kind,
            _ => false,
        }
    }
}

impl fmt::Display for Expectation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::Success => f.write_str("success"),
            Expectation::AnyFailure => f.write_str("any failure"),
            Expectation::Abort(code) => write!(f, "abort({})", code),
            Expectation::VectorError => f.write_str("vector error"),
            Expectation::Error(kind) => write!(f, "error({})", kind),
        }
    }
}

fn expected_failure_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^expected_failure\s*(?:\((?P<params>.*)\))?$").expect("valid regex")
    })
}

fn param_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?P<key>[A-Za-z_][A-Za-z0-9_]*)\s*(?:=\s*(?P<value>.+))?$"#)
            .expect("valid regex")
    })
}

/// Interpret one annotation (text inside `#[...]`).
///
/// Returns `Ok(None)` for attributes other than `expected_failure`, such as
/// `test`.
pub fn parse_expectation(annotation: &str) -> Result<Option<Expectation>, String> {
    let text = annotation.trim();
    let Some(caps) = expected_failure_re().captures(text) else {
        return Ok(None);
    };
    let Some(params) = caps.name("params") else {
        return Ok(Some(Expectation::AnyFailure));
    };

    let mut expectation = Expectation::AnyFailure;
    for param in params.as_str().split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let caps = param_re()
            .captures(param)
            .ok_or_else(|| format!("malformed expected_failure parameter '{}'", param))?;
        let key = &caps["key"];
        let value = caps.name("value").map(|v| v.as_str().trim());
        match (key, value) {
            ("abort_code", Some(v)) => {
                let code = parse_code(v)
                    .ok_or_else(|| format!("abort_code '{}' is not a u64", v))?;
                expectation = Expectation::Abort(code);
            }
            ("error", Some(v)) | ("major_status", Some(v)) => {
                let kind = v.trim_matches('"').parse::<ErrorKind>()?;
                expectation = Expectation::Error(kind);
            }
            ("arithmetic_error", None) => expectation = Expectation::Error(ErrorKind::Arithmetic),
            ("out_of_gas", None) => expectation = Expectation::Error(ErrorKind::OutOfGas),
            ("vector_error", None) => expectation = Expectation::VectorError,
            // Informational only.
            ("location", Some(_)) | ("minor_status", Some(_)) => {}
            _ => return Err(format!("unsupported expected_failure parameter '{}'", param)),
        }
    }
    Ok(Some(expectation))
}

fn parse_code(text: &str) -> Option<u64> {
    let text = text.trim_end_matches("u64").replace('_', "");
    match text.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => text.parse().ok(),
    }
}

/// The first expectation among `annotations`, or `Success` when there is none.
pub fn expectation_from(annotations: &[String]) -> Result<Option<Expectation>, String> {
    for annotation in annotations {
        if let Some(expectation) = parse_expectation(annotation)? {
            return Ok(Some(expectation));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_forms() {
        assert_eq!(
            parse_expectation("expected_failure").unwrap(),
            Some(Expectation::AnyFailure)
        );
        assert_eq!(
            parse_expectation("expected_failure(abort_code = 7)").unwrap(),
            Some(Expectation::Abort(7))
        );
        assert_eq!(
            parse_expectation("expected_failure(abort_code = 0x10, location = A::M)").unwrap(),
            Some(Expectation::Abort(16))
        );
        assert_eq!(
            parse_expectation(r#"expected_failure(error = "linker")"#).unwrap(),
            Some(Expectation::Error(ErrorKind::Linker))
        );
        assert_eq!(
            parse_expectation("expected_failure(arithmetic_error)").unwrap(),
            Some(Expectation::Error(ErrorKind::Arithmetic))
        );
        assert_eq!(
            parse_expectation("expected_failure(out_of_gas)").unwrap(),
            Some(Expectation::Error(ErrorKind::OutOfGas))
        );
        assert_eq!(parse_expectation("test").unwrap(), None);
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(parse_expectation("expected_failure(abort_code = seven)").is_err());
        assert!(parse_expectation(r#"expected_failure(error = "meltdown")"#).is_err());
        assert!(parse_expectation("expected_failure(sometimes)").is_err());
    }

    #[test]
    fn test_abort_expectation_requires_exact_code() {
        let expected = Expectation::Abort(7);
        assert!(expected.matches(&Outcome::abort(7, None)));
        assert!(!expected.matches(&Outcome::abort(8, None)));
        assert!(!expected.matches(&Outcome::unit()));
        assert!(!expected.matches(&Outcome::error(ErrorKind::Runtime, "boom")));
    }

    #[test]
    fn test_vector_error_matches_any_vector_abort() {
        assert_eq!(
            parse_expectation("expected_failure(vector_error, minor_status = 2)").unwrap(),
            Some(Expectation::VectorError)
        );
        let expected = Expectation::VectorError;
        for code in [1, 2, 3] {
            assert!(expected.matches(&Outcome::abort(code, Some("0x1::vector".to_string()))));
        }
        assert!(!expected.matches(&Outcome::abort(1, Some("0x42::M".to_string()))));
        assert!(!expected.matches(&Outcome::abort(1, None)));
        assert!(!expected.matches(&Outcome::error(ErrorKind::Runtime, "index out of range")));
    }

    #[test]
    fn test_success_and_any_failure() {
        assert!(Expectation::Success.matches(&Outcome::unit()));
        assert!(!Expectation::Success.matches(&Outcome::abort(1, None)));
        assert!(Expectation::AnyFailure.matches(&Outcome::error(ErrorKind::OutOfGas, "")));
        assert!(!Expectation::AnyFailure.matches(&Outcome::unit()));
    }

    #[test]
    fn test_first_expectation_wins() {
        let annotations = vec![
            "test".to_string(),
            "expected_failure(abort_code = 3)".to_string(),
        ];
        assert_eq!(
            expectation_from(&annotations).unwrap(),
            Some(Expectation::Abort(3))
        );
        assert_eq!(expectation_from(&[]).unwrap(), None);
    }
}
