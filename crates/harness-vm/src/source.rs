//! Source-level preparation done before `move-compiler` sees a unit.
//!
//! - scripts are recognised and wrapped as a module under [`SCRIPT_ADDRESS`]
//! - `#[expected_failure(..)]` is consumed by the harness, so it is blanked out
//!   (line and column positions are preserved) and read back from the stored
//!   source by [`function_attributes`]

use std::sync::OnceLock;

use move_core_types::account_address::AccountAddress;
use regex::{Captures, Regex};

/// Address the wrapper module of a script is compiled under.
pub const SCRIPT_ADDRESS: AccountAddress = AccountAddress::new([0x5c; AccountAddress::LENGTH]);

/// Name of the wrapper module of a script.
pub const SCRIPT_MODULE: &str = "txn_script";

fn script_keyword_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:\s+|//[^\n]*\n|/\*(?s:.*?)\*/)*(script)\b").expect("static regex")
    })
}

fn harness_attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"#\[\s*expected_failure\b[^\]]*\]").expect("static regex")
    })
}

fn attribute_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"#\[([^\]]*)\]").expect("static regex"))
}

/// Whether the unit starts with the `script` keyword.
pub fn is_script(source: &str) -> bool {
    script_keyword_re().is_match(source)
}

/// Rewrite `script { .. }` into `module <SCRIPT_ADDRESS>::txn_script { .. }`.
///
/// The rewrite stays on the keyword's line so diagnostics keep their line
/// numbers. Returns `None` when the unit is not a script.
pub fn wrap_script(source: &str) -> Option<String> {
    let keyword = script_keyword_re().captures(source)?.get(1)?;
    let mut wrapped = String::with_capacity(source.len() + 80);
    wrapped.push_str(&source[..keyword.start()]);
    wrapped.push_str(&format!(
        "module {}::{}",
        SCRIPT_ADDRESS.to_hex_literal(),
        SCRIPT_MODULE
    ));
    wrapped.push_str(&source[keyword.end()..]);
    Some(wrapped)
}

/// Replace the attributes the harness interprets with spaces.
pub fn hide_harness_attributes(source: &str) -> String {
    harness_attribute_re()
        .replace_all(source, |caps: &Captures| {
            caps[0]
                .chars()
                .map(|c| if c == '\n' { '\n' } else { ' ' })
                .collect::<String>()
        })
        .into_owned()
}

/// Attributes written above `fun <function>`, without the surrounding `#[..]`.
///
/// `#[test, expected_failure(abort_code = 7)]` yields two entries.
pub fn function_attributes(source: &str, function: &str) -> Vec<String> {
    let pattern = format!(
        r"((?:#\[[^\]]*\]\s*)+)(?:public(?:\s*\(\s*\w+\s*\))?\s+)?(?:entry\s+)?(?:native\s+)?fun\s+{}\b",
        regex::escape(function)
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };
    let Some(block) = re.captures(source).and_then(|c| c.get(1)) else {
        return Vec::new();
    };
    attribute_re()
        .captures_iter(block.as_str())
        .flat_map(|c| split_attribute_list(&c[1]))
        .collect()
}

/// Split `a, b(x = 1, y = 2)` on commas outside parentheses.
fn split_attribute_list(list: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in list.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(list[start..i].trim().to_string());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim().to_string());
    parts.retain(|p| !p.is_empty());
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_detection_skips_comments() {
        assert!(is_script("script { fun main() {} }"));
        assert!(is_script("// leading\n/* block */\n  script {\n fun main() {} }"));
        assert!(!is_script("module 0x1::scripts { }"));
        assert!(!is_script("module A::M { fun script() {} }"));
    }

    #[test]
    fn test_wrap_script_keeps_line_numbers() {
        let wrapped = wrap_script("// c\nscript {\n    fun main() {}\n}").unwrap();
        assert!(wrapped.starts_with("// c\nmodule 0x5c5c"));
        assert!(wrapped.contains("::txn_script {\n    fun main() {}"));
        assert_eq!(wrapped.lines().count(), 4);
        assert!(wrap_script("module A::M {}").is_none());
    }

    #[test]
    fn test_harness_attributes_are_blanked() {
        let src = "#[expected_failure(abort_code = 7)]\nfun f() {}";
        let hidden = hide_harness_attributes(src);
        assert_eq!(hidden.len(), src.len());
        assert!(hidden.trim_start().starts_with("fun f()"));
        assert_eq!(hide_harness_attributes("#[test_only]\nfun g() {}"), "#[test_only]\nfun g() {}");
    }

    #[test]
    fn test_function_attributes() {
        let src = r#"
            module A::M {
                #[expected_failure(abort_code = 7, location = A::M)]
                public entry fun boom() { abort 7 }

                #[allow(unused)]
                #[expected_failure(arithmetic_error)]
                public(package) fun overflow() {}

                fun plain() {}
            }
        "#;
        assert_eq!(
            function_attributes(src, "boom"),
            vec!["expected_failure(abort_code = 7, location = A::M)".to_string()]
        );
        assert_eq!(
            function_attributes(src, "overflow"),
            vec![
                "allow(unused)".to_string(),
                "expected_failure(arithmetic_error)".to_string()
            ]
        );
        assert!(function_attributes(src, "plain").is_empty());
        assert!(function_attributes(src, "missing").is_empty());
    }
}
