//! Transaction argument syntax for `run --args`.
//!
//! | form | value |
//! |---|---|
//! | `true`, `false` | bool |
//! | `7`, `0x2a` | integer taking the parameter's width |
//! | `7u8`, `7u16`, `7u32`, `7u64`, `7u128`, `7u256` | integer of exactly that type |
//! | `@A`, `@0x42` | address (alias or literal) |
//! | `b"text"` | `vector<u8>` of the UTF-8 bytes |
//! | `x"0aff"` | `vector<u8>` from hex |
//! | `"text"` | `0x1::string::String` |
//! | `vector[a, b]` | vector of the element forms above |
//!
//! A suffixed integer passed to a parameter of another width is rejected by
//! the backend; only unsuffixed literals adapt.

use move_core_types::account_address::AccountAddress;
use move_core_types::u256::U256;
use txn_harness_types::{CallArg, MoveValue};

use crate::errors::{ArgumentError, RegistryError};

/// Parse one `--args` token, resolving `@alias` through `resolve`.
pub fn parse_argument<F>(token: &str, resolve: &F) -> Result<CallArg, ArgumentError>
where
    F: Fn(&str) -> Result<AccountAddress, RegistryError>,
{
    let text = token.trim();
    if text.is_empty() {
        return Err(ArgumentError::syntax(token, "empty argument"));
    }

    if let Some(name) = text.strip_prefix('@') {
        return Ok(MoveValue::Address(resolve(name)?).into());
    }
    match text {
        "true" => return Ok(MoveValue::Bool(true).into()),
        "false" => return Ok(MoveValue::Bool(false).into()),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix("vector[").and_then(|t| t.strip_suffix(']')) {
        let elems = split_top_level(inner)
            .ok_or_else(|| ArgumentError::syntax(token, "unbalanced brackets"))?
            .into_iter()
            .map(|e| parse_argument(e, resolve))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(vector_arg(elems));
    }
    if let Some(body) = quoted(text, "x\"") {
        let bytes = hex::decode(body)
            .map_err(|e| ArgumentError::syntax(token, format!("bad hex literal: {}", e)))?;
        return Ok(MoveValue::bytes(&bytes).into());
    }
    if let Some(body) = quoted(text, "b\"") {
        let s = unescape(body).map_err(|m| ArgumentError::syntax(token, m))?;
        return Ok(MoveValue::bytes(s.as_bytes()).into());
    }
    if let Some(body) = quoted(text, "\"") {
        let s = unescape(body).map_err(|m| ArgumentError::syntax(token, m))?;
        return Ok(MoveValue::string(&s).into());
    }
    if text.starts_with(|c: char| c.is_ascii_digit()) {
        return parse_integer(text).ok_or_else(|| ArgumentError::syntax(token, "invalid integer"));
    }

    Err(ArgumentError::syntax(token, "unrecognized argument syntax"))
}

fn quoted<'a>(text: &'a str, open: &str) -> Option<&'a str> {
    text.strip_prefix(open)?.strip_suffix('"')
}

/// A vector whose elements are all typed is itself a typed value.
fn vector_arg(elems: Vec<CallArg>) -> CallArg {
    if elems.iter().all(|e| matches!(e, CallArg::Value(_))) {
        let values = elems
            .into_iter()
            .filter_map(|e| match e {
                CallArg::Value(v) => Some(v),
                _ => None,
            })
            .collect();
        return CallArg::Value(MoveValue::Vector(values));
    }
    CallArg::Vector(elems)
}

const INTEGER_SUFFIXES: [&str; 6] = ["u256", "u128", "u64", "u32", "u16", "u8"];

fn parse_integer(text: &str) -> Option<CallArg> {
    let (digits, suffix) = INTEGER_SUFFIXES
        .iter()
        .find_map(|s| text.strip_suffix(s).map(|d| (d, Some(*s))))
        .unwrap_or((text, None));
    let digits = digits.replace('_', "");
    if suffix == Some("u256") {
        let value = match digits.strip_prefix("0x") {
            Some(hex) => U256::from_str_radix(hex, 16).ok()?,
            None => U256::from_str_radix(&digits, 10).ok()?,
        };
        return Some(MoveValue::U256(value).into());
    }
    let value = match digits.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u128>().ok()?,
    };
    let typed = match suffix {
        None => return Some(CallArg::UntypedInt(value)),
        Some("u8") => MoveValue::U8(u8::try_from(value).ok()?),
        Some("u16") => MoveValue::U16(u16::try_from(value).ok()?),
        Some("u32") => MoveValue::U32(u32::try_from(value).ok()?),
        Some("u64") => MoveValue::U64(u64::try_from(value).ok()?),
        Some(_) => MoveValue::U128(value),
    };
    Some(typed.into())
}

/// Split on commas that are not nested in brackets or quotes.
fn split_top_level(text: &str) -> Option<Vec<&str>> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut start = 0;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '[' => depth += 1,
            ']' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 || in_string {
        return None;
    }
    let last = text[start..].trim();
    if !last.is_empty() {
        parts.push(last);
    } else if !parts.is_empty() {
        return None;
    }
    Some(parts)
}

fn unescape(body: &str) -> Result<String, String> {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('0') => out.push('\0'),
            Some('\\') => out.push('\\'),
            Some('"') => out.push('"'),
            Some(other) => return Err(format!("unknown escape '\\{}'", other)),
            None => return Err("dangling escape".to_string()),
        }
    }
    Ok(out)
}
