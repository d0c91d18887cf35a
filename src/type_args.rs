//! Type syntax for `run --type-args` and `view --resource`.
//!
//! Primitives (`u8` .. `u256`, `bool`, `address`, `signer`), `vector<T>` and
//! structs written `ADDRESS::MODULE::NAME<T, ..>` where ADDRESS is an alias or
//! a literal.

use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::{ModuleId, TypeTag};
use txn_harness_types::StructTag;

use crate::errors::{ArgumentError, RegistryError};

/// Parse one type, resolving struct addresses through `resolve`.
pub fn parse_type_arg<F>(token: &str, resolve: &F) -> Result<TypeTag, ArgumentError>
where
    F: Fn(&str) -> Result<AccountAddress, RegistryError>,
{
    let text = token.trim();
    match text {
        "bool" => return Ok(TypeTag::Bool),
        "u8" => return Ok(TypeTag::U8),
        "u16" => return Ok(TypeTag::U16),
        "u32" => return Ok(TypeTag::U32),
        "u64" => return Ok(TypeTag::U64),
        "u128" => return Ok(TypeTag::U128),
        "u256" => return Ok(TypeTag::U256),
        "address" => return Ok(TypeTag::Address),
        "signer" => return Ok(TypeTag::Signer),
        _ => {}
    }
    if let Some(inner) = text.strip_prefix("vector<").and_then(|s| s.strip_suffix('>')) {
        return Ok(TypeTag::Vector(Box::new(parse_type_arg(inner, resolve)?)));
    }
    let tag = parse_struct_type(text, resolve)?;
    Ok(TypeTag::Struct(Box::new(tag.to_language_tag())))
}

/// Parse `ADDRESS::MODULE::NAME` with optional `<..>` type arguments.
pub fn parse_struct_type<F>(token: &str, resolve: &F) -> Result<StructTag, ArgumentError>
where
    F: Fn(&str) -> Result<AccountAddress, RegistryError>,
{
    let text = token.trim();
    let (base, params) = match text.find('<') {
        Some(pos) => {
            let params = text[pos..]
                .strip_prefix('<')
                .and_then(|p| p.strip_suffix('>'))
                .ok_or_else(|| ArgumentError::syntax(token, "unbalanced type arguments"))?;
            (&text[..pos], Some(params))
        }
        None => (text, None),
    };

    let parts: Vec<&str> = base.split("::").map(str::trim).collect();
    let [address, module, name] = parts.as_slice() else {
        return Err(ArgumentError::syntax(
            token,
            "expected a primitive, vector<T> or ADDRESS::MODULE::NAME",
        ));
    };
    let address = resolve(address)?;
    let (Ok(module), Ok(name)) = (Identifier::new(*module), Identifier::new(*name)) else {
        return Err(ArgumentError::syntax(token, "invalid identifier in type"));
    };

    let type_args = match params {
        Some(params) => split_type_params(params)
            .ok_or_else(|| ArgumentError::syntax(token, "unbalanced type arguments"))?
            .into_iter()
            .map(|p| parse_type_arg(p, resolve))
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    Ok(StructTag::new(ModuleId::new(address, module), name).with_type_args(type_args))
}

/// Split on commas outside angle brackets.
fn split_type_params(s: &str) -> Option<Vec<&str>> {
    let mut result = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth = depth.checked_sub(1)?,
            ',' if depth == 0 => {
                result.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return None;
    }
    let last = s[start..].trim();
    if last.is_empty() {
        return None;
    }
    result.push(last);
    Some(result)
}
