//! Values crossing the harness/VM boundary and their canonical rendering.
//!
//! Rendering is part of the golden output format, so it must stay stable:
//!
//! | value | rendered |
//! |---|---|
//! | `bool` | `true` |
//! | `u8` / `u16` / `u32` | `7u8` / `7u16` / `7u32` |
//! | `u64` / `u128` / `u256` | `7` / `7u128` / `7u256` |
//! | `address` | `@0x42` |
//! | `signer` | `signer(@0x42)` |
//! | `vector<u8>` | `x"6364"` |
//! | other vectors | `[1, 2]` |
//! | `0x1::string::String` | `"cd"` |
//! | structs | `0x42::M::S { f: 1 }`, `0x42::M::Box<u64> { v: 1 }` |

use std::fmt;

use move_core_types::account_address::AccountAddress;
use move_core_types::ident_str;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::{self, ModuleId, TypeTag};
use move_core_types::u256::U256;

use crate::address::{format_address, format_module_id, STD_ADDRESS};

/// Fully qualified struct type (`0x42::M::S`, `0x42::M::Box<u64>`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StructTag {
    pub module: ModuleId,
    pub name: Identifier,
    pub type_args: Vec<TypeTag>,
}

impl StructTag {
    pub fn new(module: ModuleId, name: Identifier) -> Self {
        Self {
            module,
            name,
            type_args: Vec::new(),
        }
    }

    pub fn with_type_args(mut self, type_args: Vec<TypeTag>) -> Self {
        self.type_args = type_args;
        self
    }

    /// The equivalent `move-core-types` tag.
    pub fn to_language_tag(&self) -> language_storage::StructTag {
        language_storage::StructTag {
            address: *self.module.address(),
            module: self.module.name().to_owned(),
            name: self.name.clone(),
            type_params: self.type_args.clone(),
        }
    }

    pub fn from_language_tag(tag: &language_storage::StructTag) -> Self {
        Self {
            module: ModuleId::new(tag.address, tag.module.clone()),
            name: tag.name.clone(),
            type_args: tag.type_params.clone(),
        }
    }

    /// Whether this is the standard library `0x1::string::String`.
    pub fn is_std_string(&self) -> bool {
        *self.module.address() == STD_ADDRESS
            && self.module.name().as_str() == "string"
            && self.name.as_str() == "String"
    }
}

impl fmt::Display for StructTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", format_module_id(&self.module), self.name)?;
        write_type_args(f, &self.type_args)
    }
}

/// Render a type in source syntax with short addresses (`vector<0x42::M::S>`).
pub fn format_type_tag(tag: &TypeTag) -> String {
    match tag {
        TypeTag::Bool => "bool".to_string(),
        TypeTag::U8 => "u8".to_string(),
        TypeTag::U16 => "u16".to_string(),
        TypeTag::U32 => "u32".to_string(),
        TypeTag::U64 => "u64".to_string(),
        TypeTag::U128 => "u128".to_string(),
        TypeTag::U256 => "u256".to_string(),
        TypeTag::Address => "address".to_string(),
        TypeTag::Signer => "signer".to_string(),
        TypeTag::Vector(inner) => format!("vector<{}>", format_type_tag(inner)),
        TypeTag::Struct(s) => StructTag::from_language_tag(s).to_string(),
    }
}

fn write_type_args(f: &mut fmt::Formatter<'_>, type_args: &[TypeTag]) -> fmt::Result {
    if type_args.is_empty() {
        return Ok(());
    }
    let rendered: Vec<String> = type_args.iter().map(format_type_tag).collect();
    write!(f, "<{}>", rendered.join(", "))
}

/// A struct value with its fields in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveStruct {
    pub type_: StructTag,
    pub fields: Vec<(Identifier, MoveValue)>,
}

impl MoveStruct {
    pub fn field(&self, name: &str) -> Option<&MoveValue> {
        self.fields
            .iter()
            .find(|(n, _)| n.as_str() == name)
            .map(|(_, v)| v)
    }
}

/// A runtime value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoveValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    U128(u128),
    U256(U256),
    Address(AccountAddress),
    Signer(AccountAddress),
    Vector(Vec<MoveValue>),
    Struct(MoveStruct),
}

impl MoveValue {
    /// Build a `vector<u8>` from raw bytes.
    pub fn bytes(bytes: &[u8]) -> Self {
        MoveValue::Vector(bytes.iter().copied().map(MoveValue::U8).collect())
    }

    /// Build a `0x1::string::String` wrapping the UTF-8 bytes of `s`.
    pub fn string(s: &str) -> Self {
        let tag = StructTag::new(
            ModuleId::new(STD_ADDRESS, ident_str!("string").to_owned()),
            ident_str!("String").to_owned(),
        );
        MoveValue::Struct(MoveStruct {
            type_: tag,
            fields: vec![(
                ident_str!("bytes").to_owned(),
                MoveValue::bytes(s.as_bytes()),
            )],
        })
    }

    /// The bytes of a non-empty `vector<u8>`, or `None` for anything else.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            MoveValue::Vector(elems) if !elems.is_empty() => elems
                .iter()
                .map(|e| match e {
                    MoveValue::U8(b) => Some(*b),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// The text of a `0x1::string::String`, if it holds valid UTF-8.
    pub fn as_std_string(&self) -> Option<String> {
        let MoveValue::Struct(s) = self else {
            return None;
        };
        if !s.type_.is_std_string() || s.fields.len() != 1 {
            return None;
        }
        match s.field("bytes")? {
            MoveValue::Vector(elems) if elems.is_empty() => Some(String::new()),
            bytes => String::from_utf8(bytes.as_bytes()?).ok(),
        }
    }
}

impl fmt::Display for MoveValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MoveValue::Bool(b) => write!(f, "{}", b),
            MoveValue::U8(n) => write!(f, "{}u8", n),
            MoveValue::U16(n) => write!(f, "{}u16", n),
            MoveValue::U32(n) => write!(f, "{}u32", n),
            MoveValue::U64(n) => write!(f, "{}", n),
            MoveValue::U128(n) => write!(f, "{}u128", n),
            MoveValue::U256(n) => write!(f, "{}u256", n),
            MoveValue::Address(a) => write!(f, "@{}", format_address(a)),
            MoveValue::Signer(a) => write!(f, "signer(@{})", format_address(a)),
            MoveValue::Vector(elems) => {
                if let Some(bytes) = self.as_bytes() {
                    return write!(f, "x\"{}\"", hex::encode(bytes));
                }
                write!(f, "[")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", e)?;
                }
                write!(f, "]")
            }
            MoveValue::Struct(s) => {
                if let Some(text) = self.as_std_string() {
                    return write!(f, "{:?}", text);
                }
                write!(f, "{}", s.type_)?;
                if s.fields.is_empty() {
                    return write!(f, " {{}}");
                }
                write!(f, " {{ ")?;
                for (i, (name, value)) in s.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, value)?;
                }
                write!(f, " }}")
            }
        }
    }
}

// =============================================================================
// Transaction arguments
// =============================================================================

/// A `run --args` value before it meets the parameter it is passed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallArg {
    /// A value whose type is fixed by its syntax (`7u8`, `true`, `@A`).
    Value(MoveValue),
    /// An integer literal without a width suffix; takes the parameter's width.
    UntypedInt(u128),
    /// `vector[..]` with at least one element that is not fully typed.
    Vector(Vec<CallArg>),
}

impl From<MoveValue> for CallArg {
    fn from(value: MoveValue) -> Self {
        CallArg::Value(value)
    }
}

impl fmt::Display for CallArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallArg::Value(v) => write!(f, "{}", v),
            CallArg::UntypedInt(n) => write!(f, "{}", n),
            CallArg::Vector(elems) => {
                let rendered: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "vector[{}]", rendered.join(", "))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(addr: u8, module: &str, name: &str) -> StructTag {
        StructTag::new(
            ModuleId::new(
                crate::address::address_from_u128(addr as u128),
                Identifier::new(module).unwrap(),
            ),
            Identifier::new(name).unwrap(),
        )
    }

    #[test]
    fn test_render_scalars() {
        assert_eq!(MoveValue::Bool(true).to_string(), "true");
        assert_eq!(MoveValue::U8(7).to_string(), "7u8");
        assert_eq!(MoveValue::U64(7).to_string(), "7");
        assert_eq!(MoveValue::U128(7).to_string(), "7u128");
        assert_eq!(MoveValue::U16(7).to_string(), "7u16");
        assert_eq!(MoveValue::U32(7).to_string(), "7u32");
        assert_eq!(MoveValue::U256(U256::from(7u8)).to_string(), "7u256");
        let addr = crate::address::address_from_u128(0x42);
        assert_eq!(MoveValue::Address(addr).to_string(), "@0x42");
        assert_eq!(MoveValue::Signer(addr).to_string(), "signer(@0x42)");
    }

    #[test]
    fn test_render_vectors() {
        assert_eq!(MoveValue::bytes(b"cd").to_string(), "x\"6364\"");
        let v = MoveValue::Vector(vec![MoveValue::U64(1), MoveValue::U64(2)]);
        assert_eq!(v.to_string(), "[1, 2]");
        assert_eq!(MoveValue::Vector(vec![]).to_string(), "[]");
    }

    #[test]
    fn test_render_strings() {
        assert_eq!(MoveValue::string("cd").to_string(), "\"cd\"");
        assert_eq!(MoveValue::string("").to_string(), "\"\"");
        assert_eq!(MoveValue::string("a\"b").to_string(), "\"a\\\"b\"");
    }

    #[test]
    fn test_render_struct() {
        let s = MoveValue::Struct(MoveStruct {
            type_: tag(0x42, "M", "S"),
            fields: vec![(Identifier::new("f").unwrap(), MoveValue::U64(1))],
        });
        assert_eq!(s.to_string(), "0x42::M::S { f: 1 }");

        let empty = MoveValue::Struct(MoveStruct {
            type_: tag(0x42, "M", "Marker"),
            fields: vec![],
        });
        assert_eq!(empty.to_string(), "0x42::M::Marker {}");
    }

    #[test]
    fn test_render_generic_struct() {
        let inner = tag(0x42, "M", "Coin").to_language_tag();
        let boxed = MoveValue::Struct(MoveStruct {
            type_: tag(0x42, "M", "Box").with_type_args(vec![
                TypeTag::U64,
                TypeTag::Vector(Box::new(TypeTag::Struct(Box::new(inner)))),
            ]),
            fields: vec![(Identifier::new("v").unwrap(), MoveValue::U64(1))],
        });
        assert_eq!(
            boxed.to_string(),
            "0x42::M::Box<u64, vector<0x42::M::Coin>> { v: 1 }"
        );
    }

    #[test]
    fn test_call_arg_rendering_keeps_literals_untyped() {
        let arg = CallArg::Vector(vec![
            CallArg::UntypedInt(1),
            CallArg::Value(MoveValue::U8(2)),
        ]);
        assert_eq!(arg.to_string(), "vector[1, 2u8]");
    }

    #[test]
    fn test_invalid_utf8_string_renders_as_struct() {
        let s = MoveValue::Struct(MoveStruct {
            type_: tag(1, "string", "String"),
            fields: vec![(Identifier::new("bytes").unwrap(), MoveValue::bytes(&[0xff]))],
        });
        assert_eq!(s.to_string(), "0x1::string::String { bytes: x\"ff\" }");
    }
}
