//! Conversions between harness values and what the VM consumes or produces.
//!
//! - bytecode signatures become [`TypeTag`]s with type arguments substituted
//! - a [`TypeResolver`] builds annotated layouts from the modules in a state
//! - [`CallArg`]s are checked against a layout and serialized to BCS
//! - BCS return values and resources decode back to [`MoveValue`]

use std::collections::BTreeMap;

use move_binary_format::file_format::{DatatypeHandleIndex, SignatureToken, StructFieldInformation};
use move_binary_format::CompiledModule;
use move_core_types::annotated_value::{
    MoveFieldLayout, MoveStruct as AnnotatedStruct, MoveStructLayout, MoveTypeLayout,
    MoveValue as AnnotatedValue,
};
use move_core_types::language_storage::{self, ModuleId, TypeTag};
use move_core_types::u256::U256;
use txn_harness_types::address::format_module_id;
use txn_harness_types::value::format_type_tag;
use txn_harness_types::{CallArg, MoveStruct, MoveValue, StructTag};

use crate::storage::PublishedModule;

/// Nesting limit for layouts; deeper types are rejected.
const MAX_LAYOUT_DEPTH: usize = 64;

// =============================================================================
// Signatures
// =============================================================================

/// The type a signature token denotes, looking through references.
///
/// Returns `None` when the token names a type parameter not in `ty_args`.
pub fn signature_to_tag(
    module: &CompiledModule,
    token: &SignatureToken,
    ty_args: &[TypeTag],
) -> Option<TypeTag> {
    Some(match token {
        SignatureToken::Bool => TypeTag::Bool,
        SignatureToken::U8 => TypeTag::U8,
        SignatureToken::U16 => TypeTag::U16,
        SignatureToken::U32 => TypeTag::U32,
        SignatureToken::U64 => TypeTag::U64,
        SignatureToken::U128 => TypeTag::U128,
        SignatureToken::U256 => TypeTag::U256,
        SignatureToken::Address => TypeTag::Address,
        SignatureToken::Signer => TypeTag::Signer,
        SignatureToken::Vector(inner) => {
            TypeTag::Vector(Box::new(signature_to_tag(module, inner, ty_args)?))
        }
        SignatureToken::Datatype(idx) => {
            TypeTag::Struct(Box::new(datatype_tag(module, *idx, Vec::new())))
        }
        SignatureToken::DatatypeInstantiation(inst) => {
            let (idx, params) = &**inst;
            let params = params
                .iter()
                .map(|p| signature_to_tag(module, p, ty_args))
                .collect::<Option<Vec<_>>>()?;
            TypeTag::Struct(Box::new(datatype_tag(module, *idx, params)))
        }
        SignatureToken::Reference(inner) | SignatureToken::MutableReference(inner) => {
            signature_to_tag(module, inner, ty_args)?
        }
        SignatureToken::TypeParameter(i) => ty_args.get(*i as usize)?.clone(),
    })
}

fn datatype_tag(
    module: &CompiledModule,
    idx: DatatypeHandleIndex,
    type_params: Vec<TypeTag>,
) -> language_storage::StructTag {
    let handle = module.datatype_handle_at(idx);
    let module_handle = module.module_handle_at(handle.module);
    language_storage::StructTag {
        address: *module.address_identifier_at(module_handle.address),
        module: module.identifier_at(module_handle.name).to_owned(),
        name: module.identifier_at(handle.name).to_owned(),
        type_params,
    }
}

/// `signer` or `&signer`: parameters filled from the transaction's signers.
pub fn is_signer_param(token: &SignatureToken) -> bool {
    match token {
        SignatureToken::Signer => true,
        SignatureToken::Reference(inner) => **inner == SignatureToken::Signer,
        _ => false,
    }
}

/// Module-independent rendering of a signature token, for upgrade checks.
pub fn describe_token(module: &CompiledModule, token: &SignatureToken) -> String {
    match token {
        SignatureToken::Vector(inner) => format!("vector<{}>", describe_token(module, inner)),
        SignatureToken::Reference(inner) => format!("&{}", describe_token(module, inner)),
        SignatureToken::MutableReference(inner) => {
            format!("&mut {}", describe_token(module, inner))
        }
        SignatureToken::TypeParameter(i) => format!("T{i}"),
        SignatureToken::Datatype(idx) => {
            format_type_tag(&TypeTag::Struct(Box::new(datatype_tag(module, *idx, Vec::new()))))
        }
        SignatureToken::DatatypeInstantiation(inst) => {
            let (idx, params) = &**inst;
            let base = datatype_tag(module, *idx, Vec::new());
            let params: Vec<String> = params.iter().map(|p| describe_token(module, p)).collect();
            format!(
                "{}<{}>",
                format_type_tag(&TypeTag::Struct(Box::new(base))),
                params.join(", ")
            )
        }
        primitive => match signature_to_tag(module, primitive, &[]) {
            Some(tag) => format_type_tag(&tag),
            None => format!("{primitive:?}"),
        },
    }
}

// =============================================================================
// Layouts
// =============================================================================

/// Builds annotated layouts from the modules of a state, plus the unit
/// currently being published or run.
pub struct TypeResolver<'a> {
    modules: &'a BTreeMap<ModuleId, PublishedModule>,
    extra: Option<&'a CompiledModule>,
}

impl<'a> TypeResolver<'a> {
    pub fn new(modules: &'a BTreeMap<ModuleId, PublishedModule>) -> Self {
        Self {
            modules,
            extra: None,
        }
    }

    pub fn with_module(mut self, module: &'a CompiledModule) -> Self {
        self.extra = Some(module);
        self
    }

    fn module(&self, id: &ModuleId) -> Option<&'a CompiledModule> {
        if let Some(extra) = self.extra {
            if extra.self_id() == *id {
                return Some(extra);
            }
        }
        self.modules.get(id).map(|m| &m.module)
    }

    pub fn layout(&self, tag: &TypeTag) -> Result<MoveTypeLayout, String> {
        self.layout_at(tag, 0)
    }

    fn layout_at(&self, tag: &TypeTag, depth: usize) -> Result<MoveTypeLayout, String> {
        if depth > MAX_LAYOUT_DEPTH {
            return Err(format!("type {} is nested too deeply", format_type_tag(tag)));
        }
        Ok(match tag {
            TypeTag::Bool => MoveTypeLayout::Bool,
            TypeTag::U8 => MoveTypeLayout::U8,
            TypeTag::U16 => MoveTypeLayout::U16,
            TypeTag::U32 => MoveTypeLayout::U32,
            TypeTag::U64 => MoveTypeLayout::U64,
            TypeTag::U128 => MoveTypeLayout::U128,
            TypeTag::U256 => MoveTypeLayout::U256,
            TypeTag::Address => MoveTypeLayout::Address,
            TypeTag::Signer => MoveTypeLayout::Signer,
            TypeTag::Vector(inner) => {
                MoveTypeLayout::Vector(Box::new(self.layout_at(inner, depth + 1)?))
            }
            TypeTag::Struct(tag) => {
                MoveTypeLayout::Struct(Box::new(self.struct_layout(tag, depth)?))
            }
        })
    }

    fn struct_layout(
        &self,
        tag: &language_storage::StructTag,
        depth: usize,
    ) -> Result<MoveStructLayout, String> {
        let id = ModuleId::new(tag.address, tag.module.clone());
        let module = self
            .module(&id)
            .ok_or_else(|| format!("module {} not found", format_module_id(&id)))?;
        let def = module
            .struct_defs
            .iter()
            .find(|def| {
                let handle = module.datatype_handle_at(def.struct_handle);
                module.identifier_at(handle.name) == tag.name.as_ident_str()
            })
            .ok_or_else(|| {
                format!("struct {}::{} not found", format_module_id(&id), tag.name)
            })?;
        let StructFieldInformation::Declared(fields) = &def.field_information else {
            return Err(format!("struct {}::{} is native", format_module_id(&id), tag.name));
        };
        let fields = fields
            .iter()
            .map(|field| {
                let field_tag = signature_to_tag(module, &field.signature.0, &tag.type_params)
                    .ok_or_else(|| {
                        format!(
                            "struct {}::{} is missing type arguments",
                            format_module_id(&id),
                            tag.name
                        )
                    })?;
                Ok(MoveFieldLayout::new(
                    module.identifier_at(field.name).to_owned(),
                    self.layout_at(&field_tag, depth + 1)?,
                ))
            })
            .collect::<Result<Vec<_>, String>>()?;
        Ok(MoveStructLayout::new(tag.clone(), fields))
    }
}

// =============================================================================
// Values
// =============================================================================

/// Serialize a transaction argument for a parameter of the given layout.
///
/// Returns `None` when the argument does not fit the parameter: an unsuffixed
/// integer takes the parameter's width if it fits, every other form must match
/// the parameter type exactly.
pub fn encode_arg(arg: &CallArg, layout: &MoveTypeLayout) -> Option<Vec<u8>> {
    call_arg_value(arg, layout)?.simple_serialize()
}

/// Serialize a signer for a `signer`/`&signer` parameter.
pub fn encode_signer(address: move_core_types::account_address::AccountAddress) -> Option<Vec<u8>> {
    AnnotatedValue::Signer(address).simple_serialize()
}

fn call_arg_value(arg: &CallArg, layout: &MoveTypeLayout) -> Option<AnnotatedValue> {
    match (arg, layout) {
        (CallArg::UntypedInt(n), layout) => untyped_int(*n, layout),
        (CallArg::Vector(elems), MoveTypeLayout::Vector(inner)) => Some(AnnotatedValue::Vector(
            elems
                .iter()
                .map(|e| call_arg_value(e, inner))
                .collect::<Option<Vec<_>>>()?,
        )),
        (CallArg::Value(value), layout) => typed_value(value, layout),
        _ => None,
    }
}

fn untyped_int(n: u128, layout: &MoveTypeLayout) -> Option<AnnotatedValue> {
    match layout {
        MoveTypeLayout::U8 => u8::try_from(n).ok().map(AnnotatedValue::U8),
        MoveTypeLayout::U16 => u16::try_from(n).ok().map(AnnotatedValue::U16),
        MoveTypeLayout::U32 => u32::try_from(n).ok().map(AnnotatedValue::U32),
        MoveTypeLayout::U64 => u64::try_from(n).ok().map(AnnotatedValue::U64),
        MoveTypeLayout::U128 => Some(AnnotatedValue::U128(n)),
        MoveTypeLayout::U256 => Some(AnnotatedValue::U256(U256::from(n))),
        _ => None,
    }
}

fn typed_value(value: &MoveValue, layout: &MoveTypeLayout) -> Option<AnnotatedValue> {
    Some(match (value, layout) {
        (MoveValue::Bool(b), MoveTypeLayout::Bool) => AnnotatedValue::Bool(*b),
        (MoveValue::U8(n), MoveTypeLayout::U8) => AnnotatedValue::U8(*n),
        (MoveValue::U16(n), MoveTypeLayout::U16) => AnnotatedValue::U16(*n),
        (MoveValue::U32(n), MoveTypeLayout::U32) => AnnotatedValue::U32(*n),
        (MoveValue::U64(n), MoveTypeLayout::U64) => AnnotatedValue::U64(*n),
        (MoveValue::U128(n), MoveTypeLayout::U128) => AnnotatedValue::U128(*n),
        (MoveValue::U256(n), MoveTypeLayout::U256) => AnnotatedValue::U256(*n),
        (MoveValue::Address(a), MoveTypeLayout::Address) => AnnotatedValue::Address(*a),
        (MoveValue::Signer(a), MoveTypeLayout::Signer) => AnnotatedValue::Signer(*a),
        (MoveValue::Vector(elems), MoveTypeLayout::Vector(inner)) => AnnotatedValue::Vector(
            elems
                .iter()
                .map(|e| typed_value(e, inner))
                .collect::<Option<Vec<_>>>()?,
        ),
        (MoveValue::Struct(s), MoveTypeLayout::Struct(layout))
            if s.type_.to_language_tag() == layout.type_ && s.fields.len() == layout.fields.len() =>
        {
            let fields = s
                .fields
                .iter()
                .zip(layout.fields.iter())
                .map(|((name, v), field)| {
                    (*name == field.name)
                        .then(|| typed_value(v, &field.layout))
                        .flatten()
                        .map(|v| (name.clone(), v))
                })
                .collect::<Option<Vec<_>>>()?;
            AnnotatedValue::Struct(AnnotatedStruct::new(layout.type_.clone(), fields))
        }
        _ => return None,
    })
}

/// Decode BCS bytes of the given layout into a harness value.
pub fn decode_value(bytes: &[u8], layout: &MoveTypeLayout) -> Result<MoveValue, String> {
    let value = AnnotatedValue::simple_deserialize(bytes, layout)
        .map_err(|e| format!("value could not be decoded: {e}"))?;
    to_harness_value(value)
}

fn to_harness_value(value: AnnotatedValue) -> Result<MoveValue, String> {
    Ok(match value {
        AnnotatedValue::Bool(b) => MoveValue::Bool(b),
        AnnotatedValue::U8(n) => MoveValue::U8(n),
        AnnotatedValue::U16(n) => MoveValue::U16(n),
        AnnotatedValue::U32(n) => MoveValue::U32(n),
        AnnotatedValue::U64(n) => MoveValue::U64(n),
        AnnotatedValue::U128(n) => MoveValue::U128(n),
        AnnotatedValue::U256(n) => MoveValue::U256(n),
        AnnotatedValue::Address(a) => MoveValue::Address(a),
        AnnotatedValue::Signer(a) => MoveValue::Signer(a),
        AnnotatedValue::Vector(elems) => MoveValue::Vector(
            elems
                .into_iter()
                .map(to_harness_value)
                .collect::<Result<Vec<_>, _>>()?,
        ),
        AnnotatedValue::Struct(s) => MoveValue::Struct(MoveStruct {
            type_: StructTag::from_language_tag(&s.type_),
            fields: s
                .fields
                .into_iter()
                .map(|(name, v)| Ok((name, to_harness_value(v)?)))
                .collect::<Result<Vec<_>, String>>()?,
        }),
        AnnotatedValue::Variant(_) => return Err("enum values are not supported".to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;
    use move_core_types::ident_str;

    fn string_layout() -> MoveTypeLayout {
        let tag = language_storage::StructTag {
            address: AccountAddress::ONE,
            module: ident_str!("string").to_owned(),
            name: ident_str!("String").to_owned(),
            type_params: vec![],
        };
        MoveTypeLayout::Struct(Box::new(MoveStructLayout::new(
            tag,
            vec![MoveFieldLayout::new(
                ident_str!("bytes").to_owned(),
                MoveTypeLayout::Vector(Box::new(MoveTypeLayout::U8)),
            )],
        )))
    }

    #[test]
    fn test_untyped_ints_take_the_parameter_width() {
        let arg = CallArg::UntypedInt(7);
        assert_eq!(encode_arg(&arg, &MoveTypeLayout::U8), Some(vec![7]));
        assert_eq!(
            encode_arg(&arg, &MoveTypeLayout::U64),
            Some(7u64.to_le_bytes().to_vec())
        );
        assert_eq!(encode_arg(&CallArg::UntypedInt(256), &MoveTypeLayout::U8), None);
        assert_eq!(encode_arg(&arg, &MoveTypeLayout::Bool), None);
    }

    #[test]
    fn test_suffixed_values_must_match_exactly() {
        let arg = CallArg::Value(MoveValue::U8(7));
        assert_eq!(encode_arg(&arg, &MoveTypeLayout::U8), Some(vec![7]));
        assert_eq!(encode_arg(&arg, &MoveTypeLayout::U64), None);

        let mixed = CallArg::Vector(vec![
            CallArg::UntypedInt(1),
            CallArg::Value(MoveValue::U64(2)),
        ]);
        let vec_u64 = MoveTypeLayout::Vector(Box::new(MoveTypeLayout::U64));
        let vec_u8 = MoveTypeLayout::Vector(Box::new(MoveTypeLayout::U8));
        assert!(encode_arg(&mixed, &vec_u64).is_some());
        assert_eq!(encode_arg(&mixed, &vec_u8), None);
    }

    #[test]
    fn test_strings_round_trip_through_layouts() {
        let layout = string_layout();
        let bytes = encode_arg(&CallArg::Value(MoveValue::string("cd")), &layout).unwrap();
        assert_eq!(bytes, vec![2, b'c', b'd']);
        let decoded = decode_value(&bytes, &layout).unwrap();
        assert_eq!(decoded.to_string(), "\"cd\"");
        assert_eq!(
            encode_arg(&CallArg::Value(MoveValue::bytes(b"cd")), &layout),
            None
        );
    }

    #[test]
    fn test_signers_serialize_as_addresses() {
        let addr = AccountAddress::new([0x42; AccountAddress::LENGTH]);
        assert_eq!(encode_signer(addr), Some(addr.to_vec()));
    }
}
