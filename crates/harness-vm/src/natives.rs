//! Native function table for the VM.
//!
//! `move-stdlib-natives` provides vector, string, hash, bcs and signer. This
//! module adds the natives the harness owns:
//!
//! - `0x1::account::create_signer`
//! - `0x1::storage::{publish, remove, exists_at, borrow, borrow_mut}`, backed by
//!   the [`ResourceRuntime`] extension

use std::collections::VecDeque;
use std::sync::Arc;

use move_binary_format::errors::{PartialVMError, PartialVMResult};
use move_core_types::account_address::AccountAddress;
use move_core_types::gas_algebra::InternalGas;
use move_core_types::runtime_value::MoveTypeLayout;
use move_core_types::vm_status::StatusCode;
use move_vm_runtime::native_functions::{
    make_table_from_iter, NativeContext, NativeFunction, NativeFunctionTable,
};
use move_vm_types::loaded_data::runtime_types::Type;
use move_vm_types::natives::function::NativeResult;
use move_vm_types::pop_arg;
use move_vm_types::values::{Reference, SignerRef, Value};
use smallvec::smallvec;
use txn_harness_types::address::STD_ADDRESS;

use crate::resources::{ResourceKey, ResourceRuntime};

/// Cost of one native call in meter steps.
const NATIVE_STEP: u64 = 1;

/// The full table handed to every `MoveVM` the backend creates.
pub fn build_native_function_table() -> NativeFunctionTable {
    let stdlib_gas = move_stdlib_natives::GasParameters::zeros();
    let mut table = move_stdlib_natives::all_natives(STD_ADDRESS, stdlib_gas, true);
    table.extend(make_table_from_iter(STD_ADDRESS, harness_natives()));
    table
}

fn harness_natives() -> Vec<(&'static str, &'static str, NativeFunction)> {
    vec![
        ("account", "create_signer", make_native(native_create_signer)),
        ("storage", "publish", make_native(native_publish)),
        ("storage", "remove", make_native(native_remove)),
        ("storage", "exists_at", make_native(native_exists_at)),
        ("storage", "borrow", make_native(native_borrow)),
        ("storage", "borrow_mut", make_native(native_borrow)),
    ]
}

fn make_native<F>(f: F) -> NativeFunction
where
    F: Fn(&mut NativeContext, Vec<Type>, VecDeque<Value>) -> PartialVMResult<NativeResult>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

fn bad_call() -> PartialVMError {
    PartialVMError::new(StatusCode::UNKNOWN_INVARIANT_VIOLATION_ERROR)
        .with_message("native called with unexpected arguments".to_string())
}

// =============================================================================
// account
// =============================================================================

fn native_create_signer(
    _ctx: &mut NativeContext,
    _ty_args: Vec<Type>,
    mut args: VecDeque<Value>,
) -> PartialVMResult<NativeResult> {
    let address = pop_arg!(args, AccountAddress);
    Ok(NativeResult::ok(
        InternalGas::new(NATIVE_STEP),
        smallvec![Value::signer(address)],
    ))
}

// =============================================================================
// storage
// =============================================================================

/// Resolve the single type argument of a storage native to a key and layout.
fn resource_key(
    ctx: &mut NativeContext,
    ty_args: &[Type],
    address: AccountAddress,
) -> PartialVMResult<(ResourceKey, MoveTypeLayout)> {
    let [ty] = ty_args else {
        return Err(bad_call());
    };
    let tag = ctx.type_to_type_tag(ty)?;
    let layout = ctx.type_to_type_layout(ty)?.ok_or_else(bad_call)?;
    Ok(((address, tag), layout))
}

fn native_publish(
    ctx: &mut NativeContext,
    ty_args: Vec<Type>,
    mut args: VecDeque<Value>,
) -> PartialVMResult<NativeResult> {
    let resource = args.pop_back().ok_or_else(bad_call)?;
    let account = pop_arg!(args, SignerRef);
    let address = account
        .borrow_signer()?
        .value_as::<Reference>()?
        .read_ref()?
        .value_as::<AccountAddress>()?;
    let (key, layout) = resource_key(ctx, &ty_args, address)?;
    ctx.extensions_mut()
        .get_mut::<ResourceRuntime>()?
        .publish(key, resource, layout)?;
    Ok(NativeResult::ok(InternalGas::new(NATIVE_STEP), smallvec![]))
}

fn native_remove(
    ctx: &mut NativeContext,
    ty_args: Vec<Type>,
    mut args: VecDeque<Value>,
) -> PartialVMResult<NativeResult> {
    let address = pop_arg!(args, AccountAddress);
    let (key, layout) = resource_key(ctx, &ty_args, address)?;
    let value = ctx
        .extensions_mut()
        .get_mut::<ResourceRuntime>()?
        .remove(&key, &layout)?;
    Ok(NativeResult::ok(InternalGas::new(NATIVE_STEP), smallvec![value]))
}

fn native_exists_at(
    ctx: &mut NativeContext,
    ty_args: Vec<Type>,
    mut args: VecDeque<Value>,
) -> PartialVMResult<NativeResult> {
    let address = pop_arg!(args, AccountAddress);
    let (key, layout) = resource_key(ctx, &ty_args, address)?;
    let exists = ctx
        .extensions_mut()
        .get_mut::<ResourceRuntime>()?
        .exists(&key, &layout)?;
    Ok(NativeResult::ok(
        InternalGas::new(NATIVE_STEP),
        smallvec![Value::bool(exists)],
    ))
}

/// Shared by `borrow` and `borrow_mut`; the VM types the returned reference.
fn native_borrow(
    ctx: &mut NativeContext,
    ty_args: Vec<Type>,
    mut args: VecDeque<Value>,
) -> PartialVMResult<NativeResult> {
    let address = pop_arg!(args, AccountAddress);
    let (key, layout) = resource_key(ctx, &ty_args, address)?;
    let reference = ctx
        .extensions_mut()
        .get_mut::<ResourceRuntime>()?
        .borrow(&key, &layout)?;
    Ok(NativeResult::ok(
        InternalGas::new(NATIVE_STEP),
        smallvec![reference],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_binds_every_harness_native_once() {
        let table = build_native_function_table();
        for (module, name, _) in harness_natives() {
            let count = table
                .iter()
                .filter(|(addr, m, f, _)| {
                    *addr == STD_ADDRESS && m.as_str() == module && f.as_str() == name
                })
                .count();
            assert_eq!(count, 1, "0x1::{module}::{name}");
        }
        assert!(table
            .iter()
            .any(|(_, m, f, _)| m.as_str() == "signer" && f.as_str() == "borrow_address"));
    }
}
