//! # ReferenceVm: the Move backend
//!
//! Implements the [`Compiler`] and [`Vm`] capabilities on top of
//! `move-compiler` and the Move VM runtime.
//!
//! ## Key Types
//!
//! - [`ReferenceVm`]: stateless backend holding the compiled standard library
//!   and the native function table
//! - [`VmState`]: everything one script has committed (modules, resources,
//!   accounts)
//!
//! ## How It Works
//!
//! 1. [`ReferenceVm::new`] compiles the embedded `0x1` sources once
//! 2. [`Vm::init_state`] seeds a fresh [`VmState`] with those modules
//! 3. each publish or execute runs one VM session over a [`ModuleStore`]
//!    with a [`ResourceRuntime`] extension; resource changes reach the state
//!    only when the session succeeds
//!
//! A new `MoveVM` is created for every session, so a module republished in
//! one task is never served from the loader cache of an earlier one.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use move_binary_format::errors::{Location, VMError};
use move_binary_format::file_format::{FunctionHandle, StructFieldInformation, Visibility};
use move_binary_format::CompiledModule;
use move_command_line_common::files::FileHash;
use move_core_types::account_address::AccountAddress;
use move_core_types::annotated_value::MoveTypeLayout;
use move_core_types::ident_str;
use move_core_types::identifier::{IdentStr, Identifier};
use move_core_types::language_storage::{ModuleId, TypeTag};
use move_core_types::vm_status::{StatusCode, StatusType};
use move_disassembler::disassembler::Disassembler;
use move_ir_types::location::Loc;
use move_vm_runtime::move_vm::MoveVM;
use move_vm_runtime::native_extensions::NativeContextExtensions;
use move_vm_runtime::native_functions::NativeFunctionTable;
use parking_lot::Mutex;
use tracing::{debug, trace};
use txn_harness_types::address::{format_address, format_module_id, STD_ADDRESS};
use txn_harness_types::value::format_type_tag;
use txn_harness_types::{
    BackendError, CallArg, CompileContext, CompileError, Compiler, ErrorKind, ExecuteRequest,
    ExecuteTarget, MoveValue, Outcome, PublishOptions, StructTag, SuccessValue, UnitKind, Vm,
};

use crate::compiler::{compile_unit, CompiledUnit};
use crate::convert::{
    decode_value, describe_token, encode_arg, encode_signer, is_signer_param, signature_to_tag,
    TypeResolver,
};
use crate::gas::{StepGasMeter, PUBLISH_COST_PER_FUNCTION};
use crate::natives::build_native_function_table;
use crate::resources::{ResourceChanges, ResourceKey, ResourceRuntime};
use crate::source::{function_attributes, SCRIPT_ADDRESS};
use crate::stdlib::{compile_stdlib, StdlibModule};
use crate::storage::{ModuleStore, PublishedModule, VmState};

/// Function run once when a module is first published.
const INIT_MODULE: &IdentStr = ident_str!("init_module");

/// Where vector natives report their failures.
const VECTOR_LOCATION: &str = "0x1::vector";

/// Location shown for aborts raised by a script.
const SCRIPT_LOCATION: &str = "script";

pub struct ReferenceVm {
    stdlib: BTreeMap<ModuleId, StdlibModule>,
    natives: NativeFunctionTable,
}

/// A function call prepared for a session.
struct Call<'a> {
    module: &'a ModuleId,
    function: &'a IdentStr,
    ty_args: &'a [TypeTag],
    args: Vec<Vec<u8>>,
}

struct SessionOutput {
    return_values: Vec<Vec<u8>>,
    writes: BTreeMap<ResourceKey, Option<Vec<u8>>>,
}

impl ReferenceVm {
    /// Build the backend, compiling the standard library.
    pub fn new() -> Result<Self, BackendError> {
        let stdlib = compile_stdlib()?;
        let natives = build_native_function_table();
        debug!(
            modules = stdlib.len(),
            natives = natives.len(),
            "reference VM ready"
        );
        Ok(Self { stdlib, natives })
    }

    pub fn stdlib_modules(&self) -> impl Iterator<Item = &ModuleId> {
        self.stdlib.keys()
    }

    /// Run one call in a fresh session and collect its resource changes.
    ///
    /// `overlay` serves a module that is not (yet) in the state: the module
    /// being published or a script.
    fn run_session(
        &self,
        state: &VmState,
        overlay: Option<(ModuleId, &[u8])>,
        call: Call<'_>,
        gas_budget: u64,
    ) -> Result<SessionOutput, Outcome> {
        let vm = MoveVM::new(self.natives.clone()).map_err(|e| {
            Outcome::error(
                ErrorKind::Runtime,
                format!("failed to create VM: {:?}", e.major_status()),
            )
        })?;
        let store = match overlay {
            Some((id, bytes)) => ModuleStore::new(&state.modules).with_overlay(id, bytes),
            None => ModuleStore::new(&state.modules),
        };

        let changes = Arc::new(Mutex::new(ResourceChanges::default()));
        let mut extensions = NativeContextExtensions::default();
        extensions.add(ResourceRuntime::new(
            Arc::new(state.resources.clone()),
            changes.clone(),
        ));

        let mut session = vm.new_session_with_extensions(&store, extensions);
        let mut loaded_ty_args = Vec::with_capacity(call.ty_args.len());
        for tag in call.ty_args {
            match session.load_type(tag) {
                Ok(ty) => loaded_ty_args.push(ty),
                Err(e) => {
                    return Err(Outcome::error(
                        ErrorKind::Linker,
                        format!(
                            "type argument {} could not be loaded: {:?}",
                            format_type_tag(tag),
                            e.major_status()
                        ),
                    ))
                }
            }
        }

        let mut gas_meter = StepGasMeter::new(gas_budget);
        let result = session.execute_function_bypass_visibility(
            call.module,
            call.function,
            loaded_ty_args,
            call.args,
            &mut gas_meter,
            None,
        );
        let (finished, _store) = session.finish();
        trace!(
            function = %call.function,
            gas_used = gas_meter.gas_consumed(),
            "session finished"
        );

        let returned = result.map_err(|e| vm_error_outcome(&e))?;
        finished.map_err(|e| vm_error_outcome(&e))?;

        let mut changes = std::mem::take(&mut *changes.lock());
        if let Some(message) = changes.error.take() {
            return Err(Outcome::error(ErrorKind::Runtime, message));
        }
        Ok(SessionOutput {
            return_values: returned
                .return_values
                .into_iter()
                .map(|(bytes, _layout)| bytes)
                .collect(),
            writes: changes.writes,
        })
    }

    /// Execute `function` of `module` and commit its changes on success.
    #[allow(clippy::too_many_arguments)]
    fn run(
        &self,
        state: &mut VmState,
        module: &CompiledModule,
        overlay: Option<&[u8]>,
        function: &IdentStr,
        signers: &[AccountAddress],
        type_args: &[TypeTag],
        args: &[CallArg],
        gas_budget: u64,
    ) -> Outcome {
        let id = module.self_id();
        let (writes, outcome) = {
            let mut resolver = TypeResolver::new(&state.modules);
            if overlay.is_some() {
                resolver = resolver.with_module(module);
            }
            let (encoded, return_layouts) =
                match prepare_call(&resolver, module, function, signers, type_args, args) {
                    Ok(prepared) => prepared,
                    Err(outcome) => return outcome,
                };
            let call = Call {
                module: &id,
                function,
                ty_args: type_args,
                args: encoded,
            };
            let overlay = overlay.map(|bytes| (id.clone(), bytes));
            let output = match self.run_session(state, overlay, call, gas_budget) {
                Ok(output) => output,
                Err(outcome) => return outcome,
            };
            match decode_returns(&output.return_values, &return_layouts) {
                Ok(values) if values.is_empty() => (output.writes, Outcome::unit()),
                Ok(values) => (
                    output.writes,
                    Outcome::Success(SuccessValue::Returned(values)),
                ),
                Err(message) => return Outcome::error(ErrorKind::Runtime, message),
            }
        };
        state.apply(writes);
        state.accounts.extend(signers.iter().copied());
        outcome
    }
}

// =============================================================================
// Capabilities
// =============================================================================

impl Compiler for ReferenceVm {
    type Unit = CompiledUnit;

    fn compile(&self, source: &str, ctx: &CompileContext) -> Result<CompiledUnit, CompileError> {
        compile_unit(source, ctx)
    }

    fn unit_kind(&self, unit: &CompiledUnit) -> UnitKind {
        if unit.is_script() {
            UnitKind::Script
        } else {
            UnitKind::Module(unit.id())
        }
    }

    fn unit_dependencies(&self, unit: &CompiledUnit) -> BTreeSet<ModuleId> {
        unit.module.immediate_dependencies().into_iter().collect()
    }

    fn disassemble(&self, unit: &CompiledUnit) -> Result<String, BackendError> {
        let disassembler = Disassembler::from_module(&unit.module, Loc::new(FileHash::empty(), 0, 0))
            .map_err(|e| BackendError::new(format!("failed to create disassembler: {e:#}")))?;
        disassembler
            .disassemble()
            .map_err(|e| BackendError::new(format!("disassembly failed: {e:#}")))
    }
}

impl Vm for ReferenceVm {
    type State = VmState;

    fn builtin_addresses(&self) -> Vec<(String, AccountAddress)> {
        vec![("std".to_string(), STD_ADDRESS)]
    }

    fn init_state(&self, accounts: &[AccountAddress]) -> Result<VmState, BackendError> {
        let mut state = VmState::default();
        for (id, m) in &self.stdlib {
            state.modules.insert(
                id.clone(),
                PublishedModule {
                    source: m.source.to_string(),
                    module: m.module.clone(),
                    bytes: m.bytes.clone(),
                },
            );
        }
        state.accounts.insert(STD_ADDRESS);
        state.accounts.extend(accounts.iter().copied());
        Ok(state)
    }

    fn published_modules(&self, state: &VmState) -> BTreeMap<ModuleId, String> {
        state
            .modules
            .iter()
            .map(|(id, m)| (id.clone(), m.source.clone()))
            .collect()
    }

    fn publish(
        &self,
        state: &mut VmState,
        unit: CompiledUnit,
        options: &PublishOptions,
    ) -> Outcome {
        if unit.is_script() {
            return Outcome::error(ErrorKind::Compile, "expected a module, found a script");
        }
        let id = unit.id();
        let name = format_module_id(&id);
        let is_upgrade = state.modules.contains_key(&id);

        if let Some(old) = state.modules.get(&id) {
            if options.only_new_module {
                return Outcome::error(
                    ErrorKind::Verification,
                    format!("module {} already exists", name),
                );
            }
            if !options.force_publish {
                if let Err(reason) = check_compatible(&old.module, &unit.module) {
                    return Outcome::error(
                        ErrorKind::Verification,
                        format!("incompatible upgrade of {}: {}", name, reason),
                    );
                }
            }
        }

        let mut meter = StepGasMeter::new(options.gas_budget);
        let cost = PUBLISH_COST_PER_FUNCTION.saturating_mul(unit.module.function_defs.len() as u64);
        if meter.charge(cost).is_err() {
            return Outcome::error(ErrorKind::OutOfGas, format!("out of gas publishing {}", name));
        }

        // init_module runs against the new module, which also loads and
        // verifies it; its resource changes commit with the publish.
        let has_init = find_function(&unit.module, INIT_MODULE).is_some();
        let writes = if !is_upgrade && has_init {
            let Some(signer) = encode_signer(*id.address()) else {
                return Outcome::error(ErrorKind::Runtime, "signer could not be serialized");
            };
            let call = Call {
                module: &id,
                function: INIT_MODULE,
                ty_args: &[],
                args: vec![signer],
            };
            let remaining = options.gas_budget.saturating_sub(meter.gas_consumed());
            match self.run_session(state, Some((id.clone(), &unit.bytes)), call, remaining) {
                Ok(output) => output.writes,
                Err(outcome) => return outcome,
            }
        } else {
            BTreeMap::new()
        };

        debug!(module = %name, upgrade = is_upgrade, "published module");
        state.accounts.insert(*id.address());
        state.modules.insert(
            id,
            PublishedModule {
                source: unit.source,
                module: unit.module,
                bytes: unit.bytes,
            },
        );
        state.apply(writes);
        Outcome::unit()
    }

    fn execute(&self, state: &mut VmState, request: ExecuteRequest<CompiledUnit>) -> Outcome {
        let ExecuteRequest {
            target,
            signers,
            type_args,
            args,
            gas_budget,
        } = request;
        match target {
            ExecuteTarget::Function { module, function } => {
                let Some(published) = state.modules.get(&module) else {
                    return Outcome::error(
                        ErrorKind::Linker,
                        format!("module {} not found", format_module_id(&module)),
                    );
                };
                let compiled = published.module.clone();
                self.run(
                    state,
                    &compiled,
                    None,
                    &function,
                    &signers,
                    &type_args,
                    &args,
                    gas_budget,
                )
            }
            ExecuteTarget::Script(unit) => {
                let Some(entry) = unit.script_entry.clone() else {
                    return Outcome::error(
                        ErrorKind::InvalidArgument,
                        format!(
                            "expected a script, found module {}",
                            format_module_id(&unit.id())
                        ),
                    );
                };
                self.run(
                    state,
                    &unit.module,
                    Some(&unit.bytes),
                    &entry,
                    &signers,
                    &type_args,
                    &args,
                    gas_budget,
                )
            }
        }
    }

    fn query(&self, state: &VmState, address: AccountAddress, resource: &StructTag) -> Outcome {
        let tag = TypeTag::Struct(Box::new(resource.to_language_tag()));
        let Some(bytes) = state.resources.get(&(address, tag.clone())) else {
            return Outcome::error(
                ErrorKind::ResourceNotFound,
                format!(
                    "resource {} not found at {}",
                    resource,
                    format_address(&address)
                ),
            );
        };
        let decoded = TypeResolver::new(&state.modules)
            .layout(&tag)
            .and_then(|layout| decode_value(bytes, &layout));
        match decoded {
            Ok(value) => Outcome::Success(SuccessValue::Resource(value)),
            Err(message) => Outcome::error(ErrorKind::Runtime, message),
        }
    }

    fn function_annotations(
        &self,
        state: &VmState,
        module: &ModuleId,
        function: &IdentStr,
    ) -> Vec<String> {
        state
            .modules
            .get(module)
            .map(|m| function_attributes(&m.source, function.as_str()))
            .unwrap_or_default()
    }
}

// =============================================================================
// Calls
// =============================================================================

fn find_function<'m>(module: &'m CompiledModule, name: &IdentStr) -> Option<&'m FunctionHandle> {
    module
        .function_defs
        .iter()
        .map(|def| module.function_handle_at(def.function))
        .find(|handle| module.identifier_at(handle.name) == name)
}

/// Check signers, type arguments and arguments against the function's
/// signature. Returns the serialized arguments and the return layouts.
fn prepare_call(
    resolver: &TypeResolver<'_>,
    module: &CompiledModule,
    function: &IdentStr,
    signers: &[AccountAddress],
    type_args: &[TypeTag],
    args: &[CallArg],
) -> Result<(Vec<Vec<u8>>, Vec<MoveTypeLayout>), Outcome> {
    let Some(handle) = find_function(module, function) else {
        return Err(Outcome::error(
            ErrorKind::Linker,
            format!(
                "function {} not found in {}",
                function,
                format_module_id(&module.self_id())
            ),
        ));
    };
    let invalid = |message: String| Outcome::error(ErrorKind::InvalidArgument, message);

    if type_args.len() != handle.type_parameters.len() {
        return Err(invalid(format!(
            "function '{}' expects {} type argument(s), got {}",
            function,
            handle.type_parameters.len(),
            type_args.len()
        )));
    }

    for tag in type_args {
        if let Err(message) = resolver.layout(tag) {
            return Err(Outcome::error(
                ErrorKind::Linker,
                format!(
                    "type argument {} could not be loaded: {}",
                    format_type_tag(tag),
                    message
                ),
            ));
        }
    }

    let params = &module.signature_at(handle.parameters).0;
    let signer_count = params.iter().take_while(|p| is_signer_param(p)).count();
    if signers.len() != signer_count {
        return Err(invalid(format!(
            "function '{}' expects {} signer(s), got {}",
            function,
            signer_count,
            signers.len()
        )));
    }
    let value_params = &params[signer_count..];
    if args.len() != value_params.len() {
        return Err(invalid(format!(
            "function '{}' expects {} argument(s), got {}",
            function,
            value_params.len(),
            args.len()
        )));
    }

    let mut encoded = Vec::with_capacity(params.len());
    for signer in signers {
        let bytes = encode_signer(*signer)
            .ok_or_else(|| invalid("signer could not be serialized".to_string()))?;
        encoded.push(bytes);
    }
    for (i, (token, arg)) in value_params.iter().zip(args).enumerate() {
        let tag = signature_to_tag(module, token, type_args).ok_or_else(|| {
            invalid(format!("argument #{} has an unresolved type parameter", i + 1))
        })?;
        let layout = resolver.layout(&tag).map_err(invalid)?;
        let bytes = encode_arg(arg, &layout).ok_or_else(|| {
            invalid(format!(
                "argument #{} expects {}, got {}",
                i + 1,
                format_type_tag(&tag),
                arg
            ))
        })?;
        encoded.push(bytes);
    }

    let return_layouts = module
        .signature_at(handle.return_)
        .0
        .iter()
        .map(|token| {
            let tag = signature_to_tag(module, token, type_args)
                .ok_or_else(|| "return type has an unresolved type parameter".to_string())?;
            resolver.layout(&tag)
        })
        .collect::<Result<Vec<_>, String>>()
        .map_err(|message| Outcome::error(ErrorKind::Runtime, message))?;

    Ok((encoded, return_layouts))
}

fn decode_returns(values: &[Vec<u8>], layouts: &[MoveTypeLayout]) -> Result<Vec<MoveValue>, String> {
    if values.len() != layouts.len() {
        return Err(format!(
            "expected {} return value(s), got {}",
            layouts.len(),
            values.len()
        ));
    }
    values
        .iter()
        .zip(layouts)
        .map(|(bytes, layout)| decode_value(bytes, layout))
        .collect()
}

// =============================================================================
// Errors
// =============================================================================

fn render_location(location: &Location) -> Option<String> {
    match location {
        Location::Module(id) if *id.address() == SCRIPT_ADDRESS => {
            Some(SCRIPT_LOCATION.to_string())
        }
        Location::Module(id) => Some(format_module_id(id)),
        Location::Undefined => None,
    }
}

/// Map a VM failure to a task outcome.
fn vm_error_outcome(error: &VMError) -> Outcome {
    let status = error.major_status();
    let location = render_location(error.location());
    let describe = || match (error.message(), &location) {
        (Some(message), _) => message.clone(),
        (None, Some(loc)) => format!("{:?} in {}", status, loc),
        (None, None) => format!("{:?}", status),
    };
    // Arithmetic and gas failures carry VM-internal wording; report only
    // where they happened.
    let located = |what: &str| match &location {
        Some(loc) => format!("{} in {}", what, loc),
        None => what.to_string(),
    };

    match status {
        StatusCode::ABORTED => Outcome::abort(error.sub_status().unwrap_or(0), location),
        StatusCode::VECTOR_OPERATION_ERROR => Outcome::abort(
            error.sub_status().unwrap_or(0),
            Some(VECTOR_LOCATION.to_string()),
        ),
        StatusCode::ARITHMETIC_ERROR => {
            Outcome::error(ErrorKind::Arithmetic, located("arithmetic error"))
        }
        StatusCode::OUT_OF_GAS => Outcome::error(ErrorKind::OutOfGas, located("out of gas")),
        StatusCode::MISSING_DATA => Outcome::error(ErrorKind::ResourceNotFound, describe()),
        StatusCode::LINKER_ERROR
        | StatusCode::FUNCTION_RESOLUTION_FAILURE
        | StatusCode::TYPE_RESOLUTION_FAILURE
        | StatusCode::MISSING_DEPENDENCY => Outcome::error(ErrorKind::Linker, describe()),
        _ => match status.status_type() {
            StatusType::Verification | StatusType::Deserialization => {
                Outcome::error(ErrorKind::Verification, describe())
            }
            _ => Outcome::error(ErrorKind::Runtime, describe()),
        },
    }
}

// =============================================================================
// Upgrades
// =============================================================================

#[derive(Debug, PartialEq, Eq)]
struct FunctionShape {
    public: bool,
    type_params: usize,
    params: Vec<String>,
    returns: Vec<String>,
}

#[derive(Debug, PartialEq, Eq)]
struct StructShape {
    abilities: String,
    type_params: usize,
    fields: Vec<(String, String)>,
}

fn function_shapes(module: &CompiledModule) -> BTreeMap<Identifier, FunctionShape> {
    module
        .function_defs
        .iter()
        .map(|def| {
            let handle = module.function_handle_at(def.function);
            let describe = |idx| {
                module
                    .signature_at(idx)
                    .0
                    .iter()
                    .map(|t| describe_token(module, t))
                    .collect::<Vec<_>>()
            };
            let shape = FunctionShape {
                public: def.visibility != Visibility::Private || def.is_entry,
                type_params: handle.type_parameters.len(),
                params: describe(handle.parameters),
                returns: describe(handle.return_),
            };
            (module.identifier_at(handle.name).to_owned(), shape)
        })
        .collect()
}

fn struct_shapes(module: &CompiledModule) -> BTreeMap<Identifier, StructShape> {
    module
        .struct_defs
        .iter()
        .map(|def| {
            let handle = module.datatype_handle_at(def.struct_handle);
            let fields = match &def.field_information {
                StructFieldInformation::Declared(fields) => fields
                    .iter()
                    .map(|f| {
                        (
                            module.identifier_at(f.name).to_string(),
                            describe_token(module, &f.signature.0),
                        )
                    })
                    .collect(),
                StructFieldInformation::Native => Vec::new(),
            };
            let shape = StructShape {
                abilities: format!("{:?}", handle.abilities),
                type_params: handle.type_parameters.len(),
                fields,
            };
            (module.identifier_at(handle.name).to_owned(), shape)
        })
        .collect()
}

/// Upgrade compatibility: public functions keep their signatures and struct
/// layouts are unchanged. New functions and structs may be added.
fn check_compatible(old: &CompiledModule, new: &CompiledModule) -> Result<(), String> {
    let new_functions = function_shapes(new);
    for (name, shape) in function_shapes(old).into_iter().filter(|(_, s)| s.public) {
        match new_functions.get(&name) {
            Some(new_shape) if *new_shape == shape => {}
            Some(_) => return Err(format!("public function '{}' changed signature", name)),
            None => return Err(format!("public function '{}' was removed", name)),
        }
    }
    let new_structs = struct_shapes(new);
    for (name, shape) in struct_shapes(old) {
        match new_structs.get(&name) {
            Some(new_shape) if *new_shape == shape => {}
            Some(_) => return Err(format!("struct '{}' changed layout", name)),
            None => return Err(format!("struct '{}' was removed", name)),
        }
    }
    Ok(())
}
