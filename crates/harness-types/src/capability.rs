//! Capability traits implemented by a VM backend.
//!
//! The harness never links against a particular interpreter or compiler. It is
//! generic over a [`Backend`], which combines:
//!
//! - [`Compiler`]: source text to a compiled unit (module or script)
//! - [`Vm`]: state creation, publishing, execution and resource queries
//!
//! A backend value is shared immutably across worker threads; all mutable data
//! lives in the per-script [`Vm::State`].

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::{IdentStr, Identifier};
use move_core_types::language_storage::{ModuleId, TypeTag};

use crate::outcome::Outcome;
use crate::value::{CallArg, StructTag};

// =============================================================================
// Compilation
// =============================================================================

/// Inputs to a compilation besides the source text.
#[derive(Debug, Clone, Default)]
pub struct CompileContext {
    /// Named addresses usable in source (`A::M`, `@A`).
    pub named_addresses: BTreeMap<String, AccountAddress>,
    /// Source text of every module already published in this script's state.
    pub dependencies: BTreeMap<ModuleId, String>,
}

/// A compilation failure, positioned in the text handed to the compiler.
/// Line 0 means the failure has no position in that text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// 1-based line.
    pub line: usize,
    /// 1-based column.
    pub column: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(line: usize, column: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line == 0 {
            return write!(f, "{}", self.message);
        }
        write!(f, "{}:{}: {}", self.line, self.column, self.message)
    }
}

impl std::error::Error for CompileError {}

/// What a compiled unit is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitKind {
    Module(ModuleId),
    Script,
}

/// The "compile module/script" capability.
pub trait Compiler {
    type Unit: Clone + Send;

    fn compile(&self, source: &str, ctx: &CompileContext) -> Result<Self::Unit, CompileError>;

    fn unit_kind(&self, unit: &Self::Unit) -> UnitKind;

    /// Modules referenced by `use` declarations or qualified calls.
    fn unit_dependencies(&self, unit: &Self::Unit) -> BTreeSet<ModuleId>;

    /// Deterministic textual listing of a compiled unit.
    fn disassemble(&self, unit: &Self::Unit) -> Result<String, BackendError>;
}

// =============================================================================
// Execution
// =============================================================================

/// Options for publishing a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishOptions {
    pub gas_budget: u64,
    /// Skip the upgrade compatibility check.
    pub force_publish: bool,
    /// Reject the publish if a module with the same id exists.
    pub only_new_module: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            gas_budget: crate::DEFAULT_GAS_BUDGET,
            force_publish: false,
            only_new_module: false,
        }
    }
}

/// What a `run` task invokes.
#[derive(Debug, Clone)]
pub enum ExecuteTarget<U> {
    Function {
        module: ModuleId,
        function: Identifier,
    },
    Script(U),
}

/// A transaction to execute.
#[derive(Debug, Clone)]
pub struct ExecuteRequest<U> {
    pub target: ExecuteTarget<U>,
    pub signers: Vec<AccountAddress>,
    pub type_args: Vec<TypeTag>,
    pub args: Vec<CallArg>,
    pub gas_budget: u64,
}

/// A backend failure that is not a task outcome (state creation, listings).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend error: {}", self.message)
    }
}

impl std::error::Error for BackendError {}

/// The "execute transaction" capability.
///
/// `publish` and `execute` are atomic: when they return anything other than
/// [`Outcome::Success`], `state` must be unchanged.
pub trait Vm: Compiler {
    type State: Send;

    /// Aliases the backend predeclares (`std = 0x1`).
    fn builtin_addresses(&self) -> Vec<(String, AccountAddress)>;

    /// Fresh state with the standard library installed and `accounts` created.
    fn init_state(&self, accounts: &[AccountAddress]) -> Result<Self::State, BackendError>;

    /// Every module in `state` with the source it was compiled from.
    fn published_modules(&self, state: &Self::State) -> BTreeMap<ModuleId, String>;

    fn publish(&self, state: &mut Self::State, unit: Self::Unit, options: &PublishOptions)
        -> Outcome;

    fn execute(&self, state: &mut Self::State, request: ExecuteRequest<Self::Unit>) -> Outcome;

    /// Read a resource. Never mutates `state`.
    fn query(&self, state: &Self::State, address: AccountAddress, resource: &StructTag) -> Outcome;

    /// Attributes declared on a function (`expected_failure(abort_code = 7)`),
    /// without the surrounding `#[...]`.
    fn function_annotations(
        &self,
        state: &Self::State,
        module: &ModuleId,
        function: &IdentStr,
    ) -> Vec<String>;
}

/// A VM backend that can be shared across the runner's worker pool.
pub trait Backend: Vm + Send + Sync {}

impl<T> Backend for T where T: Vm + Send + Sync {}
