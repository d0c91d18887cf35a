//! Shared types for the move-txn-harness workspace.
//!
//! This crate holds the vocabulary spoken between the harness and a VM backend,
//! so neither side depends on the other:
//!
//! - [`address`] - address literal parsing and formatting
//! - [`value`] - [`MoveValue`](value::MoveValue) and its canonical rendering
//! - [`outcome`] - [`Outcome`](outcome::Outcome) and [`ErrorKind`](outcome::ErrorKind)
//! - [`capability`] - the [`Compiler`](capability::Compiler) and [`Vm`](capability::Vm) traits
//! - [`env_utils`] - environment variable helpers

pub mod address;
pub mod capability;
pub mod env_utils;
pub mod outcome;
pub mod value;

// Re-export commonly used types at crate root
pub use capability::{
    Backend, BackendError, CompileContext, CompileError, Compiler, ExecuteRequest, ExecuteTarget,
    PublishOptions, UnitKind, Vm,
};
pub use outcome::{ErrorKind, Outcome, SuccessValue};
pub use value::{CallArg, MoveStruct, MoveValue, StructTag};

/// Default gas budget for a transaction when the task does not give one.
pub const DEFAULT_GAS_BUDGET: u64 = 1_000_000;
