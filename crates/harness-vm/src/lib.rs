//! Move VM backend for the transactional test harness.
//!
//! Implements the compiler and VM capabilities with `move-compiler` and the
//! Move VM runtime:
//!
//! - [`source`] - script wrapping and harness attributes in source text
//! - [`compiler`] - source to [`CompiledUnit`] against the published modules
//! - [`stdlib`] - the `0x1` library, compiled from embedded sources
//! - [`natives`], [`resources`] - native table and resource storage
//! - [`gas`] - step metering
//! - [`storage`] - committed state and the module store sessions load from
//! - [`convert`] - argument encoding and value decoding
//! - [`vm`] - [`ReferenceVm`], tying the pieces to the capability traits

pub mod compiler;
pub mod convert;
pub mod gas;
pub mod natives;
pub mod resources;
pub mod source;
pub mod stdlib;
pub mod storage;
pub mod vm;

pub use compiler::CompiledUnit;
pub use storage::VmState;
pub use vm::ReferenceVm;
