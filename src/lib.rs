//! Move Transactional Test Harness
//!
//! Runs scripts of `//#`-delimited tasks against a Move-style VM and checks
//! their outcomes:
//!
//! - **Directive parsing**: split a script into tasks ([`tasks`])
//! - **Symbols**: address aliases, accounts and published modules per script ([`registry`])
//! - **Execution**: dispatch each task to a VM backend ([`executor`], [`arguments`],
//!   [`type_args`])
//! - **Comparison**: render outcomes and check inline expectations and golden
//!   baselines ([`recorder`], [`annotations`])
//! - **Orchestration**: discover and run scripts in parallel ([`runner`])
//!
//! The VM is reached only through the capability traits in
//! [`txn_harness_types::capability`]; `txn_harness_vm::ReferenceVm` is the
//! backend the binary uses.

#![allow(clippy::result_large_err)]
#![allow(clippy::too_many_arguments)]

pub mod annotations;
pub mod args;
pub mod arguments;
pub mod config;
pub mod errors;
pub mod executor;
pub mod recorder;
pub mod registry;
pub mod runner;
pub mod tasks;
pub mod type_args;
