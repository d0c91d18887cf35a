//! Task dispatch: one [`Task`] against the script's VM state and registry.
//!
//! Task-level problems (compile errors, bad arguments, aborts) come back as
//! [`Outcome`]s. Only problems that make the rest of the script meaningless
//! (missing `init`, unknown aliases, a failed `init`) are [`ScriptError`]s.

use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::{ModuleId, TypeTag};
use tracing::{debug, warn};
use txn_harness_types::address::format_module_id;
use txn_harness_types::{
    Backend, ErrorKind, ExecuteRequest, ExecuteTarget, Outcome, PublishOptions, SuccessValue,
    UnitKind,
};

use crate::annotations::{expectation_from, Expectation};
use crate::arguments::parse_argument;
use crate::errors::{ArgumentError, ParseError, RegistryError, ScriptError};
use crate::registry::{Registry, SymbolKind};
use crate::type_args::{parse_struct_type, parse_type_arg};
use crate::tasks::{
    InitCommand, PrintBytecodeCommand, PublishCommand, RunCommand, Task, TaskCommand, UnitInput,
    ViewCommand,
};

/// What a task produced and what it was expected to produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResult {
    pub outcome: Outcome,
    pub expectation: Expectation,
}

/// Runs the tasks of one script in order. Owns the script's state.
pub struct TaskExecutor<'b, B: Backend> {
    backend: &'b B,
    registry: Registry,
    state: Option<B::State>,
    default_gas_budget: u64,
}

impl<'b, B: Backend> TaskExecutor<'b, B> {
    pub fn new(backend: &'b B, default_gas_budget: u64) -> Self {
        Self {
            backend,
            registry: Registry::new(),
            state: None,
            default_gas_budget,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn is_initialized(&self) -> bool {
        self.state.is_some()
    }

    pub fn execute(&mut self, task: &Task) -> Result<TaskResult, ScriptError> {
        debug!(task = task.number, name = %task.name, line = task.start_line, "executing task");
        let annotated = expectation_from(&task.annotations)
            .map_err(|m| ScriptError::Parse(ParseError::new(task.start_line, 1, m)))?;

        if let TaskCommand::Init(cmd) = &task.command {
            self.init(task, cmd)?;
            return Ok(TaskResult {
                outcome: Outcome::unit(),
                expectation: annotated.unwrap_or(Expectation::Success),
            });
        }
        if self.state.is_none() {
            return Err(ScriptError::MissingInit { task: task.number });
        }

        let (outcome, inferred) = match &task.command {
            TaskCommand::Init(_) => return Err(ScriptError::DuplicateInit { task: task.number }),
            TaskCommand::Publish(cmd) => (self.publish(task, cmd), None),
            TaskCommand::Run(cmd) => self.run(task, cmd, annotated.is_none())?,
            TaskCommand::View(cmd) => (self.view(task, cmd)?, None),
            TaskCommand::PrintBytecode(cmd) => (self.print_bytecode(task, cmd), None),
        };
        let expectation = annotated.or(inferred).unwrap_or(Expectation::Success);
        debug!(task = task.number, outcome = %outcome.label(), %expectation, "task finished");
        Ok(TaskResult {
            outcome,
            expectation,
        })
    }

    // =========================================================================
    // Directives
    // =========================================================================

    fn init(&mut self, task: &Task, cmd: &InitCommand) -> Result<(), ScriptError> {
        if self.state.is_some() {
            return Err(ScriptError::DuplicateInit { task: task.number });
        }
        let registry_error = |error| ScriptError::Registry {
            task: task.number,
            error,
        };

        for (alias, address) in self.backend.builtin_addresses() {
            self.registry
                .declare(&alias, SymbolKind::Builtin, address)
                .map_err(registry_error)?;
        }
        for (alias, value) in &cmd.addresses {
            self.registry
                .declare_named_address(alias, value)
                .map_err(registry_error)?;
        }
        for name in &cmd.accounts {
            self.registry
                .declare_account(name)
                .map_err(registry_error)?;
        }

        let state = self
            .backend
            .init_state(&self.registry.accounts())
            .map_err(|e| ScriptError::InitFailed {
                task: task.number,
                message: e.message,
            })?;
        self.state = Some(state);
        Ok(())
    }

    fn publish(&mut self, task: &Task, cmd: &PublishCommand) -> Outcome {
        let backend = self.backend;
        let Some(state) = self.state.as_mut() else {
            return missing_state();
        };
        let Some(body) = task.body.as_deref() else {
            return Outcome::error(ErrorKind::Compile, "publish requires a module in the task body");
        };

        let ctx = self.registry.compile_context(backend.published_modules(state));
        let unit = match backend.compile(body, &ctx) {
            Ok(unit) => unit,
            Err(e) => return Outcome::error(ErrorKind::Compile, e.to_string()),
        };
        let id = match backend.unit_kind(&unit) {
            UnitKind::Module(id) => id,
            UnitKind::Script => {
                return Outcome::error(ErrorKind::Compile, "expected a module, found a script")
            }
        };
        let uses = backend.unit_dependencies(&unit);

        let options = PublishOptions {
            gas_budget: cmd.gas_budget.unwrap_or(self.default_gas_budget),
            force_publish: cmd.force_publish,
            only_new_module: cmd.only_new_module,
        };
        let outcome = backend.publish(state, unit, &options);
        if outcome.is_success() {
            if options.force_publish {
                for dependent in self.registry.dependents(&id) {
                    warn!(
                        module = %format_module_id(&id),
                        dependent = %format_module_id(dependent),
                        "forced upgrade may break a dependent module"
                    );
                }
            }
            self.registry.record_module(id, uses);
        }
        outcome
    }

    fn run(
        &mut self,
        task: &Task,
        cmd: &RunCommand,
        infer_expectation: bool,
    ) -> Result<(Outcome, Option<Expectation>), ScriptError> {
        let backend = self.backend;
        let registry_error = |error| ScriptError::Registry {
            task: task.number,
            error,
        };
        let Some(state) = self.state.as_mut() else {
            return Ok((missing_state(), None));
        };

        let target = match &cmd.name {
            Some(name) => {
                let (address, module, function) = match split_qualified(name) {
                    Some(parts) => parts,
                    None => {
                        return Ok((
                            Outcome::error(
                                ErrorKind::InvalidArgument,
                                format!("expected ADDRESS::MODULE::FUNCTION, found '{}'", name),
                            ),
                            None,
                        ))
                    }
                };
                let address = self
                    .registry
                    .resolve_address(address)
                    .map_err(registry_error)?;
                match (Identifier::new(module), Identifier::new(function)) {
                    (Ok(module), Ok(function)) => ExecuteTarget::Function {
                        module: ModuleId::new(address, module),
                        function,
                    },
                    _ => {
                        return Ok((
                            Outcome::error(
                                ErrorKind::InvalidArgument,
                                format!("'{}' is not a valid function name", name),
                            ),
                            None,
                        ))
                    }
                }
            }
            None => {
                let Some(body) = task.body.as_deref() else {
                    return Ok((
                        Outcome::error(
                            ErrorKind::InvalidArgument,
                            "run requires a function name or a script in the task body",
                        ),
                        None,
                    ));
                };
                let ctx = self.registry.compile_context(backend.published_modules(state));
                let unit = match backend.compile(body, &ctx) {
                    Ok(unit) => unit,
                    Err(e) => return Ok((Outcome::error(ErrorKind::Compile, e.to_string()), None)),
                };
                if let UnitKind::Module(_) = backend.unit_kind(&unit) {
                    return Ok((
                        Outcome::error(ErrorKind::Compile, "expected a script, found a module"),
                        None,
                    ));
                }
                ExecuteTarget::Script(unit)
            }
        };

        let inferred = match (&target, infer_expectation) {
            (ExecuteTarget::Function { module, function }, true) => {
                let annotations = backend.function_annotations(state, module, function);
                expectation_from(&annotations)
                    .map_err(|m| ScriptError::Parse(ParseError::new(task.start_line, 1, m)))?
            }
            _ => None,
        };

        let signers = cmd
            .signers
            .iter()
            .map(|s| self.registry.resolve_address(s))
            .collect::<Result<Vec<AccountAddress>, RegistryError>>()
            .map_err(registry_error)?;

        let registry = &self.registry;
        let resolve = |name: &str| registry.resolve_address(name);
        let mut type_args: Vec<TypeTag> = Vec::with_capacity(cmd.type_args.len());
        for token in &cmd.type_args {
            match parse_type_arg(token, &resolve) {
                Ok(tag) => type_args.push(tag),
                Err(ArgumentError::Registry(error)) => return Err(registry_error(error)),
                Err(e) => {
                    return Ok((
                        Outcome::error(ErrorKind::InvalidArgument, e.to_string()),
                        inferred,
                    ))
                }
            }
        }
        let mut args = Vec::with_capacity(cmd.args.len());
        for token in &cmd.args {
            match parse_argument(token, &resolve) {
                Ok(value) => args.push(value),
                Err(ArgumentError::Registry(error)) => return Err(registry_error(error)),
                Err(e) => {
                    return Ok((
                        Outcome::error(ErrorKind::InvalidArgument, e.to_string()),
                        inferred,
                    ))
                }
            }
        }

        let request = ExecuteRequest {
            target,
            signers,
            type_args,
            args,
            gas_budget: cmd.gas_budget.unwrap_or(self.default_gas_budget),
        };
        Ok((backend.execute(state, request), inferred))
    }

    fn view(&self, task: &Task, cmd: &ViewCommand) -> Result<Outcome, ScriptError> {
        let registry_error = |error| ScriptError::Registry {
            task: task.number,
            error,
        };
        let Some(state) = self.state.as_ref() else {
            return Ok(missing_state());
        };

        let address = self
            .registry
            .resolve_address(&cmd.address)
            .map_err(registry_error)?;
        let registry = &self.registry;
        let resolve = |name: &str| registry.resolve_address(name);
        let tag = match parse_struct_type(&cmd.resource, &resolve) {
            Ok(tag) => tag,
            Err(ArgumentError::Registry(error)) => return Err(registry_error(error)),
            Err(e) => {
                return Ok(Outcome::error(ErrorKind::InvalidArgument, e.to_string()))
            }
        };
        Ok(self.backend.query(state, address, &tag))
    }

    fn print_bytecode(&self, task: &Task, cmd: &PrintBytecodeCommand) -> Outcome {
        let Some(state) = self.state.as_ref() else {
            return missing_state();
        };
        let Some(body) = task.body.as_deref() else {
            return Outcome::error(ErrorKind::Compile, "print-bytecode requires a task body");
        };

        let ctx = self
            .registry
            .compile_context(self.backend.published_modules(state));
        let unit = match self.backend.compile(body, &ctx) {
            Ok(unit) => unit,
            Err(e) => return Outcome::error(ErrorKind::Compile, e.to_string()),
        };
        match (cmd.input, self.backend.unit_kind(&unit)) {
            (UnitInput::Module, UnitKind::Script) => {
                Outcome::error(ErrorKind::Compile, "expected a module, found a script")
            }
            (UnitInput::Script, UnitKind::Module(_)) => {
                Outcome::error(ErrorKind::Compile, "expected a script, found a module")
            }
            _ => match self.backend.disassemble(&unit) {
                Ok(listing) => Outcome::Success(SuccessValue::Listing(listing)),
                Err(e) => Outcome::error(ErrorKind::Runtime, e.message),
            },
        }
    }
}

fn missing_state() -> Outcome {
    Outcome::error(ErrorKind::Runtime, "no VM state; the script has no 'init' task")
}

/// `A::M::f` to its three parts.
fn split_qualified(name: &str) -> Option<(&str, &str, &str)> {
    let mut parts = name.trim().split("::");
    let address = parts.next()?;
    let module = parts.next()?;
    let member = parts.next()?;
    if parts.next().is_some() || address.is_empty() || module.is_empty() || member.is_empty() {
        return None;
    }
    Some((address, module, member))
}
