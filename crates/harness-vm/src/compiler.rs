//! Driver for `move-compiler`.
//!
//! Every compilation writes the unit and the sources of the modules it can
//! reach into a scratch directory, builds them with the published modules as
//! dependencies, and keeps only the compiled target. Diagnostics are rendered
//! by the compiler and reduced to the first error with its position.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::OnceLock;

use move_binary_format::CompiledModule;
use move_compiler::diagnostics::report_diagnostics_to_buffer;
use move_compiler::shared::{NumberFormat, NumericalAddress};
use move_compiler::{Compiler as MoveCompiler, Flags};
use move_core_types::account_address::AccountAddress;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::ModuleId;
use regex::Regex;
use tracing::trace;
use txn_harness_types::address::parse_address_literal;
use txn_harness_types::{CompileContext, CompileError};

use crate::source::{hide_harness_attributes, is_script, wrap_script};

/// File name of the unit being compiled inside the scratch directory.
const TARGET_FILE: &str = "unit.move";

/// A compiled module or script, ready to publish or execute.
#[derive(Debug, Clone)]
pub struct CompiledUnit {
    /// Text as written in the task body.
    pub source: String,
    pub module: CompiledModule,
    /// Serialized form of `module`, as handed to the VM.
    pub bytes: Vec<u8>,
    /// The function a script runs; `None` for modules.
    pub script_entry: Option<Identifier>,
}

impl CompiledUnit {
    pub fn is_script(&self) -> bool {
        self.script_entry.is_some()
    }

    pub fn id(&self) -> ModuleId {
        self.module.self_id()
    }
}

/// Compile a task body against the modules in `ctx`.
pub fn compile_unit(source: &str, ctx: &CompileContext) -> Result<CompiledUnit, CompileError> {
    let script = is_script(source);
    let text = match script.then(|| wrap_script(source)).flatten() {
        Some(wrapped) => hide_harness_attributes(&wrapped),
        None => hide_harness_attributes(source),
    };

    let deps = dependency_closure(&text, &ctx.dependencies, &ctx.named_addresses);
    let mut modules = build_modules(&[(TARGET_FILE, text.as_str())], &deps, &ctx.named_addresses)?;
    if modules.len() != 1 {
        return Err(CompileError::new(
            0,
            0,
            format!("expected exactly one module in the unit, found {}", modules.len()),
        ));
    }
    let module = modules.remove(0);
    let script_entry = if script {
        Some(script_entry(&module)?)
    } else {
        None
    };
    let bytes = serialize_module(&module)?;
    Ok(CompiledUnit {
        source: source.to_string(),
        module,
        bytes,
        script_entry,
    })
}

/// Serialize a module at the bytecode version it was compiled for.
pub fn serialize_module(module: &CompiledModule) -> Result<Vec<u8>, CompileError> {
    let mut bytes = Vec::new();
    module
        .serialize_with_version(module.version, &mut bytes)
        .map_err(|e| CompileError::new(0, 0, format!("failed to serialize module: {e}")))?;
    Ok(bytes)
}

/// A script declares exactly one function, which is what `run` executes.
fn script_entry(module: &CompiledModule) -> Result<Identifier, CompileError> {
    match module.function_defs.as_slice() {
        [def] => {
            let handle = &module.function_handles[def.function.0 as usize];
            Ok(module.identifier_at(handle.name).to_owned())
        }
        defs => Err(CompileError::new(
            0,
            0,
            format!("a script must declare exactly one function, found {}", defs.len()),
        )),
    }
}

// =============================================================================
// Building
// =============================================================================

/// Build `targets` (file name, text) with `deps` available for linking.
pub fn build_modules(
    targets: &[(&str, &str)],
    deps: &BTreeMap<ModuleId, String>,
    named: &BTreeMap<String, AccountAddress>,
) -> Result<Vec<CompiledModule>, CompileError> {
    let dir = tempfile::tempdir()
        .map_err(|e| CompileError::new(0, 0, format!("cannot create scratch directory: {e}")))?;

    let mut target_paths = Vec::with_capacity(targets.len());
    for (name, text) in targets {
        target_paths.push(write_source(&dir.path().join(name), text)?);
    }
    let mut dep_paths = Vec::with_capacity(deps.len());
    for (id, text) in deps {
        let file = format!("{}_{}.move", id.address().to_hex_literal(), id.name());
        let text = hide_harness_attributes(text);
        dep_paths.push(write_source(&dir.path().join("deps").join(file), &text)?);
    }

    let named_addresses: BTreeMap<String, NumericalAddress> = named
        .iter()
        .map(|(name, addr)| {
            (
                name.clone(),
                NumericalAddress::new(addr.into_bytes(), NumberFormat::Hex),
            )
        })
        .collect();

    trace!(
        targets = target_paths.len(),
        deps = dep_paths.len(),
        "invoking move-compiler"
    );
    let (files, result) = MoveCompiler::from_files(None, target_paths, dep_paths, named_addresses)
        .set_flags(Flags::empty().set_sources_shadow_deps(true))
        .build()
        .map_err(|e| CompileError::new(0, 0, format!("compiler failed: {e:#}")))?;

    match result {
        Ok((units, _warnings)) => Ok(units
            .into_iter()
            .map(|unit| unit.named_module.module)
            .collect()),
        Err(diags) => {
            let report = report_diagnostics_to_buffer(&files, diags, false);
            Err(first_error(&String::from_utf8_lossy(&report), dir.path()))
        }
    }
}

fn write_source(path: &Path, text: &str) -> Result<String, CompileError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| CompileError::new(0, 0, format!("cannot write source: {e}")))?;
    }
    fs::write(path, text)
        .map_err(|e| CompileError::new(0, 0, format!("cannot write source: {e}")))?;
    Ok(path.to_string_lossy().into_owned())
}

// =============================================================================
// Dependencies
// =============================================================================

fn module_reference_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(0x[0-9a-fA-F]+|[A-Za-z_][A-Za-z0-9_]*)\s*::\s*([A-Za-z_][A-Za-z0-9_]*)")
            .expect("static regex")
    })
}

/// Published modules reachable from `text` through `addr::module` references.
///
/// Only the reachable sources are handed to the compiler, so a module broken
/// by a forced upgrade does not fail unrelated compilations.
pub fn dependency_closure(
    text: &str,
    published: &BTreeMap<ModuleId, String>,
    named: &BTreeMap<String, AccountAddress>,
) -> BTreeMap<ModuleId, String> {
    let mut closure = BTreeMap::new();
    let mut pending = referenced_modules(text, published, named);
    while let Some(id) = pending.pop() {
        if closure.contains_key(&id) {
            continue;
        }
        let Some(source) = published.get(&id) else {
            continue;
        };
        pending.extend(referenced_modules(source, published, named));
        closure.insert(id, source.clone());
    }
    closure
}

fn grouped_use_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(0x[0-9a-fA-F]+|[A-Za-z_][A-Za-z0-9_]*)\s*::\s*\{([^}]*)\}")
            .expect("static regex")
    })
}

fn referenced_modules(
    text: &str,
    published: &BTreeMap<ModuleId, String>,
    named: &BTreeMap<String, AccountAddress>,
) -> Vec<ModuleId> {
    let resolve = |address: &str, module: &str| {
        let address = match named.get(address) {
            Some(addr) => *addr,
            None => parse_address_literal(address)?,
        };
        let id = ModuleId::new(address, Identifier::new(module.trim()).ok()?);
        published.contains_key(&id).then_some(id)
    };

    let mut ids: Vec<ModuleId> = module_reference_re()
        .captures_iter(text)
        .filter_map(|caps| resolve(&caps[1], &caps[2]))
        .collect();
    // `use std::{vector, string}`
    for caps in grouped_use_re().captures_iter(text) {
        ids.extend(
            caps[2]
                .split(',')
                .filter_map(|item| item.split_whitespace().next())
                .filter_map(|module| resolve(&caps[1], module)),
        );
    }
    ids
}

// =============================================================================
// Diagnostics
// =============================================================================

fn diagnostic_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^(?:error|bug)(?:\[(\w+)\])?: (.+)$").expect("static regex")
    })
}

fn diagnostic_location_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"┌─ (.+):(\d+):(\d+)").expect("static regex"))
}

/// Reduce a rendered diagnostics report to its first error.
///
/// Positions are kept only when the error is in the compiled unit itself;
/// errors inside a dependency name the dependency file instead.
fn first_error(report: &str, scratch: &Path) -> CompileError {
    let Some(header) = diagnostic_header_re().captures(report) else {
        let text = report.trim();
        let message = if text.is_empty() {
            "compilation failed".to_string()
        } else {
            strip_scratch(text, scratch)
        };
        return CompileError::new(0, 0, message);
    };
    let message = match header.get(1) {
        Some(code) => format!("{}: {}", code.as_str(), &header[2]),
        None => header[2].to_string(),
    };
    let rest = &report[header.get(0).map_or(0, |m| m.end())..];
    let Some(loc) = diagnostic_location_re().captures(rest) else {
        return CompileError::new(0, 0, message);
    };
    let path = strip_scratch(&loc[1], scratch);
    if path == TARGET_FILE {
        let line = loc[2].parse().unwrap_or(0);
        let column = loc[3].parse().unwrap_or(0);
        CompileError::new(line, column, message)
    } else {
        CompileError::new(0, 0, format!("{message} (in {path})"))
    }
}

fn strip_scratch(text: &str, scratch: &Path) -> String {
    let prefix = format!("{}/", scratch.to_string_lossy());
    text.replace(&prefix, "")
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::ident_str;

    fn named() -> BTreeMap<String, AccountAddress> {
        let mut named = BTreeMap::new();
        named.insert("std".to_string(), AccountAddress::ONE);
        named.insert("A".to_string(), parse_address_literal("0x42").unwrap());
        named
    }

    #[test]
    fn test_first_error_keeps_unit_positions() {
        let scratch = Path::new("/tmp/scratch");
        let report = "error[E03009]: unbound variable\n  ┌─ /tmp/scratch/unit.move:4:20\n  │\n";
        let err = first_error(report, scratch);
        assert_eq!(err, CompileError::new(4, 20, "E03009: unbound variable"));

        let report = "error[E01002]: unexpected token\n  ┌─ /tmp/scratch/deps/0x42_M.move:1:1\n";
        let err = first_error(report, scratch);
        assert_eq!(err.line, 0);
        assert_eq!(
            err.message,
            "E01002: unexpected token (in deps/0x42_M.move)"
        );

        assert_eq!(first_error("", scratch).message, "compilation failed");
    }

    #[test]
    fn test_dependency_closure_follows_references() {
        let std_vector = ModuleId::new(AccountAddress::ONE, ident_str!("vector").to_owned());
        let std_string = ModuleId::new(AccountAddress::ONE, ident_str!("string").to_owned());
        let a_m = ModuleId::new(
            parse_address_literal("0x42").unwrap(),
            ident_str!("M").to_owned(),
        );
        let a_other = ModuleId::new(
            parse_address_literal("0x42").unwrap(),
            ident_str!("Other").to_owned(),
        );
        let mut published = BTreeMap::new();
        published.insert(std_vector.clone(), "module std::vector {}".to_string());
        published.insert(
            std_string.clone(),
            "module std::string { use std::vector; }".to_string(),
        );
        published.insert(a_m.clone(), "module A::M { use std::string; }".to_string());
        published.insert(a_other.clone(), "module A::Other { }".to_string());

        let closure = dependency_closure("module 0x42::N { use A::M; }", &published, &named());
        let ids: Vec<_> = closure.keys().cloned().collect();
        assert_eq!(ids, vec![std_string.clone(), std_vector.clone(), a_m]);

        let closure = dependency_closure(
            "module 0x42::N { use std::{vector, string as s}; }",
            &published,
            &named(),
        );
        let ids: Vec<_> = closure.keys().cloned().collect();
        assert_eq!(ids, vec![std_string, std_vector]);
    }
}
