//! Committed VM state and the module store the VM loads bytecode from.
//!
//! Resources are kept as BCS bytes keyed by owner and type. Transactions never
//! write here directly: the [`ResourceRuntime`](crate::resources::ResourceRuntime)
//! collects changes and [`VmState::apply`] commits them after a success.

use std::collections::{BTreeMap, BTreeSet};

use move_binary_format::CompiledModule;
use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::ModuleId;
use move_core_types::resolver::{LinkageResolver, ModuleResolver};

use crate::resources::ResourceKey;

/// A module in the state, with the text it was compiled from.
#[derive(Debug, Clone)]
pub struct PublishedModule {
    pub source: String,
    pub module: CompiledModule,
    pub bytes: Vec<u8>,
}

/// Everything one script's execution has committed.
#[derive(Debug, Clone, Default)]
pub struct VmState {
    pub(crate) modules: BTreeMap<ModuleId, PublishedModule>,
    pub(crate) resources: BTreeMap<ResourceKey, Vec<u8>>,
    pub(crate) accounts: BTreeSet<AccountAddress>,
}

impl VmState {
    pub fn module(&self, id: &ModuleId) -> Option<&PublishedModule> {
        self.modules.get(id)
    }

    pub fn accounts(&self) -> impl Iterator<Item = &AccountAddress> {
        self.accounts.iter()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub(crate) fn apply(&mut self, writes: BTreeMap<ResourceKey, Option<Vec<u8>>>) {
        for (key, bytes) in writes {
            match bytes {
                Some(bytes) => {
                    self.resources.insert(key, bytes);
                }
                None => {
                    self.resources.remove(&key);
                }
            }
        }
    }
}

/// Module bytes as the VM sees them during one session: the committed
/// modules plus the unit being published or run.
pub(crate) struct ModuleStore<'a> {
    modules: &'a BTreeMap<ModuleId, PublishedModule>,
    overlay: Option<(ModuleId, &'a [u8])>,
}

impl<'a> ModuleStore<'a> {
    pub(crate) fn new(modules: &'a BTreeMap<ModuleId, PublishedModule>) -> Self {
        Self {
            modules,
            overlay: None,
        }
    }

    /// Serve `bytes` for `id`, shadowing any committed module with that id.
    pub(crate) fn with_overlay(mut self, id: ModuleId, bytes: &'a [u8]) -> Self {
        self.overlay = Some((id, bytes));
        self
    }
}

impl LinkageResolver for ModuleStore<'_> {
    type Error = anyhow::Error;

    fn link_context(&self) -> AccountAddress {
        AccountAddress::ZERO
    }

    fn relocate(&self, module_id: &ModuleId) -> Result<ModuleId, Self::Error> {
        Ok(module_id.clone())
    }
}

impl ModuleResolver for ModuleStore<'_> {
    type Error = anyhow::Error;

    fn get_module(&self, id: &ModuleId) -> Result<Option<Vec<u8>>, Self::Error> {
        if let Some((overlay_id, bytes)) = &self.overlay {
            if overlay_id == id {
                return Ok(Some(bytes.to_vec()));
            }
        }
        Ok(self.modules.get(id).map(|m| m.bytes.clone()))
    }
}
