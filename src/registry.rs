//! Per-script symbol table: address aliases, accounts and published modules.

use std::collections::{BTreeMap, BTreeSet};

use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::ModuleId;
use sha2::{Digest, Sha256};
use txn_harness_types::address::parse_address_literal;
use txn_harness_types::CompileContext;

use crate::errors::RegistryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    /// Predeclared by the backend (`std`).
    Builtin,
    /// `init --addresses A=0x42`
    NamedAddress,
    /// `init --accounts Alice`
    Account,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Symbol {
    kind: SymbolKind,
    address: AccountAddress,
}

#[derive(Debug, Default)]
pub struct Registry {
    symbols: BTreeMap<String, Symbol>,
    modules: BTreeMap<ModuleId, BTreeSet<ModuleId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(
        &mut self,
        alias: &str,
        kind: SymbolKind,
        address: AccountAddress,
    ) -> Result<(), RegistryError> {
        if self.symbols.contains_key(alias) {
            return Err(RegistryError::DuplicateAlias {
                alias: alias.to_string(),
            });
        }
        self.symbols
            .insert(alias.to_string(), Symbol { kind, address });
        Ok(())
    }

    /// Declare `alias` from the text of an `init --addresses` value.
    pub fn declare_named_address(&mut self, alias: &str, value: &str) -> Result<(), RegistryError> {
        let address = parse_address_literal(value).ok_or_else(|| RegistryError::InvalidAddress {
            alias: alias.to_string(),
            value: value.to_string(),
        })?;
        self.declare(alias, SymbolKind::NamedAddress, address)
    }

    /// Declare an account, returning its derived address.
    pub fn declare_account(&mut self, name: &str) -> Result<AccountAddress, RegistryError> {
        let address = account_address(name);
        self.declare(name, SymbolKind::Account, address)?;
        Ok(address)
    }

    pub fn resolve(&self, alias: &str) -> Result<AccountAddress, RegistryError> {
        self.symbols
            .get(alias)
            .map(|s| s.address)
            .ok_or_else(|| RegistryError::UnknownAlias {
                alias: alias.to_string(),
            })
    }

    /// A literal address (`0x42`, `66`) or a declared alias.
    pub fn resolve_address(&self, token: &str) -> Result<AccountAddress, RegistryError> {
        match parse_address_literal(token) {
            Some(address) => Ok(address),
            None => self.resolve(token.trim()),
        }
    }

    pub fn accounts(&self) -> Vec<AccountAddress> {
        self.symbols
            .values()
            .filter(|s| s.kind == SymbolKind::Account)
            .map(|s| s.address)
            .collect()
    }

    pub fn record_module(&mut self, id: ModuleId, uses: BTreeSet<ModuleId>) {
        self.modules.insert(id, uses);
    }

    /// Published modules that use `id`.
    pub fn dependents(&self, id: &ModuleId) -> Vec<&ModuleId> {
        self.modules
            .iter()
            .filter(|(module, uses)| *module != id && uses.contains(id))
            .map(|(module, _)| module)
            .collect()
    }

    /// Compilation inputs: every alias plus the published module sources.
    pub fn compile_context(&self, published: BTreeMap<ModuleId, String>) -> CompileContext {
        let named_addresses = self
            .symbols
            .iter()
            .map(|(alias, s)| (alias.clone(), s.address))
            .collect();
        CompileContext {
            named_addresses,
            dependencies: published,
        }
    }
}

/// Deterministic address for a named account.
pub fn account_address(name: &str) -> AccountAddress {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; AccountAddress::LENGTH];
    bytes.copy_from_slice(&digest[..AccountAddress::LENGTH]);
    AccountAddress::new(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::identifier::Identifier;

    #[test]
    fn test_declare_and_resolve() {
        let mut registry = Registry::new();
        registry.declare_named_address("A", "0x42").unwrap();
        assert_eq!(
            registry.resolve("A").unwrap(),
            parse_address_literal("0x42").unwrap()
        );
    }

    #[test]
    fn test_duplicate_alias() {
        let mut registry = Registry::new();
        registry.declare_named_address("A", "0x42").unwrap();
        assert_eq!(
            registry.declare_named_address("A", "0x43"),
            Err(RegistryError::DuplicateAlias {
                alias: "A".to_string()
            })
        );
    }

    #[test]
    fn test_unknown_alias_and_literals() {
        let registry = Registry::new();
        assert!(matches!(
            registry.resolve_address("B"),
            Err(RegistryError::UnknownAlias { .. })
        ));
        assert_eq!(
            registry.resolve_address("0x1").unwrap(),
            AccountAddress::ONE
        );
    }

    #[test]
    fn test_invalid_named_address() {
        let mut registry = Registry::new();
        assert!(matches!(
            registry.declare_named_address("A", "0xZZ"),
            Err(RegistryError::InvalidAddress { .. })
        ));
    }

    #[test]
    fn test_accounts_are_deterministic() {
        let mut a = Registry::new();
        let mut b = Registry::new();
        let alice = a.declare_account("Alice").unwrap();
        assert_eq!(alice, b.declare_account("Alice").unwrap());
        assert_ne!(alice, account_address("Bob"));
        assert_eq!(a.accounts(), vec![alice]);
    }

    #[test]
    fn test_compile_context_carries_aliases_and_sources() {
        let mut registry = Registry::new();
        registry.declare_named_address("A", "0x42").unwrap();
        let m = ModuleId::new(
            registry.resolve("A").unwrap(),
            Identifier::new("M").unwrap(),
        );
        let mut published = BTreeMap::new();
        published.insert(m.clone(), "module A::M {}".to_string());
        let ctx = registry.compile_context(published);
        assert_eq!(ctx.named_addresses.get("A"), Some(m.address()));
        assert_eq!(ctx.dependencies.get(&m).map(String::as_str), Some("module A::M {}"));
    }

    #[test]
    fn test_dependents() {
        let mut registry = Registry::new();
        let id = |name: &str| ModuleId::new(AccountAddress::ONE, Identifier::new(name).unwrap());
        registry.record_module(id("Base"), BTreeSet::new());
        registry.record_module(id("User"), BTreeSet::from([id("Base")]));
        registry.record_module(id("Other"), BTreeSet::from([id("User")]));
        assert_eq!(registry.dependents(&id("Base")), vec![&id("User")]);
        assert!(registry.dependents(&id("Other")).is_empty());
    }
}
