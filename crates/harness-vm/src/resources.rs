//! # Resource runtime: global storage behind `std::storage`
//!
//! The VM has no global storage of its own, so resources live in a native
//! context extension for the length of one session:
//!
//! 1. [`ResourceRuntime::new`] takes a snapshot of the committed resources
//! 2. a native touching a resource loads it into a [`GlobalValue`], so
//!    `borrow`/`borrow_mut` hand out references the VM can write through
//! 3. when the session finishes the runtime is dropped and every touched
//!    resource is serialized into the shared [`ResourceChanges`]
//! 4. the caller applies those changes only when the transaction succeeded

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use better_any::{Tid, TidAble};
use move_binary_format::errors::{PartialVMError, PartialVMResult};
use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::TypeTag;
use move_core_types::runtime_value::MoveTypeLayout;
use move_core_types::vm_status::StatusCode;
use move_vm_runtime::native_extensions::NativeExtensionMarker;
use move_vm_types::values::{GlobalValue, Value};
use parking_lot::Mutex;
use txn_harness_types::value::format_type_tag;

/// A stored resource is addressed by owner and full type.
pub type ResourceKey = (AccountAddress, TypeTag);

/// Writes produced by one session. `None` deletes the resource.
#[derive(Debug, Default)]
pub struct ResourceChanges {
    pub writes: BTreeMap<ResourceKey, Option<Vec<u8>>>,
    /// Set when a touched resource could not be serialized back.
    pub error: Option<String>,
}

struct LiveResource {
    value: GlobalValue,
    layout: MoveTypeLayout,
}

#[derive(Tid)]
pub struct ResourceRuntime {
    committed: Arc<BTreeMap<ResourceKey, Vec<u8>>>,
    live: BTreeMap<ResourceKey, LiveResource>,
    removed: BTreeSet<ResourceKey>,
    changes: Arc<Mutex<ResourceChanges>>,
}

impl NativeExtensionMarker<'_> for ResourceRuntime {}

fn missing(key: &ResourceKey) -> PartialVMError {
    PartialVMError::new(StatusCode::MISSING_DATA).with_message(format!(
        "resource {} not found at {}",
        format_type_tag(&key.1),
        key.0.to_hex_literal()
    ))
}

fn already_exists(key: &ResourceKey) -> PartialVMError {
    PartialVMError::new(StatusCode::RESOURCE_ALREADY_EXISTS).with_message(format!(
        "resource {} already exists at {}",
        format_type_tag(&key.1),
        key.0.to_hex_literal()
    ))
}

impl ResourceRuntime {
    pub fn new(
        committed: Arc<BTreeMap<ResourceKey, Vec<u8>>>,
        changes: Arc<Mutex<ResourceChanges>>,
    ) -> Self {
        Self {
            committed,
            live: BTreeMap::new(),
            removed: BTreeSet::new(),
            changes,
        }
    }

    /// Make `key` live if it exists. Returns whether it exists.
    fn load(&mut self, key: &ResourceKey, layout: &MoveTypeLayout) -> PartialVMResult<bool> {
        if self.live.contains_key(key) {
            return Ok(true);
        }
        if self.removed.contains(key) {
            return Ok(false);
        }
        let Some(bytes) = self.committed.get(key) else {
            return Ok(false);
        };
        let value = Value::simple_deserialize(bytes, layout)
            .ok_or_else(|| PartialVMError::new(StatusCode::VALUE_DESERIALIZATION_ERROR))?;
        self.insert_live(key.clone(), value, layout.clone())?;
        Ok(true)
    }

    fn insert_live(
        &mut self,
        key: ResourceKey,
        value: Value,
        layout: MoveTypeLayout,
    ) -> PartialVMResult<()> {
        let mut global = GlobalValue::none();
        if global.move_to(value).is_err() {
            return Err(already_exists(&key));
        }
        self.live.insert(key, LiveResource { value: global, layout });
        Ok(())
    }

    pub fn publish(
        &mut self,
        key: ResourceKey,
        value: Value,
        layout: MoveTypeLayout,
    ) -> PartialVMResult<()> {
        if self.load(&key, &layout)? {
            return Err(already_exists(&key));
        }
        self.removed.remove(&key);
        self.insert_live(key, value, layout)
    }

    pub fn remove(&mut self, key: &ResourceKey, layout: &MoveTypeLayout) -> PartialVMResult<Value> {
        if !self.load(key, layout)? {
            return Err(missing(key));
        }
        let live = self.live.remove(key).ok_or_else(|| missing(key))?;
        self.removed.insert(key.clone());
        live.value.into_value().ok_or_else(|| missing(key))
    }

    pub fn exists(&mut self, key: &ResourceKey, layout: &MoveTypeLayout) -> PartialVMResult<bool> {
        self.load(key, layout)
    }

    /// A reference into the live resource; mutable or not depending on the
    /// native's declared return type.
    pub fn borrow(&mut self, key: &ResourceKey, layout: &MoveTypeLayout) -> PartialVMResult<Value> {
        if !self.load(key, layout)? {
            return Err(missing(key));
        }
        self.live
            .get(key)
            .ok_or_else(|| missing(key))?
            .value
            .borrow_global()
    }
}

impl Drop for ResourceRuntime {
    fn drop(&mut self) {
        let mut changes = self.changes.lock();
        for key in std::mem::take(&mut self.removed) {
            changes.writes.insert(key, None);
        }
        for ((address, tag), live) in std::mem::take(&mut self.live) {
            let bytes = live
                .value
                .into_value()
                .and_then(|value| value.typed_serialize(&live.layout));
            match bytes {
                Some(bytes) => {
                    changes.writes.insert((address, tag), Some(bytes));
                }
                None => {
                    changes.error.get_or_insert_with(|| {
                        format!(
                            "resource {} at {} could not be serialized",
                            format_type_tag(&tag),
                            address.to_hex_literal()
                        )
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runtime(
        committed: BTreeMap<ResourceKey, Vec<u8>>,
    ) -> (ResourceRuntime, Arc<Mutex<ResourceChanges>>) {
        let changes = Arc::new(Mutex::new(ResourceChanges::default()));
        (
            ResourceRuntime::new(Arc::new(committed), changes.clone()),
            changes,
        )
    }

    fn key(n: u8) -> ResourceKey {
        (AccountAddress::new([n; AccountAddress::LENGTH]), TypeTag::U64)
    }

    #[test]
    fn test_publish_then_remove_is_a_delete() {
        let (mut rt, changes) = runtime(BTreeMap::new());
        rt.publish(key(1), Value::u64(5), MoveTypeLayout::U64).unwrap();
        assert!(rt.exists(&key(1), &MoveTypeLayout::U64).unwrap());
        assert!(rt
            .publish(key(1), Value::u64(6), MoveTypeLayout::U64)
            .is_err());
        rt.remove(&key(1), &MoveTypeLayout::U64).unwrap();
        assert!(!rt.exists(&key(1), &MoveTypeLayout::U64).unwrap());
        drop(rt);
        assert_eq!(changes.lock().writes.get(&key(1)), Some(&None));
    }

    #[test]
    fn test_committed_values_are_flushed_back() {
        let mut committed = BTreeMap::new();
        committed.insert(key(2), 7u64.to_le_bytes().to_vec());
        let (mut rt, changes) = runtime(committed);
        assert!(rt.exists(&key(2), &MoveTypeLayout::U64).unwrap());
        assert!(rt.remove(&key(3), &MoveTypeLayout::U64).is_err());
        drop(rt);
        let changes = changes.lock();
        assert_eq!(
            changes.writes.get(&key(2)),
            Some(&Some(7u64.to_le_bytes().to_vec()))
        );
        assert!(!changes.writes.contains_key(&key(3)));
        assert!(changes.error.is_none());
    }
}
