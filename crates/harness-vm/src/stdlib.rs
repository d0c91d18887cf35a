//! Standard library modules at `0x1`, compiled with `move-compiler` when the
//! backend is constructed.
//!
//! Natives are bound to `move-stdlib-natives` (vector, string, hash, bcs,
//! signer) or to this crate's [`natives`](crate::natives) (account, storage).

use std::collections::BTreeMap;

use move_binary_format::CompiledModule;
use move_core_types::language_storage::ModuleId;
use txn_harness_types::address::STD_ADDRESS;
use txn_harness_types::BackendError;

use crate::compiler::{build_modules, serialize_module};

const VECTOR: &str = r#"
module std::vector {
    /// The index into the vector is out of bounds.
    const EINDEX_OUT_OF_BOUNDS: u64 = 1;

    #[bytecode_instruction]
    native public fun empty<Element>(): vector<Element>;

    #[bytecode_instruction]
    native public fun length<Element>(v: &vector<Element>): u64;

    #[bytecode_instruction]
    native public fun borrow<Element>(v: &vector<Element>, i: u64): &Element;

    #[bytecode_instruction]
    native public fun push_back<Element>(v: &mut vector<Element>, e: Element);

    #[bytecode_instruction]
    native public fun borrow_mut<Element>(v: &mut vector<Element>, i: u64): &mut Element;

    #[bytecode_instruction]
    native public fun pop_back<Element>(v: &mut vector<Element>): Element;

    #[bytecode_instruction]
    native public fun destroy_empty<Element>(v: vector<Element>);

    #[bytecode_instruction]
    native public fun swap<Element>(v: &mut vector<Element>, i: u64, j: u64);

    public fun singleton<Element>(e: Element): vector<Element> {
        let v = empty();
        push_back(&mut v, e);
        v
    }

    public fun reverse<Element>(v: &mut vector<Element>) {
        let len = length(v);
        if (len == 0) return ();
        let front = 0;
        let back = len - 1;
        while (front < back) {
            swap(v, front, back);
            front = front + 1;
            back = back - 1;
        }
    }

    public fun append<Element>(lhs: &mut vector<Element>, other: vector<Element>) {
        reverse(&mut other);
        while (!is_empty(&other)) push_back(lhs, pop_back(&mut other));
        destroy_empty(other);
    }

    public fun is_empty<Element>(v: &vector<Element>): bool {
        length(v) == 0
    }

    public fun contains<Element>(v: &vector<Element>, e: &Element): bool {
        let i = 0;
        let len = length(v);
        while (i < len) {
            if (borrow(v, i) == e) return true;
            i = i + 1;
        };
        false
    }

    public fun index_of<Element>(v: &vector<Element>, e: &Element): (bool, u64) {
        let i = 0;
        let len = length(v);
        while (i < len) {
            if (borrow(v, i) == e) return (true, i);
            i = i + 1;
        };
        (false, 0)
    }

    public fun remove<Element>(v: &mut vector<Element>, i: u64): Element {
        let len = length(v);
        if (i >= len) abort EINDEX_OUT_OF_BOUNDS;
        len = len - 1;
        while (i < len) {
            let next = i + 1;
            swap(v, i, next);
            i = next;
        };
        pop_back(v)
    }
}
"#;

const OPTION: &str = r#"
module std::option {
    use std::vector;

    /// The option is `Some` while it should be `None`.
    const EOPTION_IS_SET: u64 = 0x40000;
    /// The option is `None` while it should be `Some`.
    const EOPTION_NOT_SET: u64 = 0x40001;

    struct Option<Element> has copy, drop, store {
        vec: vector<Element>
    }

    public fun none<Element>(): Option<Element> {
        Option { vec: vector::empty() }
    }

    public fun some<Element>(e: Element): Option<Element> {
        Option { vec: vector::singleton(e) }
    }

    public fun is_none<Element>(t: &Option<Element>): bool {
        vector::is_empty(&t.vec)
    }

    public fun is_some<Element>(t: &Option<Element>): bool {
        !vector::is_empty(&t.vec)
    }

    public fun borrow<Element>(t: &Option<Element>): &Element {
        assert!(is_some(t), EOPTION_NOT_SET);
        vector::borrow(&t.vec, 0)
    }

    public fun fill<Element>(t: &mut Option<Element>, e: Element) {
        assert!(is_none(t), EOPTION_IS_SET);
        vector::push_back(&mut t.vec, e);
    }

    public fun extract<Element>(t: &mut Option<Element>): Element {
        assert!(is_some(t), EOPTION_NOT_SET);
        vector::pop_back(&mut t.vec)
    }

    public fun destroy_some<Element>(t: Option<Element>): Element {
        assert!(is_some(&t), EOPTION_NOT_SET);
        let Option { vec } = t;
        let elem = vector::pop_back(&mut vec);
        vector::destroy_empty(vec);
        elem
    }

    public fun destroy_none<Element>(t: Option<Element>) {
        assert!(is_none(&t), EOPTION_IS_SET);
        let Option { vec } = t;
        vector::destroy_empty(vec)
    }
}
"#;

const STRING: &str = r#"
module std::string {
    use std::vector;

    /// An invalid UTF8 encoding.
    const EINVALID_UTF8: u64 = 1;

    /// Index out of range.
    const EINVALID_INDEX: u64 = 2;

    struct String has copy, drop, store {
        bytes: vector<u8>,
    }

    public fun utf8(bytes: vector<u8>): String {
        assert!(internal_check_utf8(&bytes), EINVALID_UTF8);
        String { bytes }
    }

    public fun bytes(s: &String): &vector<u8> {
        &s.bytes
    }

    public fun is_empty(s: &String): bool {
        vector::is_empty(&s.bytes)
    }

    public fun length(s: &String): u64 {
        vector::length(&s.bytes)
    }

    public fun append(s: &mut String, r: String) {
        vector::append(&mut s.bytes, r.bytes)
    }

    public fun append_utf8(s: &mut String, bytes: vector<u8>) {
        append(s, utf8(bytes))
    }

    public fun insert(s: &mut String, at: u64, o: String) {
        let bytes = &s.bytes;
        assert!(at <= vector::length(bytes) && internal_is_char_boundary(bytes, at), EINVALID_INDEX);
        let l = length(s);
        let front = sub_string(s, 0, at);
        let end = sub_string(s, at, l);
        append(&mut front, o);
        append(&mut front, end);
        *s = front;
    }

    public fun sub_string(s: &String, i: u64, j: u64): String {
        let bytes = &s.bytes;
        let l = vector::length(bytes);
        assert!(
            j <= l && i <= j && internal_is_char_boundary(bytes, i) && internal_is_char_boundary(bytes, j),
            EINVALID_INDEX
        );
        String { bytes: internal_sub_string(bytes, i, j) }
    }

    public fun index_of(s: &String, r: &String): u64 {
        internal_index_of(&s.bytes, &r.bytes)
    }

    native fun internal_check_utf8(v: &vector<u8>): bool;
    native fun internal_is_char_boundary(v: &vector<u8>, i: u64): bool;
    native fun internal_sub_string(v: &vector<u8>, i: u64, j: u64): vector<u8>;
    native fun internal_index_of(v: &vector<u8>, r: &vector<u8>): u64;
}
"#;

const HASH: &str = r#"
module std::hash {
    native public fun sha2_256(data: vector<u8>): vector<u8>;
    native public fun sha3_256(data: vector<u8>): vector<u8>;
}
"#;

const BCS: &str = r#"
module std::bcs {
    native public fun to_bytes<MoveValue>(v: &MoveValue): vector<u8>;
}
"#;

const SIGNER: &str = r#"
module std::signer {
    native public fun borrow_address(s: &signer): &address;

    public fun address_of(s: &signer): address {
        *borrow_address(s)
    }
}
"#;

const ACCOUNT: &str = r#"
module std::account {
    use std::signer;

    struct SignerCapability has drop, store {
        account: address,
    }

    public fun create_signer_capability(s: &signer): SignerCapability {
        SignerCapability { account: signer::address_of(s) }
    }

    public fun create_signer_with_capability(capability: &SignerCapability): signer {
        create_signer(capability.account)
    }

    public fun capability_address(capability: &SignerCapability): address {
        capability.account
    }

    native fun create_signer(addr: address): signer;
}
"#;

const STORAGE: &str = r#"
module std::storage {
    /// Store `resource` under the signer's address. Fails if one is already there.
    native public fun publish<T: key>(account: &signer, resource: T);

    /// Take the resource stored at `addr` out of storage.
    native public fun remove<T: key>(addr: address): T;

    native public fun exists_at<T: key>(addr: address): bool;

    native public fun borrow<T: key>(addr: address): &T;

    native public fun borrow_mut<T: key>(addr: address): &mut T;
}
"#;

/// Sources keyed by module name.
pub const SOURCES: &[(&str, &str)] = &[
    ("vector", VECTOR),
    ("option", OPTION),
    ("string", STRING),
    ("hash", HASH),
    ("bcs", BCS),
    ("signer", SIGNER),
    ("account", ACCOUNT),
    ("storage", STORAGE),
];

/// A standard library module with the text it was compiled from.
#[derive(Debug, Clone)]
pub struct StdlibModule {
    pub source: &'static str,
    pub module: CompiledModule,
    pub bytes: Vec<u8>,
}

/// Compile every standard library module in one build.
pub fn compile_stdlib() -> Result<BTreeMap<ModuleId, StdlibModule>, BackendError> {
    let mut named = BTreeMap::new();
    named.insert("std".to_string(), STD_ADDRESS);
    let targets: Vec<(String, &str)> = SOURCES
        .iter()
        .map(|(name, source)| (format!("{name}.move"), *source))
        .collect();
    let target_refs: Vec<(&str, &str)> = targets.iter().map(|(f, s)| (f.as_str(), *s)).collect();

    let modules = build_modules(&target_refs, &BTreeMap::new(), &named)
        .map_err(|e| BackendError::new(format!("standard library failed to compile: {e}")))?;

    let mut compiled = BTreeMap::new();
    for module in modules {
        let id = module.self_id();
        let source = SOURCES
            .iter()
            .find(|(name, _)| *name == id.name().as_str())
            .map(|(_, source)| *source)
            .ok_or_else(|| BackendError::new(format!("unexpected standard library module {id}")))?;
        let bytes = serialize_module(&module).map_err(|e| BackendError::new(e.to_string()))?;
        compiled.insert(
            id,
            StdlibModule {
                source,
                module,
                bytes,
            },
        );
    }
    Ok(compiled)
}
