//! Fixture loading utilities.

use std::fs;
use std::path::{Path, PathBuf};

use txn_harness_vm::ReferenceVm;

pub fn manifest_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

/// `tests/scripts`, the suite run by `script_suite`.
pub fn scripts_dir() -> PathBuf {
    manifest_dir().join("tests/scripts")
}

/// A file under `tests/fixtures`.
pub fn fixture_path(name: &str) -> PathBuf {
    manifest_dir().join("tests/fixtures").join(name)
}

/// Write `text` to `dir/name`, creating parent directories.
pub fn write_script(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create fixture directory");
    }
    fs::write(&path, text).expect("write fixture script");
    path
}

pub fn reference_vm() -> ReferenceVm {
    ReferenceVm::new().expect("reference VM should initialize")
}
