//! Build tree layout and the pure path mappings between sources and the
//! artifacts derived from them.

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{Error, Result};

pub const BUILD_DIR: &str = "build";
pub const OBJECT_DIR: &str = "build/o";
pub const ARCHIVE_DIR: &str = "build/a";
pub const BRIDGE_INCLUDE_DIR: &str = "build/cxxbridge/include";
pub const BRIDGE_SOURCE_DIR: &str = "build/cxxbridge/src";
pub const COMPILE_DB: &str = "build/compile_commands.json";

pub const NATIVE_LIB: &str = "build/a/libmegaton_c.a";
pub const CRATE_LIB: &str = "build/a/libmegaton_rs.a";
pub const COMBINED_LIB: &str = "build/a/libmegaton.a";

/// Release library produced by the crate workspace.
pub const CRATE_RELEASE_LIB: &str = "target/aarch64-unknown-hermit/release/libmegaton.a";

/// Support header shared by every generated bridge.
pub const BRIDGE_SUPPORT_HEADER: &str = "build/cxxbridge/include/rust/cxx.h";

/// Path components dropped when mirroring a source path into `build/o`.
pub const STRIPPED_TOKENS: [&str; 3] = ["packages", "src", "build"];

pub const OBJECT_EXTENSION: &str = "o";

/// Maps a source path (relative to the project root) to its object file.
///
/// `packages/sys/src/megaton/patcher.cpp` becomes
/// `build/o/sys/megaton/patcher.o`.
pub fn object_path(source: &Path) -> PathBuf {
    let mut mirrored: PathBuf = source
        .components()
        .filter_map(|x| match x {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .filter(|part| !STRIPPED_TOKENS.iter().any(|token| part == token))
        .collect();
    mirrored.set_extension(OBJECT_EXTENSION);
    Path::new(OBJECT_DIR).join(mirrored)
}

/// Generated header and translation unit for one bridge-annotated file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOutputs {
    pub header: PathBuf,
    pub source: PathBuf,
}

/// Maps a bridge-annotated crate file to its generated outputs.
///
/// The leading prefix component and the two components after the package
/// name (`rs/src`) are dropped: `packages/lib/rs/src/fs.rs` generates
/// `build/cxxbridge/include/lib/fs.rs.h` and `build/cxxbridge/src/lib/fs.rs.cc`.
/// Returns `None` for paths too short to carry that shape.
pub fn bridge_outputs(source: &Path) -> Option<BridgeOutputs> {
    let parts: Vec<_> = source
        .components()
        .filter_map(|x| match x {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();
    if parts.len() < 5 {
        return None;
    }
    let name = parts[parts.len() - 1].to_string_lossy();
    let relative: PathBuf = std::iter::once(parts[1])
        .chain(parts[4..parts.len() - 1].iter().copied())
        .collect();
    Some(BridgeOutputs {
        header: Path::new(BRIDGE_INCLUDE_DIR)
            .join(&relative)
            .join(format!("{}.h", name)),
        source: Path::new(BRIDGE_SOURCE_DIR)
            .join(&relative)
            .join(format!("{}.cc", name)),
    })
}

/// Creates `dir` and its parents. Existing directories are fine.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|e| Error::io(dir, e))
}

pub fn ensure_parent(file: &Path) -> Result<()> {
    match file.parent() {
        Some(parent) => ensure_dir(parent),
        None => Ok(()),
    }
}

/// Removes `dir` recursively. A missing directory is not an error.
pub fn remove_dir(dir: &Path) -> Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::io(dir, e)),
    }
}
