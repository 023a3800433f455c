//! Source tree and flag resolution.

use std::path::{Path, PathBuf};

use crate::config::BuildOptions;
use crate::error::Result;
use crate::paths::{ensure_dir, BRIDGE_INCLUDE_DIR, BRIDGE_SOURCE_DIR};

pub const PACKAGE_PREFIX: &str = "packages";
pub const NATIVE_BASES: [&str; 4] = ["sys", "lib", "nx", "abi"];
pub const CRATE_BASES: [&str; 3] = ["lib", "nx", "abi"];

/// Native base that sits directly under the prefix instead of in `cxx/`.
const FLAT_NATIVE_BASE: &str = "sys";

const COMMON_BASELINE: &[&str] = &[
    "-march=armv8-a+crc+crypto",
    "-mtune=cortex-a57",
    "-mtp=soft",
    "-fPIC",
    "-fvisibility=hidden",
    "-g",
];
const C_BASELINE: &[&str] = &[
    "-Wall",
    "-Werror",
    "-O3",
    "-fdiagnostics-color=always",
    "-DMEGATON_LIB",
    "-xc",
];
const CXX_BASELINE: &[&str] = &[
    "-Wall",
    "-Werror",
    "-O3",
    "-fdiagnostics-color=always",
    "-DMEGATON_LIB",
    "-std=c++20",
    "-fno-rtti",
    "-fno-exceptions",
    "-fno-asynchronous-unwind-tables",
    "-fno-unwind-tables",
];
const ASM_PREAMBLE: &[&str] = &["-x", "assembler-with-cpp"];
const CARGO_BASELINE: &[&str] = &[
    "+megaton",
    "build",
    "--release",
    "--target=aarch64-unknown-hermit",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Toolchain {
    Native,
    Crate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    pub toolchain: Toolchain,
    /// Base directory relative to the project root.
    pub base: PathBuf,
}

/// Argument list for one toolchain: baseline first, then derived flags, then
/// whatever the user appended. Nothing ever replaces the baseline.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlagSet(Vec<String>);

impl FlagSet {
    pub fn compose(baseline: &[&str], derived: &[String], extra: &[String]) -> Self {
        FlagSet(
            baseline
                .iter()
                .map(|x| x.to_string())
                .chain(derived.iter().cloned())
                .chain(extra.iter().cloned())
                .collect(),
        )
    }

    pub fn args(&self) -> &[String] {
        &self.0
    }
}

/// External programs the pipeline drives.
#[derive(Debug, Clone, PartialEq)]
pub struct Tools {
    pub cc: PathBuf,
    pub cxx: PathBuf,
    pub ar: PathBuf,
    pub cxxbridge: PathBuf,
    pub cargo: PathBuf,
}

impl Tools {
    pub fn devkitpro(devkitpro: &Path) -> Self {
        let bin = devkitpro.join("devkitA64").join("bin");
        Tools {
            cc: bin.join("aarch64-none-elf-gcc"),
            cxx: bin.join("aarch64-none-elf-g++"),
            ar: bin.join("aarch64-none-elf-ar"),
            cxxbridge: PathBuf::from("cxxbridge"),
            cargo: PathBuf::from("cargo"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Layout {
    pub root: PathBuf,
    pub trees: Vec<SourceTree>,
    /// Relative to the root; includes the generated bridge sources.
    pub native_source_dirs: Vec<PathBuf>,
    /// Crate `src/` directories scanned for bridge annotations.
    pub crate_source_dirs: Vec<PathBuf>,
    pub common: FlagSet,
    pub asm: FlagSet,
    pub c: FlagSet,
    pub cxx: FlagSet,
    pub cargo: FlagSet,
    pub tools: Tools,
}

impl Layout {
    /// Derives every directory and flag set for this run and creates any
    /// source, include and crate directory that is missing.
    pub fn resolve(options: &BuildOptions) -> Result<Self> {
        let trees = source_trees();
        let native_bases: Vec<&Path> = trees
            .iter()
            .filter(|x| x.toolchain == Toolchain::Native)
            .map(|x| x.base.as_path())
            .collect();
        let crate_bases: Vec<&Path> = trees
            .iter()
            .filter(|x| x.toolchain == Toolchain::Crate)
            .map(|x| x.base.as_path())
            .collect();

        let mut native_source_dirs: Vec<PathBuf> =
            native_bases.iter().map(|x| x.join("src")).collect();
        native_source_dirs.push(PathBuf::from(BRIDGE_SOURCE_DIR));

        let mut include_dirs: Vec<PathBuf> = native_bases
            .iter()
            .map(|x| options.root.join(x).join("include"))
            .collect();
        include_dirs.push(options.root.join(BRIDGE_INCLUDE_DIR));

        for dir in &include_dirs {
            ensure_dir(dir)?;
        }
        for dir in native_source_dirs
            .iter()
            .map(|x| x.as_path())
            .chain(crate_bases.iter().copied())
        {
            ensure_dir(&options.root.join(dir))?;
        }

        let sdk_include = options.devkitpro.join("libnx").join("include");
        let include_flags: Vec<String> = include_dirs
            .iter()
            .map(|x| x.as_path())
            .chain(std::iter::once(sdk_include.as_path()))
            .map(|x| format!("-I{}", x.display()))
            .collect();

        let extra = &options.extra_flags;
        let mut common_extra = default_common_flags(&options.mod_dir);
        common_extra.extend(extra.common.iter().cloned());

        let mut asm_baseline: Vec<&str> = ASM_PREAMBLE.to_vec();
        asm_baseline.extend_from_slice(CXX_BASELINE);

        Ok(Layout {
            root: options.root.clone(),
            crate_source_dirs: crate_bases.iter().map(|x| x.join("src")).collect(),
            native_source_dirs,
            common: FlagSet::compose(COMMON_BASELINE, &include_flags, &common_extra),
            asm: FlagSet::compose(&asm_baseline, &[], &extra.asm),
            c: FlagSet::compose(C_BASELINE, &[], &extra.c),
            cxx: FlagSet::compose(CXX_BASELINE, &[], &extra.cxx),
            cargo: FlagSet::compose(CARGO_BASELINE, &[], &extra.cargo),
            tools: Tools::devkitpro(&options.devkitpro),
            trees,
        })
    }

    pub fn crate_dirs(&self) -> impl Iterator<Item = &Path> {
        self.trees
            .iter()
            .filter(|x| x.toolchain == Toolchain::Crate)
            .map(|x| x.base.as_path())
    }
}

/// Native trees first, then crate trees, each in declaration order.
pub fn source_trees() -> Vec<SourceTree> {
    let native = NATIVE_BASES.iter().map(|name| {
        let base = if *name == FLAT_NATIVE_BASE {
            Path::new(PACKAGE_PREFIX).join(name)
        } else {
            Path::new(PACKAGE_PREFIX).join(name).join("cxx")
        };
        SourceTree {
            toolchain: Toolchain::Native,
            base,
        }
    });
    let crates = CRATE_BASES.iter().map(|name| SourceTree {
        toolchain: Toolchain::Crate,
        base: Path::new(PACKAGE_PREFIX).join(name).join("rs"),
    });
    native.chain(crates).collect()
}

/// Symbols from the example mod are visible to the library by default.
fn default_common_flags(mod_dir: &Path) -> Vec<String> {
    vec![
        format!("-I{}/packages/botw-symbols/include/", mod_dir.display()),
        "-DBOTWTOOLKIT_TCP_SEND".to_string(),
    ]
}
