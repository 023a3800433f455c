use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashMap;
use log::*;
use rayon::prelude::*;
use serde::Serialize;
use walkdir::WalkDir;

use crate::codegen::relative_to;
use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::paths::{
    ensure_dir, ensure_parent, object_path, remove_dir, ARCHIVE_DIR, COMPILE_DB, OBJECT_DIR,
};
use crate::tool::{execute, Invocation, ToolRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Language {
    Asm,
    C,
    Cxx,
}

impl Language {
    /// Extensions are matched case-insensitively.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "s" => Some(Language::Asm),
            "c" => Some(Language::C),
            "cpp" | "cc" => Some(Language::Cxx),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Language::Asm => "assembly",
            Language::C => "c",
            Language::Cxx => "c++",
        };
        f.write_str(name)
    }
}

/// One translation unit and the object it compiles to, both relative to the
/// project root.
#[derive(Debug, Clone, PartialEq)]
pub struct CompileUnit {
    pub language: Language,
    pub source: PathBuf,
    pub object: PathBuf,
}

impl CompileUnit {
    pub fn new(language: Language, source: PathBuf) -> Self {
        let object = object_path(&source);
        CompileUnit {
            language,
            source,
            object,
        }
    }

    pub fn invocation(&self, layout: &Layout) -> Invocation {
        let (compiler, flags) = match self.language {
            Language::Asm => (&layout.tools.cxx, &layout.asm),
            Language::C => (&layout.tools.cc, &layout.c),
            Language::Cxx => (&layout.tools.cxx, &layout.cxx),
        };
        Invocation::new(compiler, &layout.root)
            .args(layout.common.args())
            .args(flags.args())
            .arg("-c")
            .path_arg(&self.source)
            .arg("-o")
            .path_arg(&self.object)
    }
}

/// Entry of a clang JSON compilation database.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompileRecord {
    pub directory: PathBuf,
    pub arguments: Vec<String>,
    pub file: PathBuf,
    pub output: PathBuf,
}

/// Collects every assembly, C and C++ file under the native source
/// directories, grouped by language and sorted within each group. Fails
/// before anything is compiled if two sources map to the same object.
pub fn discover(layout: &Layout) -> Result<Vec<CompileUnit>> {
    let mut units = Vec::new();
    for dir in &layout.native_source_dirs {
        let dir = layout.root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(language) = Language::from_path(entry.path()) {
                units.push(CompileUnit::new(language, relative_to(&layout.root, entry.path())));
            }
        }
    }
    units.sort_by_key(|x| x.language);
    check_objects_are_disjoint(&units)?;
    Ok(units)
}

fn check_objects_are_disjoint(units: &[CompileUnit]) -> Result<()> {
    let mut claimed: HashMap<&Path, &Path> = HashMap::with_capacity(units.len());
    for unit in units {
        if let Some(first) = claimed.insert(&unit.object, &unit.source) {
            return Err(Error::ObjectCollision {
                object: unit.object.clone(),
                first: first.to_path_buf(),
                second: unit.source.clone(),
            });
        }
    }
    Ok(())
}

/// Empties `build/o` and `build/a` so no object from an earlier run can
/// reach the archive.
pub fn reset_output_tree(root: &Path) -> Result<()> {
    for dir in &[OBJECT_DIR, ARCHIVE_DIR] {
        let dir = root.join(dir);
        remove_dir(&dir)?;
        ensure_dir(&dir)?;
    }
    Ok(())
}

/// Compiles every unit on the worker pool. The first failure stops new work
/// from being scheduled; invocations already running finish normally.
pub fn compile_all(
    layout: &Layout,
    runner: &dyn ToolRunner,
    units: &[CompileUnit],
) -> Result<Vec<CompileRecord>> {
    units
        .par_iter()
        .map(|unit| compile_one(layout, runner, unit))
        .collect()
}

fn compile_one(
    layout: &Layout,
    runner: &dyn ToolRunner,
    unit: &CompileUnit,
) -> Result<CompileRecord> {
    ensure_parent(&layout.root.join(&unit.object))?;
    let invocation = unit.invocation(layout);
    let result = execute(runner, &invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::Compile {
            language: unit.language,
            file: unit.source.clone(),
        });
    }
    trace!("compiled {} -> {}", unit.source.display(), unit.object.display());
    Ok(CompileRecord {
        directory: layout.root.clone(),
        arguments: invocation.argv(),
        file: unit.source.clone(),
        output: unit.object.clone(),
    })
}

pub fn write_compile_db(root: &Path, records: &[CompileRecord]) -> Result<()> {
    let path = root.join(COMPILE_DB);
    ensure_parent(&path)?;
    let contents = serde_json::to_string_pretty(records)?;
    fs::write(&path, contents).map_err(|e| Error::io(&path, e))?;
    debug!("wrote {} entries to {}", records.len(), path.display());
    Ok(())
}
