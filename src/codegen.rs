use std::fs;
use std::path::{Path, PathBuf};

use log::*;
use walkdir::WalkDir;

use crate::error::{CodegenOutput, Error, Result};
use crate::layout::Layout;
use crate::paths::{
    bridge_outputs, ensure_dir, ensure_parent, remove_dir, BridgeOutputs, BRIDGE_INCLUDE_DIR,
    BRIDGE_SOURCE_DIR, BRIDGE_SUPPORT_HEADER,
};
use crate::tool::{execute, Invocation, ToolRunner};

pub const BRIDGE_MARKER: &str = "#[cxx::bridge]";

#[derive(Debug, Clone, PartialEq)]
pub struct CodegenUnit {
    /// Relative to the project root.
    pub source: PathBuf,
    pub outputs: BridgeOutputs,
}

/// Finds every crate source file carrying the bridge marker, sorted.
pub fn discover(layout: &Layout) -> Result<Vec<CodegenUnit>> {
    let mut units = Vec::new();
    for dir in &layout.crate_source_dirs {
        let dir = layout.root.join(dir);
        if !dir.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(&dir).to_path_buf();
                Error::io(path, e.into())
            })?;
            if !entry.file_type().is_file() || !is_rust_file(entry.path()) {
                continue;
            }
            let contents = fs::read(entry.path()).map_err(|e| Error::io(entry.path(), e))?;
            if !contains_marker(&contents) {
                continue;
            }
            let source = relative_to(&layout.root, entry.path());
            match bridge_outputs(&source) {
                Some(outputs) => units.push(CodegenUnit { source, outputs }),
                None => warn!(
                    "skipping bridge file outside the crate layout: {}",
                    source.display()
                ),
            }
        }
    }
    Ok(units)
}

/// Empties the generated header and source trees. Outputs of a file that
/// lost its bridge marker must not be compiled again.
pub fn reset_output_tree(root: &Path) -> Result<()> {
    for dir in &[BRIDGE_INCLUDE_DIR, BRIDGE_SOURCE_DIR] {
        let dir = root.join(dir);
        remove_dir(&dir)?;
        ensure_dir(&dir)?;
    }
    Ok(())
}

/// Generates the header and translation unit for every unit, then the shared
/// support header. Stops at the first failing invocation.
pub fn generate(layout: &Layout, runner: &dyn ToolRunner, units: &[CodegenUnit]) -> Result<()> {
    for unit in units {
        info!("generating bridge for {}", unit.source.display());
        let header = Invocation::new(&layout.tools.cxxbridge, &layout.root)
            .path_arg(&unit.source)
            .arg("--header");
        capture(
            layout,
            runner,
            &header,
            &unit.outputs.header,
            &unit.source,
            CodegenOutput::Header,
        )?;

        let source = Invocation::new(&layout.tools.cxxbridge, &layout.root).path_arg(&unit.source);
        capture(
            layout,
            runner,
            &source,
            &unit.outputs.source,
            &unit.source,
            CodegenOutput::Source,
        )?;
    }

    let support = Invocation::new(&layout.tools.cxxbridge, &layout.root).arg("--header");
    capture(
        layout,
        runner,
        &support,
        Path::new(BRIDGE_SUPPORT_HEADER),
        Path::new(BRIDGE_SUPPORT_HEADER),
        CodegenOutput::SupportHeader,
    )
}

/// Runs the generator and stores its standard output at `output`.
fn capture(
    layout: &Layout,
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    output: &Path,
    file: &Path,
    which: CodegenOutput,
) -> Result<()> {
    let result = execute(runner, invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::Codegen {
            file: file.to_path_buf(),
            output: which,
        });
    }
    let output = layout.root.join(output);
    ensure_parent(&output)?;
    fs::write(&output, &result.stdout).map_err(|e| Error::io(&output, e))
}

fn is_rust_file(path: &Path) -> bool {
    path.extension().map_or(false, |x| x == "rs")
}

fn contains_marker(contents: &[u8]) -> bool {
    let marker = BRIDGE_MARKER.as_bytes();
    contents.windows(marker.len()).any(|x| x == marker)
}

pub fn relative_to(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}
