use std::path::Path;

use log::*;
use rayon::prelude::*;

use crate::error::{Error, Result};
use crate::layout::Layout;
use crate::tool::{execute, Invocation, ToolRunner};

/// Builds every crate directory for the target. Directories are independent
/// and built on the worker pool; cargo serializes access to the shared target
/// directory itself.
pub fn build_all(layout: &Layout, runner: &dyn ToolRunner) -> Result<()> {
    let dirs: Vec<&Path> = layout.crate_dirs().collect();
    dirs.par_iter().try_for_each(|dir| build_one(layout, runner, dir))
}

fn build_one(layout: &Layout, runner: &dyn ToolRunner, dir: &Path) -> Result<()> {
    info!("building crate {}", dir.display());
    let invocation =
        Invocation::new(&layout.tools.cargo, layout.root.join(dir)).args(layout.cargo.args());
    let result = execute(runner, &invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::CrateBuild {
            directory: dir.to_path_buf(),
        });
    }
    Ok(())
}

/// Drops the crate toolchain's cache for the whole workspace.
pub fn clean_cache(root: &Path, cargo: &Path, runner: &dyn ToolRunner) -> Result<()> {
    let invocation = Invocation::new(cargo, root).arg("clean");
    let result = execute(runner, &invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::CrateBuild {
            directory: root.to_path_buf(),
        });
    }
    Ok(())
}
