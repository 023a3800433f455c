use std::fs;
use std::path::{Path, PathBuf};

use colored::*;
use log::*;

use crate::config::BuildOptions;
use crate::error::{DeployStep, Error, Result};
use crate::paths::{ensure_parent, COMBINED_LIB};
use crate::tool::{execute, Invocation, ToolRunner};

/// Where the consumer project expects the library.
pub const OUTPUT_LIB: &str = "lib/build/bin/libmegaton.a";
pub const MOD_PROJECT: &str = "packages/example-mod";
pub const MOD_ARTIFACT: &str = "target/megaton/none/example.nso";
pub const YUZU_SUBSDK: &str = "sdmc/atmosphere/contents/01007EF00011E000/exefs/subsdk9";

/// Runs the requested post-build steps in their fixed order: copy the
/// library, build the mod, copy the mod into the emulator filesystem.
pub fn run(options: &BuildOptions, runner: &dyn ToolRunner) -> Result<()> {
    if let Some(output) = &options.output {
        info!("{}", "copying library to old megaton...".green().bold());
        copy_library(&options.root, &options.resolve(output))?;
    }
    if options.build_mod {
        info!("{}", "building example mod".green().bold());
        build_mod(&options.resolve(&options.mod_dir), &options.task_exe, runner)?;
        info!("{}", "Example mod build success".green().bold());
    }
    if let Some(yuzu) = &options.yuzu {
        info!("{}", "copying mod to eden/yuzu".green().bold());
        copy_mod(&options.resolve(&options.mod_dir), &options.resolve(yuzu))?;
    }
    Ok(())
}

pub fn copy_library(root: &Path, output_dir: &Path) -> Result<PathBuf> {
    let to = output_dir.join(OUTPUT_LIB);
    copy(&root.join(COMBINED_LIB), &to, DeployStep::Output)?;
    Ok(to)
}

pub fn build_mod(mod_dir: &Path, task_exe: &str, runner: &dyn ToolRunner) -> Result<()> {
    let invocation = Invocation::new(task_exe, mod_dir.join(MOD_PROJECT)).arg("build");
    let result = execute(runner, &invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::Deploy {
            step: DeployStep::Mod,
            detail: result.status_text(),
        });
    }
    Ok(())
}

pub fn copy_mod(mod_dir: &Path, yuzu_dir: &Path) -> Result<PathBuf> {
    let from = mod_dir.join(MOD_PROJECT).join(MOD_ARTIFACT);
    let to = yuzu_dir.join(YUZU_SUBSDK);
    copy(&from, &to, DeployStep::Yuzu)?;
    Ok(to)
}

fn copy(from: &Path, to: &Path, step: DeployStep) -> Result<()> {
    ensure_parent(to)?;
    fs::copy(from, to).map_err(|e| Error::Deploy {
        step,
        detail: format!("{} -> {}: {}", from.display(), to.display(), e),
    })?;
    debug!("copied {} to {}", from.display(), to.display());
    Ok(())
}
