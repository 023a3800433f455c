use std::path::{Path, PathBuf};
use std::time::Instant;

use colored::*;
use log::*;

use crate::archive;
use crate::codegen;
use crate::compile;
use crate::config::BuildOptions;
use crate::crates;
use crate::deploy;
use crate::error::Result;
use crate::layout::{Layout, Tools};
use crate::paths::{remove_dir, BUILD_DIR, COMBINED_LIB};
use crate::tool::ToolRunner;

/// Runs the full build. On failure the build tree is removed, and the crate
/// cache is cleaned as well once the crate stage has run.
pub fn build(options: &BuildOptions, runner: &dyn ToolRunner) -> Result<()> {
    let start = Instant::now();
    let mut crates_started = false;
    let result = Layout::resolve(options)
        .and_then(|layout| run_stages(&layout, options, runner, &mut crates_started));

    match &result {
        Ok(()) => info!(
            "{}",
            format!("finished in {:.2?}", start.elapsed()).green().bold()
        ),
        Err(err) => {
            error!("{}", format!("{}. Exiting...", err).red().bold());
            let clean_crates = crates_started || err.touches_crate_cache();
            let cargo = Tools::devkitpro(&options.devkitpro).cargo;
            cleanup(&options.root, &cargo, runner, clean_crates);
        }
    }
    result
}

fn run_stages(
    layout: &Layout,
    options: &BuildOptions,
    runner: &dyn ToolRunner,
    crates_started: &mut bool,
) -> Result<()> {
    info!("{}", "creating cxx headers/.cc files".green().bold());
    codegen::reset_output_tree(&layout.root)?;
    let bridges = codegen::discover(layout)?;
    codegen::generate(layout, runner, &bridges)?;
    info!("{}", "Successfully created cxxbridge headers and .cc files".green().bold());

    compile::reset_output_tree(&layout.root)?;
    let units = compile::discover(layout)?;
    info!(
        "{}",
        format!("compiling {} native files and {} crates", units.len(), layout.crate_dirs().count())
            .green()
            .bold()
    );
    *crates_started = true;
    let (compiled, built) = rayon::join(
        || compile::compile_all(layout, runner, &units),
        || crates::build_all(layout, runner),
    );
    let records = compiled?;
    built?;
    info!("{}", "Successfully built objects and rust packages".green().bold());
    compile::write_compile_db(&layout.root, &records)?;

    let objects: Vec<PathBuf> = records.into_iter().map(|x| x.output).collect();
    archive::compose(layout, runner, &objects)?;
    info!("{}", format!("successfully created {}", COMBINED_LIB).green().bold());

    deploy::run(options, runner)
}

/// Removes everything this run produced. Cleanup failures are logged, never
/// raised, so the original error is what the user sees.
fn cleanup(root: &Path, cargo: &Path, runner: &dyn ToolRunner, clean_crates: bool) {
    if let Err(err) = remove_dir(&root.join(BUILD_DIR)) {
        warn!("{}", err);
    }
    if clean_crates {
        if let Err(err) = crates::clean_cache(root, cargo, runner) {
            warn!("cargo clean failed: {}", err);
        }
    }
}

/// Removes the build tree and the crate caches without building anything.
pub fn clean(options: &BuildOptions, runner: &dyn ToolRunner) -> Result<()> {
    remove_dir(&options.root.join(BUILD_DIR))?;
    let cargo = Tools::devkitpro(&options.devkitpro).cargo;
    if let Err(err) = crates::clean_cache(&options.root, &cargo, runner) {
        warn!("cargo clean failed: {}", err);
    }
    info!("{}", "cleaned build outputs".green().bold());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::paths::{BRIDGE_SUPPORT_HEADER, CRATE_RELEASE_LIB};
    use crate::tool::testing::{has_arg, FakeRunner};
    use crate::tool::{Invocation, ToolOutput};
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn write(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn project() -> tempfile::TempDir {
        let tmp = tempfile::tempdir().unwrap();
        write(tmp.path(), "packages/lib/rs/src/fs.rs", "#[cxx::bridge]\nmod ffi {}\n");
        write(tmp.path(), "packages/sys/src/megaton/patcher.cpp", "#include <lib/fs.rs.h>\n");
        write(tmp.path(), "packages/lib/cxx/src/virtmem.c", "");
        write(tmp.path(), "packages/abi/cxx/src/entry.s", "");
        write(tmp.path(), CRATE_RELEASE_LIB, "!<arch>\n");
        tmp
    }

    fn is_cargo(inv: &Invocation) -> bool {
        inv.program == Path::new("cargo")
    }

    fn is_cargo_clean(inv: &Invocation) -> bool {
        is_cargo(inv) && has_arg(inv, "clean")
    }

    /// Simulates a healthy toolchain: `ar t` lists the same members for the
    /// inputs and the combined archive.
    fn healthy(inv: &Invocation) -> ToolOutput {
        if has_arg(inv, "t") {
            ToolOutput::ok("m.o\n")
        } else {
            ToolOutput::ok("// generated")
        }
    }

    #[test]
    fn successful_build_runs_every_stage() {
        let tmp = project();
        let options = BuildOptions::new(tmp.path());
        let runner = FakeRunner::new(healthy);
        build(&options, &runner).unwrap();

        assert!(tmp.path().join("build/cxxbridge/include/lib/fs.rs.h").is_file());
        assert!(tmp.path().join("build/cxxbridge/src/lib/fs.rs.cc").is_file());
        assert!(tmp.path().join(BRIDGE_SUPPORT_HEADER).is_file());
        assert!(tmp.path().join("build/compile_commands.json").is_file());
        assert!(tmp.path().join("build/a/libmegaton_rs.a").is_file());

        let compiles: Vec<_> = runner
            .calls()
            .into_iter()
            .filter(|x| has_arg(x, "-c"))
            .collect();
        // patcher.cpp, virtmem.c, entry.s and the generated fs.rs.cc
        assert_eq!(compiles.len(), 4);
        assert!(compiles.iter().any(|x| has_arg(x, "build/cxxbridge/src/lib/fs.rs.cc")));
        assert!(!runner.calls().iter().any(is_cargo_clean));
    }

    #[test]
    fn generated_headers_exist_before_any_compile() {
        let tmp = project();
        let header = tmp.path().join("build/cxxbridge/include/lib/fs.rs.h");
        let saw_missing = Arc::new(AtomicBool::new(false));
        let flag = saw_missing.clone();
        let runner = FakeRunner::new(move |inv| {
            if has_arg(inv, "-c") && !header.is_file() {
                flag.store(true, Ordering::SeqCst);
            }
            healthy(inv)
        });
        build(&BuildOptions::new(tmp.path()), &runner).unwrap();
        assert!(!saw_missing.load(Ordering::SeqCst));
    }

    #[test]
    fn crate_failure_cleans_everything() {
        let tmp = project();
        let runner = FakeRunner::new(|inv| {
            if is_cargo(inv) && inv.cwd.ends_with("packages/abi/rs") {
                ToolOutput::failed("could not compile `abi`")
            } else {
                healthy(inv)
            }
        });
        match build(&BuildOptions::new(tmp.path()), &runner).unwrap_err() {
            Error::CrateBuild { directory } => {
                assert_eq!(directory, PathBuf::from("packages/abi/rs"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!tmp.path().join(BUILD_DIR).exists());
        assert!(runner.calls().iter().any(is_cargo_clean));
        assert!(!runner.calls().iter().any(|x| has_arg(x, "cqT")));
    }

    #[test]
    fn codegen_failure_skips_compilation_and_cargo() {
        let tmp = project();
        let runner = FakeRunner::new(|inv| {
            if inv.program == Path::new("cxxbridge") {
                ToolOutput::failed("unsupported type")
            } else {
                healthy(inv)
            }
        });
        match build(&BuildOptions::new(tmp.path()), &runner).unwrap_err() {
            Error::Codegen { .. } => {}
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(runner.calls().len(), 1);
        assert!(!tmp.path().join(BUILD_DIR).exists());
    }

    #[test]
    fn one_failing_compile_among_many_leaves_no_objects() {
        let tmp = project();
        for i in 0..49 {
            write(tmp.path(), &format!("packages/nx/cxx/src/unit{:02}.cpp", i), "");
        }
        write(tmp.path(), "packages/nx/cxx/src/broken.cpp", "");
        let runner = FakeRunner::new(|inv| {
            if has_arg(inv, "packages/nx/cxx/src/broken.cpp") {
                ToolOutput::failed("broken.cpp:1:1: error")
            } else {
                healthy(inv)
            }
        });
        match build(&BuildOptions::new(tmp.path()), &runner).unwrap_err() {
            Error::Compile { file, .. } => {
                assert_eq!(file, PathBuf::from("packages/nx/cxx/src/broken.cpp"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!tmp.path().join(BUILD_DIR).exists());
        assert!(!runner.calls().iter().any(|x| has_arg(x, "rcs")));
    }

    #[test]
    fn colliding_objects_stop_the_build_before_compiling() {
        let tmp = project();
        write(tmp.path(), "packages/lib/cxx/src/virtmem.cpp", "");
        let runner = FakeRunner::new(healthy);
        match build(&BuildOptions::new(tmp.path()), &runner).unwrap_err() {
            Error::ObjectCollision { object, .. } => {
                assert_eq!(object, PathBuf::from("build/o/lib/cxx/virtmem.o"))
            }
            other => panic!("unexpected error: {}", other),
        }
        assert!(!runner.calls().iter().any(|x| has_arg(x, "-c")));
        assert!(!runner.calls().iter().any(is_cargo));
    }

    #[test]
    fn stale_bridge_sources_are_not_compiled() {
        let tmp = project();
        write(tmp.path(), "build/cxxbridge/src/nx/removed.rs.cc", "// stale");
        let runner = FakeRunner::new(healthy);
        build(&BuildOptions::new(tmp.path()), &runner).unwrap();

        assert!(!tmp.path().join("build/cxxbridge/src/nx/removed.rs.cc").exists());
        let stale = "build/cxxbridge/src/nx/removed.rs.cc";
        assert!(!runner.calls().iter().any(|x| has_arg(x, stale)));
    }

    #[test]
    fn output_flag_copies_the_final_archive() {
        let tmp = project();
        let out = tempfile::tempdir().unwrap();
        let combined = tmp.path().join(COMBINED_LIB);
        // the fake archiver writes nothing; stand in for `ar -M`
        let runner = FakeRunner::new(move |inv| {
            if has_arg(inv, "-M") {
                fs::write(&combined, b"!<arch>\ncombined").unwrap();
            }
            healthy(inv)
        });
        let mut options = BuildOptions::new(tmp.path());
        options.output = Some(out.path().to_path_buf());
        build(&options, &runner).unwrap();

        let copied = out.path().join("lib/build/bin/libmegaton.a");
        assert_eq!(
            fs::read(copied).unwrap(),
            fs::read(tmp.path().join(COMBINED_LIB)).unwrap()
        );
    }

    #[test]
    fn clean_removes_the_build_tree_and_tolerates_repeats() {
        let tmp = project();
        write(tmp.path(), "build/o/sys/a.o", "");
        let runner = FakeRunner::succeeding();
        clean(&BuildOptions::new(tmp.path()), &runner).unwrap();
        clean(&BuildOptions::new(tmp.path()), &runner).unwrap();
        assert!(!tmp.path().join(BUILD_DIR).exists());
        assert_eq!(runner.calls().iter().filter(|x| is_cargo_clean(x)).count(), 2);
    }

    #[test]
    fn clean_succeeds_when_cargo_clean_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let runner = FakeRunner::new(|_| ToolOutput::failed("no Cargo.toml"));
        clean(&BuildOptions::new(tmp.path()), &runner).unwrap();
        assert!(!tmp.path().join(BUILD_DIR).exists());
    }
}
