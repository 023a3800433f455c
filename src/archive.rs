use std::fs;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use log::*;
use rayon::prelude::*;

use crate::error::{ArchiveStep, Error, Result};
use crate::layout::Layout;
use crate::paths::{ensure_parent, COMBINED_LIB, CRATE_LIB, CRATE_RELEASE_LIB, NATIVE_LIB};
use crate::tool::{execute, Invocation, ToolOutput, ToolRunner};

/// Packs the native objects, merges them with the crate library into one
/// thin archive and rebuilds its index. Each archiver call is checked on
/// its own.
pub fn compose(layout: &Layout, runner: &dyn ToolRunner, objects: &[PathBuf]) -> Result<()> {
    info!("creating {}", NATIVE_LIB);
    let create = ar(layout)
        .arg("rcs")
        .arg(NATIVE_LIB)
        .args(objects.iter().map(|x| x.to_string_lossy()));
    check(runner, &create, ArchiveStep::NativeLibrary)?;

    copy_crate_library(&layout.root)?;

    info!("creating {}", COMBINED_LIB);
    let thin = ar(layout)
        .arg("cqT")
        .arg(COMBINED_LIB)
        .arg(NATIVE_LIB)
        .arg(CRATE_LIB);
    check(runner, &thin, ArchiveStep::ThinArchive)?;

    let index = ar(layout).arg("-M").stdin(index_script(Path::new(COMBINED_LIB)));
    check(runner, &index, ArchiveStep::RebuildIndex)?;

    verify_members(layout, runner)
}

/// MRI script that rewrites the archive in place with a fresh symbol index.
pub fn index_script(archive: &Path) -> String {
    let archive = archive.display();
    format!("create {0}\naddlib {0}\nsave\nend\n", archive)
}

fn copy_crate_library(root: &Path) -> Result<()> {
    let from = root.join(CRATE_RELEASE_LIB);
    let to = root.join(CRATE_LIB);
    ensure_parent(&to)?;
    fs::copy(&from, &to).map_err(|e| Error::Archive {
        step: ArchiveStep::CopyCrateLibrary,
        detail: format!("{} -> {}: {}", from.display(), to.display(), e),
    })?;
    Ok(())
}

/// The combined archive must list exactly the members of both inputs.
fn verify_members(layout: &Layout, runner: &dyn ToolRunner) -> Result<()> {
    let combined = list_members(layout, runner, COMBINED_LIB)?;
    let mut expected = list_members(layout, runner, NATIVE_LIB)?;
    expected.extend(list_members(layout, runner, CRATE_LIB)?);

    if combined != expected {
        let missing: Vec<_> = expected.difference(&combined).cloned().collect();
        let extra: Vec<_> = combined.difference(&expected).cloned().collect();
        return Err(Error::Archive {
            step: ArchiveStep::Verify,
            detail: format!("missing {:?}, unexpected {:?}", missing, extra),
        });
    }
    debug!("{} lists {} members", COMBINED_LIB, combined.len());
    Ok(())
}

fn list_members(
    layout: &Layout,
    runner: &dyn ToolRunner,
    archive: &str,
) -> Result<HashSet<String>> {
    let listing = ar(layout).arg("t").arg(archive);
    let result = check(runner, &listing, ArchiveStep::Verify)?;
    Ok(result
        .stdout_text()
        .par_lines()
        .map(str::trim)
        .filter(|x| !x.is_empty())
        .map(String::from)
        .collect())
}

fn ar(layout: &Layout) -> Invocation {
    Invocation::new(&layout.tools.ar, &layout.root)
}

fn check(
    runner: &dyn ToolRunner,
    invocation: &Invocation,
    step: ArchiveStep,
) -> Result<ToolOutput> {
    let result = execute(runner, invocation)?;
    result.log_stderr();
    if !result.success {
        return Err(Error::Archive {
            step,
            detail: result.status_text(),
        });
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildOptions;
    use crate::tool::testing::{has_arg, FakeRunner};
    use pretty_assertions::assert_eq;

    /// Answers `ar t` with fixed member lists.
    fn archiver(combined: &'static str) -> FakeRunner {
        FakeRunner::new(move |inv| {
            if !has_arg(inv, "t") {
                return ToolOutput::ok(Vec::new());
            }
            if has_arg(inv, NATIVE_LIB) {
                ToolOutput::ok("patcher.o\nalloc.o\n")
            } else if has_arg(inv, CRATE_LIB) {
                ToolOutput::ok("megaton-1a2b.o\ncompiler_builtins-9f.o\n")
            } else {
                ToolOutput::ok(combined)
            }
        })
    }

    fn project() -> (tempfile::TempDir, Layout) {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::resolve(&BuildOptions::new(tmp.path())).unwrap();
        let release = tmp.path().join(CRATE_RELEASE_LIB);
        fs::create_dir_all(release.parent().unwrap()).unwrap();
        fs::write(&release, b"!<arch>\n").unwrap();
        (tmp, layout)
    }

    #[test]
    fn script_rebuilds_the_archive_in_place() {
        assert_eq!(
            index_script(Path::new("build/a/libmegaton.a")),
            "create build/a/libmegaton.a\naddlib build/a/libmegaton.a\nsave\nend\n"
        );
    }

    #[test]
    fn runs_the_archiver_steps_in_order() {
        let (tmp, layout) = project();
        let runner = archiver("patcher.o\nalloc.o\nmegaton-1a2b.o\ncompiler_builtins-9f.o\n");
        let objects = vec![
            PathBuf::from("build/o/sys/patcher.o"),
            PathBuf::from("build/o/lib/cxx/alloc.o"),
        ];
        compose(&layout, &runner, &objects).unwrap();

        let calls = runner.calls();
        assert_eq!(
            calls[0].args,
            vec!["rcs", NATIVE_LIB, "build/o/sys/patcher.o", "build/o/lib/cxx/alloc.o"]
        );
        assert_eq!(calls[1].args, vec!["cqT", COMBINED_LIB, NATIVE_LIB, CRATE_LIB]);
        assert_eq!(calls[2].args, vec!["-M"]);
        assert_eq!(calls[2].stdin, Some(index_script(Path::new(COMBINED_LIB))));
        assert!(calls[3..].iter().all(|x| x.args[0] == "t"));
        assert_eq!(fs::read(tmp.path().join(CRATE_LIB)).unwrap(), b"!<arch>\n");
    }

    #[test]
    fn index_failure_is_its_own_step() {
        let (_tmp, layout) = project();
        let runner = FakeRunner::new(|inv| {
            if has_arg(inv, "-M") {
                ToolOutput::failed("ar: bad script")
            } else {
                ToolOutput::ok(Vec::new())
            }
        });
        match compose(&layout, &runner, &[]).unwrap_err() {
            Error::Archive { step, .. } => assert_eq!(step, ArchiveStep::RebuildIndex),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn missing_crate_library_fails_the_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = Layout::resolve(&BuildOptions::new(tmp.path())).unwrap();
        let runner = FakeRunner::succeeding();
        match compose(&layout, &runner, &[]).unwrap_err() {
            Error::Archive { step, .. } => assert_eq!(step, ArchiveStep::CopyCrateLibrary),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(runner.calls().len(), 1);
    }

    #[test]
    fn member_mismatch_fails_verification() {
        let (_tmp, layout) = project();
        let runner = archiver("patcher.o\nmegaton-1a2b.o\ncompiler_builtins-9f.o\n");
        match compose(&layout, &runner, &[]).unwrap_err() {
            Error::Archive { step, detail } => {
                assert_eq!(step, ArchiveStep::Verify);
                assert!(detail.contains("alloc.o"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }
}
