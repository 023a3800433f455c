use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::compile::Language;

/// Which of the two bridge generator runs for a file failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodegenOutput {
    Header,
    Source,
    SupportHeader,
}

impl fmt::Display for CodegenOutput {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CodegenOutput::Header => write!(f, "cxxbridge --header"),
            CodegenOutput::Source => write!(f, "cxxbridge"),
            CodegenOutput::SupportHeader => write!(f, "cxxbridge --header (rust/cxx.h)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveStep {
    NativeLibrary,
    CopyCrateLibrary,
    ThinArchive,
    RebuildIndex,
    Verify,
}

impl fmt::Display for ArchiveStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ArchiveStep::NativeLibrary => "creating the native library",
            ArchiveStep::CopyCrateLibrary => "copying the crate library",
            ArchiveStep::ThinArchive => "creating the thin archive",
            ArchiveStep::RebuildIndex => "rebuilding the archive index",
            ArchiveStep::Verify => "verifying archive members",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStep {
    Output,
    Mod,
    Yuzu,
}

impl fmt::Display for DeployStep {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DeployStep::Output => "copying the library to the consumer project",
            DeployStep::Mod => "building the example mod",
            DeployStep::Yuzu => "copying the mod into the runtime filesystem",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("error running '{output}' on {}", .file.display())]
    Codegen { file: PathBuf, output: CodegenOutput },

    #[error("error building {} as {language}", .file.display())]
    Compile { language: Language, file: PathBuf },

    #[error("error building {} with cargo", .directory.display())]
    CrateBuild { directory: PathBuf },

    #[error("error {step}: {detail}")]
    Archive { step: ArchiveStep, detail: String },

    #[error("error {step}: {detail}")]
    Deploy { step: DeployStep, detail: String },

    #[error("failed to execute '{}': {source}", .program.display())]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to access '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{} and {} both compile to {}", .first.display(), .second.display(), .object.display())]
    ObjectCollision {
        object: PathBuf,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("failed to write the compilation database: {0}")]
    CompileDb(#[from] serde_json::Error),
}

impl Error {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether cleanup has to run the crate toolchain's cache clean.
    pub fn touches_crate_cache(&self) -> bool {
        matches!(
            self,
            Error::CrateBuild { .. } | Error::Archive { .. } | Error::Deploy { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
