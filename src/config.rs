use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "../megaton-old";
pub const DEFAULT_MOD_DIR: &str = "../megaton-example";
pub const DEFAULT_YUZU_DIR: &str = "~/.local/share/eden";
pub const DEFAULT_TASK_EXE: &str = "go-task";
pub const DEFAULT_DEVKITPRO: &str = "/opt/devkitpro";

/// Flags appended by the user to each toolchain. Empty means baseline only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtraFlags {
    pub common: Vec<String>,
    pub asm: Vec<String>,
    pub c: Vec<String>,
    pub cxx: Vec<String>,
    pub cargo: Vec<String>,
}

/// Everything the pipeline needs to know about this run. Built once in
/// `main` and only ever borrowed afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Project root; every relative layout path hangs off it.
    pub root: PathBuf,
    pub devkitpro: PathBuf,
    pub output: Option<PathBuf>,
    /// Mod project directory. Used for the default include flags even when
    /// the mod build itself is not requested.
    pub mod_dir: PathBuf,
    pub build_mod: bool,
    pub yuzu: Option<PathBuf>,
    pub extra_flags: ExtraFlags,
    pub task_exe: String,
    pub clean: bool,
}

impl BuildOptions {
    #[cfg(test)]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        BuildOptions {
            root: root.into(),
            devkitpro: PathBuf::from(DEFAULT_DEVKITPRO),
            output: None,
            mod_dir: PathBuf::from(DEFAULT_MOD_DIR),
            build_mod: false,
            yuzu: None,
            extra_flags: ExtraFlags::default(),
            task_exe: DEFAULT_TASK_EXE.to_string(),
            clean: false,
        }
    }

    /// Resolves a user supplied directory against the project root.
    pub fn resolve(&self, dir: &Path) -> PathBuf {
        let dir = expand_home(dir);
        if dir.is_absolute() {
            dir
        } else {
            self.root.join(dir)
        }
    }
}

/// Picks the value of an optional-argument flag: absent means not requested,
/// present without a value means the default directory.
pub fn optional_dir(flag: Option<Option<PathBuf>>, default: &str) -> Option<PathBuf> {
    flag.map(|dir| match dir {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => PathBuf::from(default),
    })
}

/// Splits a user flag string on whitespace; repeated flags accumulate.
pub fn split_flags(values: &[String]) -> Vec<String> {
    values
        .iter()
        .flat_map(|x| x.split_whitespace())
        .map(String::from)
        .collect()
}

pub fn expand_home(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => path.to_path_buf(),
        },
        Err(_) => path.to_path_buf(),
    }
}
